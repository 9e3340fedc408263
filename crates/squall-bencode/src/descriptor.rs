//! Zero-copy descriptor view over a Bencode buffer.
//!
//! [`DescriptorTable::parse`] makes a single pass over a byte buffer and
//! produces a flat array of small records that alias it. Navigation is
//! offset arithmetic over the array: a container descriptor stores the
//! distance to its matching end, so skipping a subtree is one addition and
//! no bytes are ever copied.
//!
//! The descriptor parser accepts exactly the inputs the push parser accepts;
//! both are built on the same token scanners.

use crate::error::{BencodeError, ErrorKind};
use crate::push::DEFAULT_RECURSION_LIMIT;
use crate::scan::{scan_integer, scan_string};
use crate::value::{Dict, Value};
use log::trace;
use std::ops::Range;

const TARGET: &str = "squall_bencode::descriptor";

/// The kind of token a [`Descriptor`] covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    Integer,
    Bytes,
    ListBegin,
    ListEnd,
    DictBegin,
    DictEnd,
}

/// One parsed token.
///
/// The `next` payload is overloaded by kind: the integer value for
/// [`DescriptorKind::Integer`], the content length for
/// [`DescriptorKind::Bytes`], the forward distance (in descriptors) to the
/// matching end for container begins, and the negative distance back to the
/// begin for container ends.
#[derive(Debug, Clone, Copy)]
pub struct Descriptor {
    kind: DescriptorKind,
    /// Byte offset into the buffer. For `Bytes` this is the offset of the
    /// first content byte, past the length prefix and colon.
    offset: u64,
    next: i64,
}

impl Descriptor {
    pub fn kind(&self) -> DescriptorKind {
        self.kind
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn next(&self) -> i64 {
        self.next
    }

    /// Number of descriptors this token's subtree covers, end included.
    fn span(&self) -> usize {
        match self.kind {
            DescriptorKind::ListBegin | DescriptorKind::DictBegin => self.next as usize + 1,
            _ => 1,
        }
    }
}

/// A parsed buffer: the flat descriptor array plus the buffer it aliases.
pub struct DescriptorTable<'a> {
    buffer: &'a [u8],
    descriptors: Vec<Descriptor>,
}

impl<'a> DescriptorTable<'a> {
    /// Parse `buffer` into descriptors. The whole buffer must be a single
    /// Bencode document.
    pub fn parse(buffer: &'a [u8]) -> Result<Self, BencodeError> {
        trace!(target: TARGET, "descriptor parse of {} bytes", buffer.len());
        let mut parser = Parser {
            buffer,
            pos: 0,
            descriptors: Vec::new(),
            stack: Vec::new(),
        };
        parser.run()?;
        Ok(Self {
            buffer,
            descriptors: parser.descriptors,
        })
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Descriptor> {
        self.descriptors.get(index)
    }

    /// Cursor at the root value.
    pub fn root(&self) -> Cursor<'_> {
        Cursor {
            buffer: self.buffer,
            descriptors: &self.descriptors,
            index: 0,
        }
    }
}

/// A position in a [`DescriptorTable`], navigable without copying.
#[derive(Clone, Copy)]
pub struct Cursor<'a> {
    buffer: &'a [u8],
    descriptors: &'a [Descriptor],
    index: usize,
}

impl<'a> Cursor<'a> {
    fn descriptor(&self) -> &'a Descriptor {
        &self.descriptors[self.index]
    }

    pub fn kind(&self) -> DescriptorKind {
        self.descriptor().kind
    }

    /// Byte offset of this token in the underlying buffer.
    pub fn offset(&self) -> u64 {
        self.descriptor().offset
    }

    pub fn integer(&self) -> Option<i64> {
        let d = self.descriptor();
        (d.kind == DescriptorKind::Integer).then_some(d.next)
    }

    pub fn bytes(&self) -> Option<&'a [u8]> {
        let d = self.descriptor();
        (d.kind == DescriptorKind::Bytes).then(|| {
            let start = d.offset as usize;
            &self.buffer[start..start + d.next as usize]
        })
    }

    pub fn is_list(&self) -> bool {
        self.kind() == DescriptorKind::ListBegin
    }

    pub fn is_dict(&self) -> bool {
        self.kind() == DescriptorKind::DictBegin
    }

    fn at(&self, index: usize) -> Cursor<'a> {
        Cursor {
            buffer: self.buffer,
            descriptors: self.descriptors,
            index,
        }
    }

    /// Iterate the items of a list. Empty for non-lists.
    pub fn list_items(&self) -> ListItems<'a> {
        let d = self.descriptor();
        let (next, end) = if d.kind == DescriptorKind::ListBegin {
            (self.index + 1, self.index + d.next as usize)
        } else {
            (0, 0)
        };
        ListItems {
            cursor: *self,
            next,
            end,
        }
    }

    /// Iterate `(key, value)` entries of a dict in wire (= sorted) order.
    /// Empty for non-dicts.
    pub fn dict_entries(&self) -> DictEntries<'a> {
        let d = self.descriptor();
        let (next, end) = if d.kind == DescriptorKind::DictBegin {
            (self.index + 1, self.index + d.next as usize)
        } else {
            (0, 0)
        };
        DictEntries {
            cursor: *self,
            next,
            end,
        }
    }

    /// Find the value stored under `key` in a dict.
    pub fn dict_find(&self, key: &[u8]) -> Option<Cursor<'a>> {
        self.dict_entries()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }

    /// Build an owning [`Value`] from this subtree.
    pub fn to_value(&self) -> Value {
        match self.kind() {
            DescriptorKind::Integer => Value::Integer(self.descriptor().next),
            DescriptorKind::Bytes => {
                Value::Bytes(self.bytes().unwrap_or_default().to_vec())
            }
            DescriptorKind::ListBegin => {
                Value::List(self.list_items().map(|item| item.to_value()).collect())
            }
            DescriptorKind::DictBegin => {
                let mut dict = Dict::with_capacity(self.dict_entries().count());
                for (key, value) in self.dict_entries() {
                    dict.insert(key, value.to_value());
                }
                Value::Dict(dict)
            }
            // Ends are never reachable through navigation.
            DescriptorKind::ListEnd | DescriptorKind::DictEnd => Value::List(Vec::new()),
        }
    }
}

/// Iterator over list items.
pub struct ListItems<'a> {
    cursor: Cursor<'a>,
    next: usize,
    end: usize,
}

impl<'a> Iterator for ListItems<'a> {
    type Item = Cursor<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let item = self.cursor.at(self.next);
        self.next += item.descriptor().span();
        Some(item)
    }
}

/// Iterator over dict entries.
pub struct DictEntries<'a> {
    cursor: Cursor<'a>,
    next: usize,
    end: usize,
}

impl<'a> Iterator for DictEntries<'a> {
    type Item = (&'a [u8], Cursor<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let key = self.cursor.at(self.next);
        debug_assert_eq!(key.kind(), DescriptorKind::Bytes);
        let value = self.cursor.at(self.next + 1);
        self.next += 1 + value.descriptor().span();
        Some((key.bytes().unwrap_or_default(), value))
    }
}

struct DictState {
    begin: usize,
    last_key: Option<Range<usize>>,
    expect_value: bool,
}

enum ScopeState {
    List { begin: usize },
    Dict(DictState),
}

struct Parser<'a> {
    buffer: &'a [u8],
    pos: usize,
    descriptors: Vec<Descriptor>,
    stack: Vec<ScopeState>,
}

impl<'a> Parser<'a> {
    fn err(&self, kind: ErrorKind) -> BencodeError {
        BencodeError::new(kind, self.pos)
    }

    fn run(&mut self) -> Result<(), BencodeError> {
        self.value_start(ErrorKind::ExpectedValue)?;

        while !self.stack.is_empty() {
            match self.stack.last() {
                Some(ScopeState::List { .. }) => match self.peek() {
                    None => return Err(self.err(ErrorKind::UnexpectedEof)),
                    Some(b'e') => self.container_end(),
                    Some(b'i' | b'l' | b'd' | b'0'..=b'9') => {
                        self.value_start(ErrorKind::ExpectedListValueOrEnd)?;
                    }
                    Some(_) => return Err(self.err(ErrorKind::ExpectedListValueOrEnd)),
                },
                Some(ScopeState::Dict(DictState {
                    expect_value: false,
                    ..
                })) => match self.peek() {
                    None => return Err(self.err(ErrorKind::UnexpectedEof)),
                    Some(b'e') => self.container_end(),
                    Some(b'0'..=b'9') => self.dict_key()?,
                    Some(_) => return Err(self.err(ErrorKind::ExpectedDictKeyOrEnd)),
                },
                Some(ScopeState::Dict(DictState {
                    expect_value: true, ..
                })) => match self.peek() {
                    None => return Err(self.err(ErrorKind::UnexpectedEof)),
                    Some(b'i' | b'l' | b'd' | b'0'..=b'9') => {
                        self.value_start(ErrorKind::ExpectedDictValue)?;
                    }
                    Some(_) => return Err(self.err(ErrorKind::ExpectedDictValue)),
                },
                None => unreachable!("loop condition guarantees a scope"),
            }
        }

        if self.pos != self.buffer.len() {
            return Err(self.err(ErrorKind::InvalidCharacter));
        }
        Ok(())
    }

    fn peek(&self) -> Option<u8> {
        self.buffer.get(self.pos).copied()
    }

    fn value_start(&mut self, expectation: ErrorKind) -> Result<(), BencodeError> {
        match self.peek() {
            None => Err(self.err(ErrorKind::UnexpectedEof)),
            Some(b'i') => {
                let start = self.pos as u64;
                let (value, next) = scan_integer(self.buffer, self.pos)?;
                self.pos = next;
                self.descriptors.push(Descriptor {
                    kind: DescriptorKind::Integer,
                    offset: start,
                    next: value,
                });
                self.value_done();
                Ok(())
            }
            Some(b'0'..=b'9') => {
                let (range, next) = scan_string(self.buffer, self.pos)?;
                self.pos = next;
                self.descriptors.push(Descriptor {
                    kind: DescriptorKind::Bytes,
                    offset: range.start as u64,
                    next: range.len() as i64,
                });
                self.value_done();
                Ok(())
            }
            Some(b'l') => self.container_begin(false),
            Some(b'd') => self.container_begin(true),
            Some(_) => Err(self.err(expectation)),
        }
    }

    fn container_begin(&mut self, is_dict: bool) -> Result<(), BencodeError> {
        if self.stack.len() >= DEFAULT_RECURSION_LIMIT {
            return Err(self.err(ErrorKind::RecursionDepthExceeded));
        }
        let begin = self.descriptors.len();
        self.descriptors.push(Descriptor {
            kind: if is_dict {
                DescriptorKind::DictBegin
            } else {
                DescriptorKind::ListBegin
            },
            offset: self.pos as u64,
            next: 0,
        });
        self.stack.push(if is_dict {
            ScopeState::Dict(DictState {
                begin,
                last_key: None,
                expect_value: false,
            })
        } else {
            ScopeState::List { begin }
        });
        self.pos += 1;
        Ok(())
    }

    fn container_end(&mut self) {
        let (begin, is_dict) = match self.stack.pop() {
            Some(ScopeState::List { begin }) => (begin, false),
            Some(ScopeState::Dict(state)) => (state.begin, true),
            None => unreachable!("container_end only called with a scope"),
        };
        let end = self.descriptors.len();
        let distance = (end - begin) as i64;
        self.descriptors.push(Descriptor {
            kind: if is_dict {
                DescriptorKind::DictEnd
            } else {
                DescriptorKind::ListEnd
            },
            offset: self.pos as u64,
            next: -distance,
        });
        self.descriptors[begin].next = distance;
        self.pos += 1;
        self.value_done();
    }

    fn dict_key(&mut self) -> Result<(), BencodeError> {
        let key_start = self.pos;
        let (range, next) = scan_string(self.buffer, self.pos)?;

        if let Some(ScopeState::Dict(state)) = self.stack.last_mut() {
            if let Some(prev) = &state.last_key {
                let prev_key = &self.buffer[prev.clone()];
                let key = &self.buffer[range.clone()];
                if key == prev_key {
                    return Err(BencodeError::new(ErrorKind::DuplicateKey, key_start));
                }
                if key < prev_key {
                    return Err(BencodeError::new(ErrorKind::UnsortedKeys, key_start));
                }
            }
            state.last_key = Some(range.clone());
            state.expect_value = true;
        }

        self.descriptors.push(Descriptor {
            kind: DescriptorKind::Bytes,
            offset: range.start as u64,
            next: range.len() as i64,
        });
        self.pos = next;
        Ok(())
    }

    fn value_done(&mut self) {
        if let Some(ScopeState::Dict(DictState {
            expect_value: expect_value @ true,
            ..
        })) = self.stack.last_mut()
        {
            *expect_value = false;
        }
    }
}
