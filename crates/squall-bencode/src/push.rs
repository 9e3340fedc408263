//! Push parser: drives an [`EventSink`] over a byte buffer.

use crate::error::{BencodeError, ErrorKind};
use crate::events::{EventSink, ValueBuilder};
use crate::scan::{scan_integer, scan_string};
use crate::value::Value;
use log::trace;
use std::ops::Range;

const TARGET: &str = "squall_bencode::push";

/// Default maximum container nesting depth.
pub const DEFAULT_RECURSION_LIMIT: usize = 1024;

/// Configurable, strictly validating Bencode parser.
///
/// The parser makes a single pass over the input and emits events in wire
/// order. It enforces canonical form on the way in: leading zeros, `-0`,
/// unsorted dict keys and duplicate dict keys are all rejected with the
/// offset of the offending token.
///
/// ```
/// use squall_bencode::{PushParser, ValueBuilder};
///
/// let mut builder = ValueBuilder::new();
/// PushParser::new().parse(b"l4:spami42ee", &mut builder)?;
/// let value = builder.into_value().unwrap();
/// assert_eq!(value.as_list().unwrap().len(), 2);
/// # Ok::<(), squall_bencode::BencodeError>(())
/// ```
#[derive(Debug, Clone, Copy)]
pub struct PushParser {
    recursion_limit: usize,
    value_limit: u64,
}

impl Default for PushParser {
    fn default() -> Self {
        Self {
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            value_limit: u64::MAX,
        }
    }
}

impl PushParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maximum container nesting depth before
    /// [`ErrorKind::RecursionDepthExceeded`] is returned.
    pub fn recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    /// Maximum number of values (scalars, keys and container starts) before
    /// [`ErrorKind::ValueLimitExceeded`] is returned.
    pub fn value_limit(mut self, limit: u64) -> Self {
        self.value_limit = limit;
        self
    }

    /// Parse exactly one document covering the whole input.
    pub fn parse<S: EventSink>(&self, input: &[u8], sink: &mut S) -> Result<(), BencodeError> {
        let consumed = self.parse_prefix(input, sink)?;
        if consumed != input.len() {
            return Err(BencodeError::new(ErrorKind::InvalidCharacter, consumed));
        }
        Ok(())
    }

    /// Parse one document from the front of the input and return the number
    /// of bytes consumed.
    pub fn parse_prefix<S: EventSink>(
        &self,
        input: &[u8],
        sink: &mut S,
    ) -> Result<usize, BencodeError> {
        trace!(target: TARGET, "parsing {} bytes", input.len());
        let mut machine = Machine {
            input,
            pos: 0,
            sink,
            stack: Vec::new(),
            values: 0,
            recursion_limit: self.recursion_limit,
            value_limit: self.value_limit,
        };
        machine.run()?;
        Ok(machine.pos)
    }
}

/// Decode a complete buffer into an owning [`Value`] with default limits.
pub fn decode(input: &[u8]) -> Result<Value, BencodeError> {
    let mut builder = ValueBuilder::new();
    PushParser::new().parse(input, &mut builder)?;
    // The parser only returns Ok after the root value completed.
    Ok(builder
        .into_value()
        .unwrap_or(Value::Bytes(Vec::new())))
}

enum Scope {
    List,
    Dict {
        last_key: Option<Range<usize>>,
        expect_value: bool,
    },
}

struct Machine<'a, S: EventSink> {
    input: &'a [u8],
    pos: usize,
    sink: &'a mut S,
    stack: Vec<Scope>,
    values: u64,
    recursion_limit: usize,
    value_limit: u64,
}

impl<'a, S: EventSink> Machine<'a, S> {
    fn run(&mut self) -> Result<(), BencodeError> {
        self.value_start(ErrorKind::ExpectedValue)?;

        while !self.stack.is_empty() {
            match self.stack.last() {
                Some(Scope::List) => match self.peek() {
                    None => return Err(self.err(ErrorKind::UnexpectedEof)),
                    Some(b'e') => {
                        self.pos += 1;
                        self.stack.pop();
                        self.sink.list_end();
                        self.value_done();
                    }
                    Some(b'i' | b'l' | b'd' | b'0'..=b'9') => {
                        self.value_start(ErrorKind::ExpectedListValueOrEnd)?;
                    }
                    Some(_) => return Err(self.err(ErrorKind::ExpectedListValueOrEnd)),
                },
                Some(Scope::Dict {
                    expect_value: false,
                    ..
                }) => match self.peek() {
                    None => return Err(self.err(ErrorKind::UnexpectedEof)),
                    Some(b'e') => {
                        self.pos += 1;
                        self.stack.pop();
                        self.sink.dict_end();
                        self.value_done();
                    }
                    Some(b'0'..=b'9') => self.dict_key()?,
                    Some(_) => return Err(self.err(ErrorKind::ExpectedDictKeyOrEnd)),
                },
                Some(Scope::Dict {
                    expect_value: true, ..
                }) => match self.peek() {
                    None => return Err(self.err(ErrorKind::UnexpectedEof)),
                    Some(b'i' | b'l' | b'd' | b'0'..=b'9') => {
                        self.sink.dict_value_begin();
                        self.value_start(ErrorKind::ExpectedDictValue)?;
                    }
                    Some(_) => return Err(self.err(ErrorKind::ExpectedDictValue)),
                },
                None => unreachable!("loop condition guarantees a scope"),
            }
        }
        Ok(())
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn err(&self, kind: ErrorKind) -> BencodeError {
        BencodeError::new(kind, self.pos)
    }

    fn count_value(&mut self) -> Result<(), BencodeError> {
        self.values += 1;
        if self.values > self.value_limit {
            return Err(self.err(ErrorKind::ValueLimitExceeded));
        }
        Ok(())
    }

    /// Parse the start of a value. Scalars complete immediately; containers
    /// push a scope that the main loop resolves.
    fn value_start(&mut self, expectation: ErrorKind) -> Result<(), BencodeError> {
        match self.peek() {
            None => Err(self.err(ErrorKind::UnexpectedEof)),
            Some(b'i') => {
                self.count_value()?;
                let (value, next) = scan_integer(self.input, self.pos)?;
                self.pos = next;
                self.sink.integer(value);
                self.value_done();
                Ok(())
            }
            Some(b'0'..=b'9') => {
                self.count_value()?;
                let (range, next) = scan_string(self.input, self.pos)?;
                self.pos = next;
                self.sink.string(&self.input[range]);
                self.value_done();
                Ok(())
            }
            Some(b'l') => {
                self.container_start()?;
                self.stack.push(Scope::List);
                self.sink.list_begin();
                Ok(())
            }
            Some(b'd') => {
                self.container_start()?;
                self.stack.push(Scope::Dict {
                    last_key: None,
                    expect_value: false,
                });
                self.sink.dict_begin();
                Ok(())
            }
            Some(_) => Err(self.err(expectation)),
        }
    }

    fn container_start(&mut self) -> Result<(), BencodeError> {
        if self.stack.len() >= self.recursion_limit {
            return Err(self.err(ErrorKind::RecursionDepthExceeded));
        }
        self.count_value()?;
        self.pos += 1;
        Ok(())
    }

    fn dict_key(&mut self) -> Result<(), BencodeError> {
        let key_start = self.pos;
        self.count_value()?;
        let (range, next) = scan_string(self.input, self.pos)?;

        if let Some(Scope::Dict {
            last_key,
            expect_value,
        }) = self.stack.last_mut()
        {
            if let Some(prev) = last_key {
                let prev_key = &self.input[prev.clone()];
                let key = &self.input[range.clone()];
                if key == prev_key {
                    return Err(BencodeError::new(ErrorKind::DuplicateKey, key_start));
                }
                if key < prev_key {
                    return Err(BencodeError::new(ErrorKind::UnsortedKeys, key_start));
                }
            }
            *last_key = Some(range.clone());
            *expect_value = true;
        }

        self.pos = next;
        self.sink.dict_key(&self.input[range]);
        Ok(())
    }

    /// Bookkeeping after a value (scalar or popped container) completes.
    fn value_done(&mut self) {
        if let Some(Scope::Dict {
            expect_value: expect_value @ true,
            ..
        }) = self.stack.last_mut()
        {
            *expect_value = false;
            self.sink.dict_value_end();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::encode;

    fn roundtrip(input: &[u8]) -> Vec<u8> {
        encode(&decode(input).unwrap())
    }

    #[test]
    fn canonical_documents_roundtrip() {
        // Mixed nesting with sorted keys everywhere.
        let input: &[u8] = b"d3:onei1e5:threeld3:bari0e3:fooi0eee3:twoli3e3:fooi4eee";
        assert_eq!(roundtrip(input), input);

        assert_eq!(roundtrip(b"le"), b"le");
        assert_eq!(roundtrip(b"de"), b"de");
        assert_eq!(roundtrip(b"i0e"), b"i0e");
        assert_eq!(roundtrip(b"0:"), b"0:");
        assert_eq!(roundtrip(b"li1ee"), b"li1ee");
        assert_eq!(roundtrip(b"d1:ai1ee"), b"d1:ai1ee");
    }

    #[test]
    fn leading_zero_offset() {
        let err = decode(b"i002e").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LeadingZero);
        assert_eq!(err.offset(), 1);
    }

    #[test]
    fn error_kinds() {
        let cases: &[(&[u8], ErrorKind)] = &[
            (b"i-0e", ErrorKind::NegativeZero),
            (b"i12", ErrorKind::UnexpectedEof),
            (b"4spam", ErrorKind::ExpectedColon),
            (b"x", ErrorKind::ExpectedValue),
            (b"d1:axe", ErrorKind::ExpectedDictValue),
            (b"dxe", ErrorKind::ExpectedDictKeyOrEnd),
            (b"di1ei2ee", ErrorKind::ExpectedDictKeyOrEnd),
            (b"lxe", ErrorKind::ExpectedListValueOrEnd),
            (b"ie", ErrorKind::ExpectedDigit),
            (b"d3:foo1:a3:bar1:be", ErrorKind::UnsortedKeys),
            (b"d3:foo1:a3:foo1:be", ErrorKind::DuplicateKey),
            (b"i1ei2e", ErrorKind::InvalidCharacter),
            (b"le extra", ErrorKind::InvalidCharacter),
            (b"l", ErrorKind::UnexpectedEof),
            (b"d", ErrorKind::UnexpectedEof),
            (b"d1:a", ErrorKind::UnexpectedEof),
            (b"", ErrorKind::UnexpectedEof),
        ];
        for (input, kind) in cases {
            let err = decode(input).unwrap_err();
            assert_eq!(err.kind(), *kind, "input {:?}", String::from_utf8_lossy(input));
        }
    }

    #[test]
    fn recursion_limit() {
        let mut deep = Vec::new();
        deep.extend(std::iter::repeat(b'l').take(8));
        deep.extend(std::iter::repeat(b'e').take(8));

        let mut builder = ValueBuilder::new();
        assert!(PushParser::new()
            .recursion_limit(8)
            .parse(&deep, &mut builder)
            .is_ok());

        let mut builder = ValueBuilder::new();
        let err = PushParser::new()
            .recursion_limit(7)
            .parse(&deep, &mut builder)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RecursionDepthExceeded);
        assert_eq!(err.offset(), 7);
    }

    #[test]
    fn value_limit() {
        let input = b"li1ei2ei3ee";

        let mut builder = ValueBuilder::new();
        assert!(PushParser::new()
            .value_limit(4)
            .parse(input, &mut builder)
            .is_ok());

        let mut builder = ValueBuilder::new();
        let err = PushParser::new()
            .value_limit(3)
            .parse(input, &mut builder)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueLimitExceeded);
    }

    #[test]
    fn parse_prefix_reports_consumed_bytes() {
        let mut builder = ValueBuilder::new();
        let consumed = PushParser::new()
            .parse_prefix(b"i1etrailing", &mut builder)
            .unwrap();
        assert_eq!(consumed, 3);
        assert_eq!(builder.into_value(), Some(Value::Integer(1)));
    }

    #[test]
    fn accepts_arbitrary_bytes_in_strings() {
        let input = b"d3:key4:\x00\xff\xfe\x01e";
        let value = decode(input).unwrap();
        assert_eq!(
            value.get(b"key").and_then(Value::as_bytes),
            Some(&b"\x00\xff\xfe\x01"[..])
        );
        assert_eq!(encode(&value), input);
    }
}
