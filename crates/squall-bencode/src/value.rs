//! Owning Bencode value tree.
//!
//! [BEP-0003](https://www.bittorrent.org/beps/bep_0003.html) defines four
//! kinds of values: integers, byte strings, lists and dictionaries. Keys are
//! raw bytes, not UTF-8, and dictionaries are ordered by raw key bytes.
//! [`Dict`] restores that order on every insert, so a tree built through the
//! public API always encodes canonically.

use std::fmt;

/// An owning Bencode value.
#[derive(Clone, PartialEq, Eq)]
pub enum Value {
    Integer(i64),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Dict(Dict),
}

impl Value {
    /// Short human-readable name of the value kind, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Bytes(_) => "string",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// The byte string as UTF-8, if it is one and decodes cleanly.
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_dict_mut(&mut self) -> Option<&mut Dict> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Look up `key` if this value is a dict.
    pub fn get(&self, key: &[u8]) -> Option<&Value> {
        self.as_dict().and_then(|d| d.get(key))
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(i) => write!(f, "{i}"),
            Value::Bytes(b) => match std::str::from_utf8(b) {
                Ok(s) => write!(f, "{s:?}"),
                Err(_) => write!(f, "<{} bytes>", b.len()),
            },
            Value::List(l) => f.debug_list().entries(l).finish(),
            Value::Dict(d) => {
                let mut map = f.debug_map();
                for (k, v) in d.iter() {
                    match std::str::from_utf8(k) {
                        Ok(s) => map.key(&s),
                        Err(_) => map.key(&format_args!("<{} bytes>", k.len())),
                    };
                    map.value(v);
                }
                map.finish()
            }
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Bytes(value.as_bytes().to_vec())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Bytes(value.into_bytes())
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Value::Bytes(value.to_vec())
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

impl From<Dict> for Value {
    fn from(value: Dict) -> Self {
        Value::Dict(value)
    }
}

/// A Bencode dictionary: an ordered mapping from byte strings to values.
///
/// Entries are kept sorted ascending by raw key bytes, so iteration order is
/// always the canonical wire order.
///
/// ```
/// use squall_bencode::{Dict, Value};
///
/// let mut dict = Dict::new();
/// dict.insert("two", Value::Integer(2));
/// dict.insert("one", Value::Integer(1));
/// let keys: Vec<_> = dict.iter().map(|(k, _)| k).collect();
/// assert_eq!(keys, [b"one".as_slice(), b"two".as_slice()]);
/// ```
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Dict {
    entries: Vec<(Vec<u8>, Value)>,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Insert `value` under `key`, replacing and returning any previous value.
    pub fn insert(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        match self.entries.binary_search_by(|(k, _)| k.as_slice().cmp(&key)) {
            Ok(idx) => Some(std::mem::replace(&mut self.entries[idx].1, value.into())),
            Err(idx) => {
                self.entries.insert(idx, (key, value.into()));
                None
            }
        }
    }

    /// Append an entry known to sort after every existing key.
    ///
    /// Used by parsers, which already validate key order. Falls back to a
    /// sorted insert if the precondition does not hold.
    pub(crate) fn push_sorted(&mut self, key: Vec<u8>, value: Value) {
        match self.entries.last() {
            Some((last, _)) if *last >= key => {
                self.insert(key, value);
            }
            _ => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &[u8]) -> Option<&Value> {
        self.entries
            .binary_search_by(|(k, _)| k.as_slice().cmp(key))
            .ok()
            .map(|idx| &self.entries[idx].1)
    }

    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut Value> {
        self.entries
            .binary_search_by(|(k, _)| k.as_slice().cmp(key))
            .ok()
            .map(|idx| &mut self.entries[idx].1)
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<Value> {
        self.entries
            .binary_search_by(|(k, _)| k.as_slice().cmp(key))
            .ok()
            .map(|idx| self.entries.remove(idx).1)
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_slice(), v))
    }

    /// The entry at `index` in key order.
    pub fn entry_at(&self, index: usize) -> Option<(&[u8], &Value)> {
        self.entries.get(index).map(|(k, v)| (k.as_slice(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &[u8]> {
        self.entries.iter().map(|(k, _)| k.as_slice())
    }
}

impl fmt::Debug for Dict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Value::Dict(self.clone()).fmt(f)
    }
}

impl FromIterator<(Vec<u8>, Value)> for Dict {
    fn from_iter<T: IntoIterator<Item = (Vec<u8>, Value)>>(iter: T) -> Self {
        let mut dict = Dict::new();
        for (k, v) in iter {
            dict.insert(k, v);
        }
        dict
    }
}
