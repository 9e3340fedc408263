//! Parse errors with byte offsets.

use thiserror::Error;

/// The kind of error hit while parsing Bencode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Integers and string lengths may not start with `0` unless they are `0`.
    #[error("leading zero in integer")]
    LeadingZero,
    /// `i-0e` is forbidden by BEP-0003.
    #[error("negative zero integer")]
    NegativeZero,
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("expected ':' after string length")]
    ExpectedColon,
    #[error("expected a value")]
    ExpectedValue,
    #[error("expected a dict key or 'e'")]
    ExpectedDictKeyOrEnd,
    #[error("expected a dict value")]
    ExpectedDictValue,
    #[error("expected a list value or 'e'")]
    ExpectedListValueOrEnd,
    #[error("expected a decimal digit")]
    ExpectedDigit,
    /// Dict keys must be strictly ascending in raw byte order.
    #[error("dict keys not sorted")]
    UnsortedKeys,
    #[error("duplicate dict key")]
    DuplicateKey,
    #[error("invalid character")]
    InvalidCharacter,
    /// Container nesting exceeded [`PushParser::recursion_limit`](crate::PushParser).
    #[error("recursion depth exceeded")]
    RecursionDepthExceeded,
    /// Total value count exceeded [`PushParser::value_limit`](crate::PushParser).
    #[error("value limit exceeded")]
    ValueLimitExceeded,
    /// The integer does not fit in an `i64`.
    #[error("integer overflow")]
    IntegerOverflow,
}

/// A Bencode parse error and the byte offset it occurred at.
///
/// ```
/// use squall_bencode::{decode, ErrorKind};
///
/// let err = decode(b"i002e").unwrap_err();
/// assert_eq!(err.kind(), ErrorKind::LeadingZero);
/// assert_eq!(err.offset(), 1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{kind} at offset {offset}")]
pub struct BencodeError {
    kind: ErrorKind,
    offset: usize,
}

impl BencodeError {
    pub(crate) fn new(kind: ErrorKind, offset: usize) -> Self {
        Self { kind, offset }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Byte offset into the input where the error was detected.
    pub fn offset(&self) -> usize {
        self.offset
    }
}
