//! Token scanners shared by the push parser and the descriptor parser.
//!
//! Keeping both parsers on the same scanners guarantees they accept and
//! reject exactly the same inputs.

use crate::error::{BencodeError, ErrorKind};
use std::ops::Range;

fn err(kind: ErrorKind, offset: usize) -> BencodeError {
    BencodeError::new(kind, offset)
}

/// Scan an integer token starting at `pos`, which must point at the `i`.
///
/// Returns the value and the offset just past the closing `e`.
pub(crate) fn scan_integer(input: &[u8], pos: usize) -> Result<(i64, usize), BencodeError> {
    debug_assert_eq!(input.get(pos), Some(&b'i'));
    let mut cur = pos + 1;

    let negative = matches!(input.get(cur), Some(b'-'));
    if negative {
        cur += 1;
    }

    let first = match input.get(cur) {
        Some(&b) if b.is_ascii_digit() => b,
        Some(_) => return Err(err(ErrorKind::ExpectedDigit, cur)),
        None => return Err(err(ErrorKind::UnexpectedEof, cur)),
    };
    if first == b'0' {
        if negative {
            return Err(err(ErrorKind::NegativeZero, cur));
        }
        if matches!(input.get(cur + 1), Some(b) if b.is_ascii_digit()) {
            return Err(err(ErrorKind::LeadingZero, cur));
        }
    }

    // Accumulate negated so that i64::MIN parses without overflow.
    let mut value: i64 = 0;
    while let Some(&b) = input.get(cur) {
        if !b.is_ascii_digit() {
            break;
        }
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_sub(i64::from(b - b'0')))
            .ok_or_else(|| err(ErrorKind::IntegerOverflow, cur))?;
        cur += 1;
    }
    if !negative {
        value = value
            .checked_neg()
            .ok_or_else(|| err(ErrorKind::IntegerOverflow, cur - 1))?;
    }

    match input.get(cur) {
        Some(b'e') => Ok((value, cur + 1)),
        Some(_) => Err(err(ErrorKind::InvalidCharacter, cur)),
        None => Err(err(ErrorKind::UnexpectedEof, cur)),
    }
}

/// Scan a string token starting at `pos`, which must point at the first
/// length digit.
///
/// Returns the byte range of the string contents and the offset just past
/// the contents.
pub(crate) fn scan_string(input: &[u8], pos: usize) -> Result<(Range<usize>, usize), BencodeError> {
    debug_assert!(matches!(input.get(pos), Some(b) if b.is_ascii_digit()));

    if input[pos] == b'0' && matches!(input.get(pos + 1), Some(b) if b.is_ascii_digit()) {
        return Err(err(ErrorKind::LeadingZero, pos));
    }

    let mut cur = pos;
    let mut len: usize = 0;
    while let Some(&b) = input.get(cur) {
        if !b.is_ascii_digit() {
            break;
        }
        len = len
            .checked_mul(10)
            .and_then(|l| l.checked_add(usize::from(b - b'0')))
            .ok_or_else(|| err(ErrorKind::IntegerOverflow, cur))?;
        cur += 1;
    }

    match input.get(cur) {
        Some(b':') => cur += 1,
        Some(_) => return Err(err(ErrorKind::ExpectedColon, cur)),
        None => return Err(err(ErrorKind::UnexpectedEof, cur)),
    }

    let end = cur
        .checked_add(len)
        .filter(|&e| e <= input.len())
        .ok_or_else(|| err(ErrorKind::UnexpectedEof, input.len()))?;
    Ok((cur..end, end))
}
