//! Hexadecimal rendering and parsing for digests and checksums.

use thiserror::Error;

/// Errors from [`decode_hex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HexError {
    #[error("hex string has odd length {0}")]
    OddLength(usize),
    #[error("invalid hex digit at position {0}")]
    InvalidDigit(usize),
}

/// Render bytes as lowercase hex.
pub fn encode_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push(char::from_digit(u32::from(b >> 4), 16).unwrap_or('0'));
        out.push(char::from_digit(u32::from(b & 0xf), 16).unwrap_or('0'));
    }
    out
}

/// Parse a hex string, accepting both cases.
pub fn decode_hex(hex: &str) -> Result<Vec<u8>, HexError> {
    if hex.len() % 2 != 0 {
        return Err(HexError::OddLength(hex.len()));
    }

    let nibble = |position: usize, c: u8| -> Result<u8, HexError> {
        match c {
            b'0'..=b'9' => Ok(c - b'0'),
            b'a'..=b'f' => Ok(c - b'a' + 10),
            b'A'..=b'F' => Ok(c - b'A' + 10),
            _ => Err(HexError::InvalidDigit(position)),
        }
    };

    hex.bytes()
        .step_by(2)
        .zip(hex.bytes().skip(1).step_by(2))
        .enumerate()
        .map(|(i, (hi, lo))| Ok(nibble(2 * i, hi)? << 4 | nibble(2 * i + 1, lo)?))
        .collect()
}
