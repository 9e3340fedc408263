//! Fixed-width digest values.

use crate::hexadecimal::{self, HexError};
use std::fmt::{self, Display, Formatter};
use thiserror::Error;

/// Errors constructing a [`Digest`] from foreign input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DigestError {
    #[error("expected {expected} digest bytes, got {actual}")]
    Length { expected: usize, actual: usize },
    #[error(transparent)]
    Hex(#[from] HexError),
}

/// An immutable hash digest of `N` bytes.
///
/// Ordering is lexicographic over the raw bytes, which makes digests usable
/// as canonical dict keys (`piece layers` is keyed by pieces roots).
///
/// ```
/// use squall_metafile::crypto::Sha1Digest;
///
/// let digest = Sha1Digest::from_hex("aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d")?;
/// assert_eq!(digest.hex(), "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d");
/// # Ok::<(), squall_metafile::crypto::DigestError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest<const N: usize>([u8; N]);

/// 20-byte SHA-1 digest: v1 pieces and v1 infohashes.
pub type Sha1Digest = Digest<20>;
/// 32-byte SHA-256 digest: v2 Merkle nodes and v2 infohashes.
pub type Sha256Digest = Digest<32>;

impl<const N: usize> Digest<N> {
    /// The all-zero digest, used to pad Merkle leaves.
    pub const ZERO: Self = Self([0; N]);

    pub const fn new(bytes: [u8; N]) -> Self {
        Self(bytes)
    }

    pub const fn size() -> usize {
        N
    }

    /// Length-checked construction from a byte slice.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, DigestError> {
        let bytes: [u8; N] = bytes.try_into().map_err(|_| DigestError::Length {
            expected: N,
            actual: bytes.len(),
        })?;
        Ok(Self(bytes))
    }

    /// Length-checked construction from a hex string.
    pub fn from_hex(hex: &str) -> Result<Self, DigestError> {
        Self::from_slice(&hexadecimal::decode_hex(hex)?)
    }

    pub fn as_bytes(&self) -> &[u8; N] {
        &self.0
    }

    pub fn hex(&self) -> String {
        hexadecimal::encode_hex(&self.0)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; N]
    }
}

impl<const N: usize> Default for Digest<N> {
    fn default() -> Self {
        Self::ZERO
    }
}

impl<const N: usize> AsRef<[u8]> for Digest<N> {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl<const N: usize> From<[u8; N]> for Digest<N> {
    fn from(bytes: [u8; N]) -> Self {
        Self(bytes)
    }
}

impl<const N: usize> Display for Digest<N> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex())
    }
}
