//! Whole-file checksums attached to file entries.

use super::HashFunction;
use crate::hexadecimal::encode_hex;
use std::fmt::{self, Display, Formatter};

/// A whole-file checksum: the algorithm plus its digest bytes.
///
/// Serialized into file dicts under the algorithm's canonical name
/// (BEP-47 extension data).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum {
    algorithm: HashFunction,
    value: Vec<u8>,
}

impl Checksum {
    pub fn new(algorithm: HashFunction, value: Vec<u8>) -> Self {
        debug_assert_eq!(value.len(), algorithm.digest_size());
        Self { algorithm, value }
    }

    pub fn algorithm(&self) -> HashFunction {
        self.algorithm
    }

    /// The checksum key used in file dicts.
    pub fn name(&self) -> &'static str {
        self.algorithm.name()
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn hex(&self) -> String {
        encode_hex(&self.value)
    }
}

impl Display for Checksum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name(), self.hex())
    }
}
