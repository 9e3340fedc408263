//! Supported hash algorithms.

use std::fmt::{self, Display, Formatter};

/// Hash algorithms the metafile layer knows about.
///
/// SHA-1 and SHA-256 carry the piece data for v1 and v2 torrents; the rest
/// are available as optional per-file checksums. The names double as the
/// checksum keys inside file dicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HashFunction {
    Md5,
    Blake2b512,
    Blake2s256,
    Sha1,
    Sha256,
    Sha512,
}

impl HashFunction {
    /// Every supported algorithm, in name order.
    pub const ALL: [HashFunction; 6] = [
        HashFunction::Blake2b512,
        HashFunction::Blake2s256,
        HashFunction::Md5,
        HashFunction::Sha1,
        HashFunction::Sha256,
        HashFunction::Sha512,
    ];

    /// Canonical lowercase name, used as the checksum key in file dicts.
    pub fn name(self) -> &'static str {
        match self {
            HashFunction::Md5 => "md5",
            HashFunction::Blake2b512 => "blake2b_512",
            HashFunction::Blake2s256 => "blake2s_256",
            HashFunction::Sha1 => "sha1",
            HashFunction::Sha256 => "sha256",
            HashFunction::Sha512 => "sha512",
        }
    }

    /// Look an algorithm up by its canonical name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    /// Digest size in bytes.
    pub fn digest_size(self) -> usize {
        match self {
            HashFunction::Md5 => 16,
            HashFunction::Sha1 => 20,
            HashFunction::Blake2s256 | HashFunction::Sha256 => 32,
            HashFunction::Blake2b512 | HashFunction::Sha512 => 64,
        }
    }
}

impl Display for HashFunction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_roundtrip() {
        for function in HashFunction::ALL {
            assert_eq!(HashFunction::from_name(function.name()), Some(function));
        }
        assert_eq!(HashFunction::from_name("md4"), None);
    }
}
