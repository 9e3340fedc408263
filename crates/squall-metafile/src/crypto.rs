//! Hash primitives: fixed-width digests, streaming hashers, checksums.

mod checksum;
mod digest;
mod hash_function;
mod hasher;

pub use self::checksum::Checksum;
pub use self::digest::{Digest, DigestError, Sha1Digest, Sha256Digest};
pub use self::hash_function::HashFunction;
pub use self::hasher::{make_hasher, Hasher};
