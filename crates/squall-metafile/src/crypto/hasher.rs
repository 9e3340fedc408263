//! Streaming hasher abstraction over the RustCrypto digest crates.

use super::HashFunction;
use blake2::{Blake2b512, Blake2s256};
use digest::Digest;
use md5::Md5;
use sha1::Sha1;
use sha2::{Sha256, Sha512};

/// A reusable streaming hasher.
///
/// [`finalize_to`](Hasher::finalize_to) writes the digest and resets the
/// state, so one hasher serves an entire sequence of pieces. Hashers are not
/// shared between threads; every worker constructs its own through
/// [`make_hasher`].
pub trait Hasher: Send {
    fn update(&mut self, data: &[u8]);

    /// Write the digest into `out` and reset.
    ///
    /// `out` must be exactly [`digest_size`](Hasher::digest_size) bytes.
    fn finalize_to(&mut self, out: &mut [u8]);

    fn reset(&mut self);

    fn digest_size(&self) -> usize;
}

struct RustCryptoHasher<D>(D);

impl<D> Hasher for RustCryptoHasher<D>
where
    D: Digest + Default + Send,
{
    fn update(&mut self, data: &[u8]) {
        Digest::update(&mut self.0, data);
    }

    fn finalize_to(&mut self, out: &mut [u8]) {
        let digest = std::mem::take(&mut self.0).finalize();
        out.copy_from_slice(digest.as_slice());
    }

    fn reset(&mut self) {
        self.0 = D::default();
    }

    fn digest_size(&self) -> usize {
        <D as Digest>::output_size()
    }
}

/// Construct a hasher for `function`.
pub fn make_hasher(function: HashFunction) -> Box<dyn Hasher> {
    match function {
        HashFunction::Md5 => Box::new(RustCryptoHasher(Md5::new())),
        HashFunction::Blake2b512 => Box::new(RustCryptoHasher(Blake2b512::new())),
        HashFunction::Blake2s256 => Box::new(RustCryptoHasher(Blake2s256::new())),
        HashFunction::Sha1 => Box::new(RustCryptoHasher(Sha1::new())),
        HashFunction::Sha256 => Box::new(RustCryptoHasher(Sha256::new())),
        HashFunction::Sha512 => Box::new(RustCryptoHasher(Sha512::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hexadecimal::encode_hex;

    #[test]
    fn sha1_known_vector() {
        let mut hasher = make_hasher(HashFunction::Sha1);
        let mut out = [0u8; 20];
        hasher.update(b"hello");
        hasher.finalize_to(&mut out);
        assert_eq!(encode_hex(&out), "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d");
    }

    #[test]
    fn sha256_known_vector() {
        let mut hasher = make_hasher(HashFunction::Sha256);
        let mut out = [0u8; 32];
        hasher.update(b"hello");
        hasher.finalize_to(&mut out);
        assert_eq!(
            encode_hex(&out),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn finalize_resets_for_reuse() {
        let mut hasher = make_hasher(HashFunction::Sha1);
        let mut first = [0u8; 20];
        let mut second = [0u8; 20];

        hasher.update(b"piece one");
        hasher.finalize_to(&mut first);
        hasher.update(b"piece one");
        hasher.finalize_to(&mut second);
        assert_eq!(first, second);
    }

    #[test]
    fn streaming_matches_oneshot() {
        let mut streamed = make_hasher(HashFunction::Sha256);
        let mut oneshot = make_hasher(HashFunction::Sha256);
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];

        streamed.update(b"hel");
        streamed.update(b"lo");
        streamed.finalize_to(&mut a);
        oneshot.update(b"hello");
        oneshot.finalize_to(&mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn digest_sizes_match_enum() {
        for function in HashFunction::ALL {
            assert_eq!(make_hasher(function).digest_size(), function.digest_size());
        }
    }
}
