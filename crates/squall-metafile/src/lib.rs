//! Typed BitTorrent metainfo.
//!
//! `squall-metafile` models v1, v2 and hybrid torrents
//! ([BEP-0003](https://www.bittorrent.org/beps/bep_0003.html),
//! [BEP-0052](https://www.bittorrent.org/beps/bep_0052.html)): the
//! [`Metafile`] with its trackers, seeds and metadata, the [`FileStorage`]
//! holding file entries and the v1 piece table, per-file [`MerkleTree`]s for
//! v2, and the digest and hasher primitives everything is built on.
//!
//! Serialization goes through `squall-bencode`'s canonical encoder, so
//! encoding is deterministic and [`Metafile::infohash_v1`] /
//! [`Metafile::infohash_v2`] are stable across round trips.

pub mod announce;
pub mod attributes;
pub mod crypto;
pub mod error;
pub mod file_entry;
pub mod hexadecimal;
pub mod merkle;
pub mod metafile;
pub mod parse;
pub mod serialize;
pub mod storage;

pub use announce::{AnnounceUrl, AnnounceUrlList};
pub use attributes::FileAttributes;
pub use crypto::{
    make_hasher, Checksum, Digest, HashFunction, Hasher, Sha1Digest, Sha256Digest,
};
pub use error::MetafileError;
pub use file_entry::{FileEntry, FileOptions};
pub use merkle::MerkleTree;
pub use metafile::{DhtNode, Metafile};
pub use parse::parse_metafile;
pub use storage::{FileMode, FileStorage, Protocol, BLOCK_SIZE};
