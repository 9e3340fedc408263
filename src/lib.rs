//! Squall creates, inspects, edits, and verifies BitTorrent metafiles.
//!
//! This crate re-exports the workspace's three layers:
//!
//! - [`bencode`]: the strict codec with owning values, streaming events,
//!   and a zero-copy descriptor view.
//! - [`metafile`]: typed v1/v2/hybrid metainfo with canonical serialization
//!   and infohashes.
//! - [`hasher`]: the multi-threaded storage hashing and verification
//!   pipeline.
//!
//! A metafile is created by filling a [`metafile::FileStorage`], running a
//! [`hasher::StorageHasher`] over it, and encoding the resulting
//! [`metafile::Metafile`]; verification runs the same pipeline through a
//! [`hasher::StorageVerifier`] against a parsed metafile.

pub use squall_bencode as bencode;
pub use squall_hasher as hasher;
pub use squall_metafile as metafile;

pub use squall_bencode::{decode, encode, Value};
pub use squall_hasher::{StorageHasher, StorageHasherOptions, StorageVerifier, StorageVerifierOptions};
pub use squall_metafile::{FileStorage, Metafile, Protocol};
