//! Multi-threaded piece hashing and verification for torrent storage.
//!
//! A single reader thread streams file data into pooled, reference-counted
//! buffers and fans chunks out over bounded queues; hash workers consume
//! them and write SHA-1 pieces, per-file SHA-256 Merkle data and optional
//! whole-file checksums straight into the shared
//! [`FileStorage`](squall_metafile::FileStorage). Memory stays bounded by
//! the buffer pool, and cancellation is cooperative at every stage.
//!
//! [`StorageHasher`] populates a storage while creating a metafile;
//! [`StorageVerifier`] runs the same pipeline against an existing metafile
//! and reports a per-piece validity map.

mod checksum_hasher;
pub mod chunk;
pub mod error;
mod piece_hasher;
pub mod pool;
pub mod reader;
pub mod storage_hasher;
pub mod storage_verifier;
mod verify;
mod worker;

pub use chunk::DataChunk;
pub use error::PipelineError;
pub use pool::{BufferPool, PoolBuffer};
pub use reader::{ChunkReader, ReaderMode};
pub use storage_hasher::{FileProgress, StorageHasher, StorageHasherOptions};
pub use storage_verifier::{StorageVerifier, StorageVerifierOptions};
pub use worker::Progress;
