//! Metafile schema and configuration errors.

use crate::attributes::UnknownAttribute;
use crate::crypto::DigestError;
use squall_bencode::BencodeError;
use thiserror::Error;

/// Errors while parsing, building or serializing a metafile.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MetafileError {
    /// The buffer was not well-formed bencode.
    #[error("bencode: {0}")]
    Bencode(#[from] BencodeError),
    #[error("missing required field \"{0}\"")]
    MissingField(&'static str),
    #[error("field \"{field}\": expected {expected}, got {actual}")]
    WrongKind {
        field: &'static str,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("field \"{field}\": {reason}")]
    InvalidValue {
        field: &'static str,
        reason: String,
    },
    #[error("invalid path \"{path}\": {reason}")]
    InvalidPath { path: String, reason: &'static str },
    #[error("duplicate file path \"{0}\"")]
    DuplicatePath(String),
    /// Piece sizes must be powers of two of at least 16 KiB.
    #[error("invalid piece size {0}")]
    InvalidPieceSize(u64),
    #[error("unknown checksum algorithm \"{0}\"")]
    UnknownAlgorithm(String),
    #[error(transparent)]
    UnknownAttribute(#[from] UnknownAttribute),
    #[error(transparent)]
    Digest(#[from] DigestError),
    /// A tracker URL that is already present in the announce list.
    #[error("duplicate tracker \"{0}\"")]
    DuplicateTracker(String),
    /// Inserting into a tier beyond `tier_count` would leave a gap.
    #[error("tier {tier} out of range, the list has {tiers} tiers")]
    TierOutOfRange { tier: usize, tiers: usize },
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
}
