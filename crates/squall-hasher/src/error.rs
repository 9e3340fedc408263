//! Pipeline errors.

use squall_metafile::MetafileError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PipelineError {
    /// Invalid configuration, e.g. a protocol with no piece data.
    #[error("configuration: {0}")]
    Config(String),
    /// Start/wait/cancel called out of order.
    #[error("pipeline state: {0}")]
    InvalidState(&'static str),
    /// A file that must exist for hashing does not.
    #[error("file not found: {0}")]
    MissingFile(PathBuf),
    #[error(transparent)]
    Metafile(#[from] MetafileError),
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
}
