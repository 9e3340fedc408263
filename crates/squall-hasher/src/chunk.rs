//! Chunks of file data flowing from the reader to the consumers.

use crate::pool::PoolBuffer;
use std::sync::Arc;

/// A block of data read from storage.
///
/// For v1 pipelines `piece_index` is the global index of the first piece in
/// the chunk and a chunk may span file boundaries. For v2 pipelines
/// `piece_index` is relative to the file (`file_index`) and chunks never
/// cross files.
///
/// `data == None` with valid indices is a stub: a missing or padding range
/// the consumer must account for without hashing. A chunk with both indices
/// at `u32::MAX` is the wake-up sentinel used during shutdown.
#[derive(Clone, Debug)]
pub struct DataChunk {
    pub piece_index: u32,
    pub file_index: u32,
    pub data: Option<Arc<PoolBuffer>>,
}

impl DataChunk {
    pub fn new(piece_index: u32, file_index: u32, data: Option<Arc<PoolBuffer>>) -> Self {
        Self {
            piece_index,
            file_index,
            data,
        }
    }

    pub fn stub(piece_index: u32, file_index: u32) -> Self {
        Self::new(piece_index, file_index, None)
    }

    pub fn sentinel() -> Self {
        Self::new(u32::MAX, u32::MAX, None)
    }

    pub fn is_sentinel(&self) -> bool {
        self.piece_index == u32::MAX && self.file_index == u32::MAX && self.data.is_none()
    }

    /// Payload length; stubs and sentinels are empty.
    pub fn len(&self) -> usize {
        self.data.as_ref().map_or(0, |d| d.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
