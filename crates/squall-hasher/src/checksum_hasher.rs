//! Whole-file checksum consumers.
//!
//! One instance per requested algorithm, each with a single worker so the
//! running hash sees the byte stream in order. The v1 variant splits the
//! cross-file chunk stream at file boundaries; the v2 variant gets per-file
//! chunks and only has to notice the file index changing.

use crate::chunk::DataChunk;
use crate::worker::{ChunkSink, Progress};
use squall_metafile::{make_hasher, Checksum, FileStorage, HashFunction, Hasher};
use std::sync::Arc;

pub(crate) struct ChecksumWorker {
    hasher: Box<dyn Hasher>,
    file_index: usize,
    file_bytes: u64,
}

impl ChecksumWorker {
    fn finalize_into(&mut self, storage: &FileStorage, algorithm: HashFunction) {
        let mut value = vec![0u8; algorithm.digest_size()];
        self.hasher.finalize_to(&mut value);
        storage
            .at(self.file_index)
            .add_checksum(Checksum::new(algorithm, value));
    }
}

/// Follows file boundaries inside the cross-file v1 chunk stream.
pub(crate) struct V1ChecksumSink {
    storage: Arc<FileStorage>,
    algorithm: HashFunction,
    progress: Progress,
}

impl V1ChecksumSink {
    pub fn new(storage: Arc<FileStorage>, algorithm: HashFunction) -> Self {
        Self {
            storage,
            algorithm,
            progress: Progress::default(),
        }
    }
}

impl ChunkSink for V1ChecksumSink {
    type Worker = ChecksumWorker;

    fn make_worker(&self) -> Self::Worker {
        ChecksumWorker {
            hasher: make_hasher(self.algorithm),
            file_index: 0,
            file_bytes: 0,
        }
    }

    fn process(&self, worker: &mut Self::Worker, chunk: &DataChunk) {
        // checksumming only runs while creating, where every file exists
        let Some(data) = &chunk.data else {
            return;
        };
        let data: &[u8] = data;
        let storage = &self.storage;
        let mut offset = 0usize;

        while offset < data.len() && worker.file_index < storage.file_count() {
            let file_size = storage.at(worker.file_index).file_size();
            let file_remaining = (file_size - worker.file_bytes) as usize;
            let take = file_remaining.min(data.len() - offset);

            worker.hasher.update(&data[offset..offset + take]);
            worker.file_bytes += take as u64;
            offset += take;
            self.progress.add_hashed(take as u64);
            self.progress.add_done(take as u64);

            if worker.file_bytes == file_size {
                worker.finalize_into(storage, self.algorithm);
                worker.file_index += 1;
                worker.file_bytes = 0;
            }
        }
    }

    fn progress(&self) -> &Progress {
        &self.progress
    }
}

/// Consumes per-file v2 chunks; the running hash resets when the file
/// index advances.
pub(crate) struct V2ChecksumSink {
    storage: Arc<FileStorage>,
    algorithm: HashFunction,
    progress: Progress,
}

impl V2ChecksumSink {
    pub fn new(storage: Arc<FileStorage>, algorithm: HashFunction) -> Self {
        Self {
            storage,
            algorithm,
            progress: Progress::default(),
        }
    }
}

impl ChunkSink for V2ChecksumSink {
    type Worker = ChecksumWorker;

    fn make_worker(&self) -> Self::Worker {
        ChecksumWorker {
            hasher: make_hasher(self.algorithm),
            file_index: 0,
            file_bytes: 0,
        }
    }

    fn process(&self, worker: &mut Self::Worker, chunk: &DataChunk) {
        let Some(data) = &chunk.data else {
            return;
        };
        let data: &[u8] = data;

        let file_index = chunk.file_index as usize;
        if file_index != worker.file_index {
            // padding or empty files produce no chunks; just move on
            worker.hasher.reset();
            worker.file_index = file_index;
            worker.file_bytes = 0;
        }

        worker.hasher.update(data);
        worker.file_bytes += data.len() as u64;
        self.progress.add_hashed(data.len() as u64);
        self.progress.add_done(data.len() as u64);

        if worker.file_bytes == self.storage.at(file_index).file_size() {
            worker.finalize_into(&self.storage, self.algorithm);
            worker.file_index += 1;
            worker.file_bytes = 0;
        }
    }

    fn progress(&self) -> &Progress {
        &self.progress
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::BufferPool;
    use squall_metafile::FileEntry;

    fn md5_of(data: &[u8]) -> Vec<u8> {
        let mut hasher = make_hasher(HashFunction::Md5);
        let mut out = vec![0u8; 16];
        hasher.update(data);
        hasher.finalize_to(&mut out);
        out
    }

    #[test]
    fn v1_sink_splits_files_inside_a_chunk() {
        let mut storage = FileStorage::new();
        storage.add_file(FileEntry::new("d/a", 10).unwrap());
        storage.add_file(FileEntry::new("d/b", 6).unwrap());
        storage.set_piece_size(16 * 1024).unwrap();
        let storage = Arc::new(storage);

        let sink = V1ChecksumSink::new(Arc::clone(&storage), HashFunction::Md5);
        let mut worker = sink.make_worker();
        let pool = BufferPool::new(1, 16);

        // one chunk covering both files
        let bytes: Vec<u8> = (0u8..16).collect();
        sink.process(
            &mut worker,
            &DataChunk::new(0, 0, Some(pool.share(bytes.clone()))),
        );

        assert_eq!(
            storage.at(0).checksum(HashFunction::Md5).unwrap().value(),
            md5_of(&bytes[..10])
        );
        assert_eq!(
            storage.at(1).checksum(HashFunction::Md5).unwrap().value(),
            md5_of(&bytes[10..])
        );
    }

    #[test]
    fn v2_sink_resets_across_skipped_files() {
        let mut storage = FileStorage::new();
        storage.add_file(FileEntry::new("d/a", 4).unwrap());
        storage.add_file(FileEntry::padding(12));
        storage.add_file(FileEntry::new("d/b", 8).unwrap());
        storage.set_piece_size(16 * 1024).unwrap();
        let storage = Arc::new(storage);

        let sink = V2ChecksumSink::new(Arc::clone(&storage), HashFunction::Md5);
        let mut worker = sink.make_worker();
        let pool = BufferPool::new(1, 16);

        let a = vec![1u8; 4];
        let b = vec![2u8; 8];
        sink.process(&mut worker, &DataChunk::new(0, 0, Some(pool.share(a.clone()))));
        // file 1 is padding: the reader never produced chunks for it
        sink.process(&mut worker, &DataChunk::new(0, 2, Some(pool.share(b.clone()))));

        assert_eq!(
            storage.at(0).checksum(HashFunction::Md5).unwrap().value(),
            md5_of(&a)
        );
        assert_eq!(
            storage.at(2).checksum(HashFunction::Md5).unwrap().value(),
            md5_of(&b)
        );
        assert!(storage.at(1).checksum(HashFunction::Md5).is_none());
    }
}
