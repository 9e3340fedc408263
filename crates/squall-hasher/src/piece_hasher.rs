//! Piece hashing consumers: v1 SHA-1 pieces and v2 per-file Merkle trees.

use crate::chunk::DataChunk;
use crate::worker::{ChunkSink, Progress};
use squall_metafile::{
    make_hasher, FileStorage, HashFunction, Hasher, MerkleTree, Sha1Digest, Sha256Digest,
    BLOCK_SIZE,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// SHA-1 over every `piece_size` slice of the chunk stream.
pub(crate) struct V1PieceSink {
    storage: Arc<FileStorage>,
    progress: Progress,
}

impl V1PieceSink {
    pub fn new(storage: Arc<FileStorage>) -> Self {
        Self {
            storage,
            progress: Progress::default(),
        }
    }
}

impl ChunkSink for V1PieceSink {
    type Worker = Box<dyn Hasher>;

    fn make_worker(&self) -> Self::Worker {
        make_hasher(HashFunction::Sha1)
    }

    fn process(&self, hasher: &mut Self::Worker, chunk: &DataChunk) {
        let piece_size = self.storage.piece_size() as usize;

        // a stub is one whole missing piece: done, but never hashed
        let Some(data) = &chunk.data else {
            self.progress.add_done(piece_size as u64);
            return;
        };
        let data: &[u8] = data;
        let pieces_in_chunk = data.len().div_ceil(piece_size);
        let mut digest = [0u8; 20];

        for k in 0..pieces_in_chunk {
            let start = k * piece_size;
            let end = (start + piece_size).min(data.len());
            hasher.update(&data[start..end]);
            hasher.finalize_to(&mut digest);
            self.storage
                .set_piece_hash(u64::from(chunk.piece_index) + k as u64, Sha1Digest::new(digest));
            self.progress.add_done((end - start) as u64);
        }
        self.progress.add_hashed(data.len() as u64);
    }

    fn progress(&self) -> &Progress {
        &self.progress
    }
}

/// Per-worker hashers for the v2 sink: SHA-256 for leaves, SHA-1 for the
/// hybrid piece table.
pub(crate) struct V2Worker {
    sha256: Box<dyn Hasher>,
    sha1: Box<dyn Hasher>,
}

/// SHA-256 16 KiB leaves into per-file Merkle trees, with optional v1
/// compatibility hashing for hybrid torrents.
pub(crate) struct V2PieceSink {
    storage: Arc<FileStorage>,
    progress: Progress,
    piece_size: u64,
    hybrid: bool,
    trees: Vec<MerkleTree>,
    file_bytes_hashed: Vec<AtomicU64>,
    /// Global v1 piece index each file starts at (hybrid only).
    v1_piece_offsets: Vec<u64>,
}

impl V2PieceSink {
    pub fn new(storage: Arc<FileStorage>, hybrid: bool) -> Self {
        let piece_size = storage.piece_size();
        let mut trees = Vec::with_capacity(storage.file_count());
        let mut v1_piece_offsets = Vec::with_capacity(storage.file_count() + 1);
        v1_piece_offsets.push(0);

        for entry in storage.iter() {
            let last = *v1_piece_offsets.last().unwrap_or(&0);
            if entry.is_padding_file() {
                // placeholder so tree indices line up with file indices
                trees.push(MerkleTree::empty());
                v1_piece_offsets.push(last);
            } else {
                trees.push(MerkleTree::new(entry.file_size().div_ceil(BLOCK_SIZE)));
                v1_piece_offsets.push(last + entry.file_size().div_ceil(piece_size));
            }
        }
        let file_bytes_hashed = (0..storage.file_count()).map(|_| AtomicU64::new(0)).collect();

        Self {
            storage,
            progress: Progress::default(),
            piece_size,
            hybrid,
            trees,
            file_bytes_hashed,
            v1_piece_offsets,
        }
    }

    /// Complete the file's tree and publish its root and piece layer.
    ///
    /// Exactly one worker reaches this per file: the one whose fetch-add
    /// landed on the final chunk (see `process`).
    fn finalize_file(&self, worker: &mut V2Worker, file_index: usize) {
        let tree = &self.trees[file_index];
        tree.update(worker.sha256.as_mut());

        let entry = self.storage.at(file_index);
        entry.set_pieces_root(tree.root());

        // depth of the layer whose nodes cover `piece_size` bytes
        let layer_offset = self.piece_size.ilog2() - BLOCK_SIZE.ilog2();
        if layer_offset >= tree.height() {
            // the whole file fits in one piece: root only
            entry.set_piece_layer(Vec::new());
            return;
        }

        let depth = tree.height() - layer_offset;
        let mut layer = tree.layer(depth);
        // balancing nodes do not belong to the piece layer
        layer.truncate(entry.file_size().div_ceil(self.piece_size) as usize);
        entry.set_piece_layer(layer);
    }

    /// Hybrid extra work: v1 piece hashes over the same chunk, zero-padded
    /// against the following padding file on the last piece.
    fn hash_v1_compat(&self, worker: &mut V2Worker, chunk: &DataChunk, data: &[u8]) {
        let piece_size = self.piece_size as usize;
        let file_index = chunk.file_index as usize;
        let pieces_in_chunk = data.len().div_ceil(piece_size);
        let needs_padding = data.len() % piece_size != 0;
        let full_pieces = if needs_padding {
            pieces_in_chunk - 1
        } else {
            pieces_in_chunk
        };
        let mut digest = [0u8; 20];

        for k in 0..full_pieces {
            worker
                .sha1
                .update(&data[k * piece_size..(k + 1) * piece_size]);
            worker.sha1.finalize_to(&mut digest);
            self.set_v1_piece(file_index, chunk.piece_index, k, digest);
            self.progress.add_hashed(piece_size as u64);
        }

        if needs_padding {
            // last piece of the file: pad to the boundary when a padding
            // file follows, hash as-is when this is the torrent's tail
            let tail = &data[full_pieces * piece_size..];
            worker.sha1.update(tail);
            let mut padded = tail.len() as u64;
            if let Some(next) = self.storage.get(file_index + 1) {
                if next.is_padding_file() {
                    let zeroes = vec![0u8; next.file_size() as usize];
                    worker.sha1.update(&zeroes);
                    padded += next.file_size();
                }
            }
            worker.sha1.finalize_to(&mut digest);
            self.set_v1_piece(file_index, chunk.piece_index, full_pieces, digest);
            self.progress.add_hashed(padded);
        }
    }

    fn set_v1_piece(&self, file_index: usize, chunk_piece: u32, k: usize, digest: [u8; 20]) {
        let global = self.v1_piece_offsets[file_index] + u64::from(chunk_piece) + k as u64;
        self.storage.set_piece_hash(global, Sha1Digest::new(digest));
    }
}

impl ChunkSink for V2PieceSink {
    type Worker = V2Worker;

    fn make_worker(&self) -> Self::Worker {
        V2Worker {
            sha256: make_hasher(HashFunction::Sha256),
            sha1: make_hasher(HashFunction::Sha1),
        }
    }

    fn process(&self, worker: &mut Self::Worker, chunk: &DataChunk) {
        let file_index = chunk.file_index as usize;

        // a stub marks a whole missing file as done
        let Some(data) = &chunk.data else {
            self.progress
                .add_done(self.storage.at(file_index).file_size());
            return;
        };
        let data: &[u8] = data;
        let entry = self.storage.at(file_index);
        let tree = &self.trees[file_index];

        let block_size = BLOCK_SIZE as usize;
        let blocks_in_chunk = data.len().div_ceil(block_size);
        // index of the chunk's first 16 KiB block in the file's tree
        let index_offset =
            (u64::from(chunk.piece_index) * self.piece_size / BLOCK_SIZE) as usize;

        let mut digest = [0u8; 32];
        for i in 0..blocks_in_chunk {
            let start = i * block_size;
            let end = (start + block_size).min(data.len());
            // the final block may be short; its digest is stored unpadded
            worker.sha256.update(&data[start..end]);
            worker.sha256.finalize_to(&mut digest);
            tree.set_leaf(index_offset + i, Sha256Digest::new(digest));
            self.progress.add_hashed((end - start) as u64);
        }

        if self.hybrid {
            self.hash_v1_compat(worker, chunk, data);
        }

        // The winner of the last chunk finalizes. AcqRel publishes every
        // worker's leaf writes to whoever reads the tree afterwards.
        let previous = self.file_bytes_hashed[file_index]
            .fetch_add(data.len() as u64, Ordering::AcqRel);
        if previous == entry.file_size() - data.len() as u64 {
            self.finalize_file(worker, file_index);
        }

        self.progress.add_done(data.len() as u64);
    }

    fn progress(&self) -> &Progress {
        &self.progress
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use squall_metafile::FileEntry;

    fn sha256_of(parts: &[&[u8]]) -> Sha256Digest {
        let mut hasher = make_hasher(HashFunction::Sha256);
        let mut out = [0u8; 32];
        for part in parts {
            hasher.update(part);
        }
        hasher.finalize_to(&mut out);
        Sha256Digest::new(out)
    }

    fn storage_one_file(size: u64, piece_size: u64) -> Arc<FileStorage> {
        let mut storage = FileStorage::new();
        storage.add_file(FileEntry::new("data.bin", size).unwrap());
        storage.set_piece_size(piece_size).unwrap();
        Arc::new(storage)
    }

    fn process_whole_file(sink: &V2PieceSink, bytes: &[u8], chunk_size: usize) {
        let mut worker = sink.make_worker();
        let pool = crate::pool::BufferPool::new(4, chunk_size);
        let pieces_per_chunk = (chunk_size as u64 / sink.piece_size) as u32;
        for (i, part) in bytes.chunks(chunk_size).enumerate() {
            let data = pool.share(part.to_vec());
            sink.process(
                &mut worker,
                &DataChunk::new(i as u32 * pieces_per_chunk, 0, Some(data)),
            );
        }
    }

    /// A 16 KiB file of zeroes: one leaf, root == SHA-256 of the data,
    /// empty piece layer.
    #[test]
    fn single_block_file_root()  {
        let storage = storage_one_file(BLOCK_SIZE, BLOCK_SIZE);
        let sink = V2PieceSink::new(Arc::clone(&storage), false);
        let bytes = vec![0u8; BLOCK_SIZE as usize];
        process_whole_file(&sink, &bytes, BLOCK_SIZE as usize);

        let entry = storage.at(0);
        assert_eq!(entry.pieces_root(), Some(sha256_of(&[&bytes])));
        assert!(entry.piece_layer().is_empty());
    }

    /// A 32 KiB file of zeroes at a 16 KiB piece size: two leaves, root is
    /// the pair hash, and the piece layer is the two leaves themselves.
    #[test]
    fn two_block_file_root() {
        let storage = storage_one_file(2 * BLOCK_SIZE, BLOCK_SIZE);
        let sink = V2PieceSink::new(Arc::clone(&storage), false);
        let bytes = vec![0u8; 2 * BLOCK_SIZE as usize];
        process_whole_file(&sink, &bytes, BLOCK_SIZE as usize);

        let entry = storage.at(0);
        let leaf = sha256_of(&[&bytes[..BLOCK_SIZE as usize]]);
        let root = sha256_of(&[leaf.as_ref(), leaf.as_ref()]);
        assert_eq!(entry.pieces_root(), Some(root));
        assert_eq!(entry.piece_layer(), vec![leaf, leaf]);
    }

    /// 16 KiB + 1 byte: the second leaf hashes a single byte, unpadded,
    /// but the tree still balances with a zero leaf.
    #[test]
    fn short_final_block() {
        let size = BLOCK_SIZE + 1;
        let storage = storage_one_file(size, BLOCK_SIZE);
        let sink = V2PieceSink::new(Arc::clone(&storage), false);
        let bytes = vec![7u8; size as usize];
        process_whole_file(&sink, &bytes, 2 * BLOCK_SIZE as usize);

        let entry = storage.at(0);
        let first = sha256_of(&[&bytes[..BLOCK_SIZE as usize]]);
        let second = sha256_of(&[&bytes[BLOCK_SIZE as usize..]]);
        let root = sha256_of(&[first.as_ref(), second.as_ref()]);
        assert_eq!(entry.pieces_root(), Some(root));
        // two pieces of 16 KiB cover 16 KiB + 1; layer truncates to 2
        assert_eq!(entry.piece_layer(), vec![first, second]);
    }

    #[test]
    fn v1_sink_hashes_pieces_and_stubs() {
        let mut storage = FileStorage::new();
        storage.add_file(FileEntry::new("a.bin", 3 * BLOCK_SIZE / 2).unwrap());
        storage.set_piece_size(BLOCK_SIZE).unwrap();
        storage.allocate_pieces();
        let storage = Arc::new(storage);

        let sink = V1PieceSink::new(Arc::clone(&storage));
        let mut worker = sink.make_worker();
        let pool = crate::pool::BufferPool::new(2, 2 * BLOCK_SIZE as usize);

        let bytes = vec![5u8; 3 * BLOCK_SIZE as usize / 2];
        let data = pool.share(bytes.clone());
        sink.process(&mut worker, &DataChunk::new(0, 0, Some(data)));

        let mut expected = [0u8; 20];
        let mut hasher = make_hasher(HashFunction::Sha1);
        hasher.update(&bytes[..BLOCK_SIZE as usize]);
        hasher.finalize_to(&mut expected);
        assert_eq!(storage.piece_hash(0), Sha1Digest::new(expected));

        hasher.update(&bytes[BLOCK_SIZE as usize..]);
        hasher.finalize_to(&mut expected);
        assert_eq!(storage.piece_hash(1), Sha1Digest::new(expected));

        assert_eq!(sink.progress().bytes_hashed(), 3 * BLOCK_SIZE / 2);
        assert_eq!(sink.progress().bytes_done(), 3 * BLOCK_SIZE / 2);

        // stubs advance bytes_done by a full piece without hashing
        sink.process(&mut worker, &DataChunk::stub(2, 0));
        assert_eq!(sink.progress().bytes_hashed(), 3 * BLOCK_SIZE / 2);
        assert_eq!(sink.progress().bytes_done(), 5 * BLOCK_SIZE / 2);
    }
}
