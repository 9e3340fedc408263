//! Verification consumers: hash the stream and compare against the
//! metafile's piece data, filling a per-piece validity map.

use crate::chunk::DataChunk;
use crate::worker::{ChunkSink, Progress};
use squall_metafile::{
    make_hasher, FileStorage, HashFunction, Hasher, MerkleTree, Sha1Digest, Sha256Digest,
    BLOCK_SIZE,
};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

fn snapshot(map: &[AtomicU8]) -> Vec<u8> {
    map.iter().map(|v| v.load(Ordering::Relaxed)).collect()
}

fn count_valid(map: &[AtomicU8], range: std::ops::Range<usize>) -> usize {
    map[range]
        .iter()
        .filter(|v| v.load(Ordering::Relaxed) == 1)
        .count()
}

/// Compares v1 piece hashes; one map slot per piece.
pub(crate) struct V1VerifySink {
    storage: Arc<FileStorage>,
    progress: Progress,
    piece_map: Vec<AtomicU8>,
}

impl V1VerifySink {
    pub fn new(storage: Arc<FileStorage>) -> Self {
        let pieces = storage.allocated_piece_count() as usize;
        Self {
            storage,
            progress: Progress::default(),
            piece_map: (0..pieces).map(|_| AtomicU8::new(0)).collect(),
        }
    }

    pub fn piece_map(&self) -> Vec<u8> {
        snapshot(&self.piece_map)
    }

    /// Valid pieces for `file_index` over the pieces its bytes cover,
    /// as a percentage.
    pub fn percentage(&self, file_index: usize) -> f64 {
        let (first, last) = self.storage.get_pieces_offsets(file_index);
        let total = (last - first).max(1);
        let valid = count_valid(&self.piece_map, first as usize..last as usize);
        valid as f64 / total as f64 * 100.0
    }
}

impl ChunkSink for V1VerifySink {
    type Worker = Box<dyn Hasher>;

    fn make_worker(&self) -> Self::Worker {
        make_hasher(HashFunction::Sha1)
    }

    fn process(&self, hasher: &mut Self::Worker, chunk: &DataChunk) {
        let piece_size = self.storage.piece_size() as usize;

        // missing piece: counts as processed, stays invalid in the map
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

            let index = u64::from(chunk.piece_index) + k as u64;
            let valid = self.storage.piece_hash(index) == Sha1Digest::new(digest);
            self.piece_map[index as usize].store(u8::from(valid), Ordering::Relaxed);
            self.progress.add_done((end - start) as u64);
        }
        self.progress.add_hashed(data.len() as u64);
    }

    fn progress(&self) -> &Progress {
        &self.progress
    }
}

/// Rebuilds per-file Merkle trees and compares roots and piece layers;
/// one map slot per piece-layer entry (or one for single-piece files).
pub(crate) struct V2VerifySink {
    storage: Arc<FileStorage>,
    progress: Progress,
    trees: Vec<MerkleTree>,
    file_bytes_hashed: Vec<AtomicU64>,
    /// First piece-map slot of each file; `usize::MAX` for padding files.
    file_offsets: Vec<usize>,
    piece_map: Vec<AtomicU8>,
}

impl V2VerifySink {
    pub fn new(storage: Arc<FileStorage>) -> Self {
        let mut trees = Vec::with_capacity(storage.file_count());
        let mut file_offsets = Vec::with_capacity(storage.file_count());
        let mut next_offset = 0usize;

        for entry in storage.iter() {
            if entry.is_padding_file() {
                trees.push(MerkleTree::empty());
                file_offsets.push(usize::MAX);
            } else {
                trees.push(MerkleTree::new(entry.file_size().div_ceil(BLOCK_SIZE)));
                file_offsets.push(next_offset);
                next_offset += entry.piece_layer().len().max(1);
            }
        }

        let piece_map: Vec<AtomicU8> = (0..next_offset).map(|_| AtomicU8::new(0)).collect();
        let file_bytes_hashed =
            (0..storage.file_count()).map(|_| AtomicU64::new(0)).collect();

        let sink = Self {
            storage,
            progress: Progress::default(),
            trees,
            file_bytes_hashed,
            file_offsets,
            piece_map,
        };
        // empty files have nothing to hash and verify trivially
        for (index, entry) in sink.storage.iter().enumerate() {
            if !entry.is_padding_file() && entry.file_size() == 0 {
                sink.piece_map[sink.file_offsets[index]].store(1, Ordering::Relaxed);
            }
        }
        sink
    }

    pub fn piece_map(&self) -> Vec<u8> {
        snapshot(&self.piece_map)
    }

    pub fn percentage(&self, file_index: usize) -> f64 {
        let entry = self.storage.at(file_index);
        if entry.is_padding_file() {
            return 100.0;
        }
        let offset = self.file_offsets[file_index];
        let pieces = entry.piece_layer().len().max(1);
        let valid = count_valid(&self.piece_map, offset..offset + pieces);
        valid as f64 / pieces as f64 * 100.0
    }

    fn verify_file(&self, worker: &mut Box<dyn Hasher>, file_index: usize) {
        let tree = &self.trees[file_index];
        tree.update(worker.as_mut());

        let entry = self.storage.at(file_index);
        let offset = self.file_offsets[file_index];
        let reference_layer = entry.piece_layer();
        let single_piece = reference_layer.is_empty();

        if entry.pieces_root() == Some(tree.root()) {
            // a matching root proves every piece, padded layers included
            let slots = reference_layer.len().max(1);
            for slot in 0..slots {
                self.piece_map[offset + slot].store(1, Ordering::Relaxed);
            }
            return;
        }

        if single_piece {
            self.piece_map[offset].store(0, Ordering::Relaxed);
            return;
        }

        // root mismatch: compare the piece layer entry by entry
        let piece_size = self.storage.piece_size();
        let layer_offset = piece_size.ilog2() - BLOCK_SIZE.ilog2();
        let depth = tree.height().saturating_sub(layer_offset);
        let mut layer = tree.layer(depth);
        layer.truncate(entry.file_size().div_ceil(piece_size) as usize);

        for (slot, computed) in layer.iter().enumerate().take(reference_layer.len()) {
            let valid = *computed == reference_layer[slot];
            self.piece_map[offset + slot].store(u8::from(valid), Ordering::Relaxed);
        }
    }
}

impl ChunkSink for V2VerifySink {
    type Worker = Box<dyn Hasher>;

    fn make_worker(&self) -> Self::Worker {
        make_hasher(HashFunction::Sha256)
    }

    fn process(&self, worker: &mut Self::Worker, chunk: &DataChunk) {
        let file_index = chunk.file_index as usize;

        // whole file missing: processed, all its slots stay invalid
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
        let index_offset =
            (u64::from(chunk.piece_index) * self.storage.piece_size() / BLOCK_SIZE) as usize;

        let mut digest = [0u8; 32];
        for i in 0..blocks_in_chunk {
            let start = i * block_size;
            let end = (start + block_size).min(data.len());
            worker.update(&data[start..end]);
            worker.finalize_to(&mut digest);
            tree.set_leaf(index_offset + i, Sha256Digest::new(digest));
            self.progress.add_hashed((end - start) as u64);
        }

        let previous = self.file_bytes_hashed[file_index]
            .fetch_add(data.len() as u64, Ordering::AcqRel);
        if previous == entry.file_size() - data.len() as u64 {
            self.verify_file(worker, file_index);
        }

        self.progress.add_done(data.len() as u64);
    }

    fn progress(&self) -> &Progress {
        &self.progress
    }
}
