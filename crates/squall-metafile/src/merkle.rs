//! Balanced binary SHA-256 Merkle tree, one per file for v2 torrents.
//!
//! The tree is stored as a flat array of `2^(h+1) - 1` digests where
//! `h = ceil(log2(leaf_count))`. Leaves occupy the trailing `2^h` slots;
//! leaves past the logical leaf count stay the zero digest, which is exactly
//! the BEP-52 padding rule when leaves are hashes of zero-filled blocks.
//!
//! `parent(i) = (i - 1) / 2`, `left(i) = 2i + 1`, `right(i) = 2i + 2`.
//! Flat indices are 64-bit; `1u64 << layer` never overflows for any tree a
//! real file can produce.

use crate::crypto::{Hasher, Sha256Digest};
use std::sync::{Mutex, PoisonError};

/// Flat index of node `index` within `layer`.
fn flat_index(layer: u32, index: usize) -> usize {
    (1usize << layer) - 1 + index
}

/// Per-file SHA-256 Merkle tree with interior locking.
///
/// [`set_leaf`](MerkleTree::set_leaf) takes `&self` so hasher workers can
/// fill disjoint leaves concurrently; the finalizing worker then calls
/// [`update`](MerkleTree::update) and reads [`root`](MerkleTree::root)
/// through the same lock, which publishes all leaf writes.
#[derive(Debug)]
pub struct MerkleTree {
    nodes: Mutex<Vec<Sha256Digest>>,
    height: u32,
}

impl MerkleTree {
    /// A tree with room for `leaf_count` leaves, all zero.
    pub fn new(leaf_count: u64) -> Self {
        if leaf_count == 0 {
            return Self::empty();
        }
        let height = leaf_count.next_power_of_two().trailing_zeros();
        let node_count = (1usize << (height + 1)) - 1;
        Self {
            nodes: Mutex::new(vec![Sha256Digest::ZERO; node_count]),
            height,
        }
    }

    /// A tree with no nodes. Placeholder for padding files, so tree indices
    /// line up with file indices.
    pub fn empty() -> Self {
        Self {
            nodes: Mutex::new(Vec::new()),
            height: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of leaf slots, padding included.
    pub fn leaf_capacity(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            1usize << self.height
        }
    }

    pub fn node_count(&self) -> usize {
        self.lock().len()
    }

    /// Store a leaf digest. Thread-safe; distinct indices never clobber
    /// each other.
    pub fn set_leaf(&self, index: usize, digest: Sha256Digest) {
        let flat = flat_index(self.height, index);
        let mut nodes = self.lock();
        nodes[flat] = digest;
    }

    pub fn leaf(&self, index: usize) -> Sha256Digest {
        self.lock()[flat_index(self.height, index)]
    }

    /// Compute all interior nodes bottom-up from the leaves.
    pub fn update(&self, hasher: &mut dyn Hasher) {
        let mut nodes = self.lock();
        if nodes.is_empty() {
            return;
        }

        let mut out = [0u8; 32];
        for layer in (1..=self.height).rev() {
            let layer_nodes = 1usize << layer;
            for i in (0..layer_nodes).step_by(2) {
                let left = flat_index(layer, i);
                hasher.update(nodes[left].as_ref());
                hasher.update(nodes[left + 1].as_ref());
                hasher.finalize_to(&mut out);
                nodes[flat_index(layer - 1, i / 2)] = Sha256Digest::new(out);
            }
        }
    }

    /// The root digest. Zero until [`update`](MerkleTree::update) ran.
    pub fn root(&self) -> Sha256Digest {
        self.lock().first().copied().unwrap_or_default()
    }

    /// All nodes of `depth`, left to right. Depth 0 is the root.
    pub fn layer(&self, depth: u32) -> Vec<Sha256Digest> {
        debug_assert!(depth <= self.height);
        let nodes = self.lock();
        let start = flat_index(depth, 0);
        let count = 1usize << depth;
        nodes[start..start + count].to_vec()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Sha256Digest>> {
        self.nodes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
