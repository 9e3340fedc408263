//! Container for the files of a torrent and its v1 piece table.

use crate::crypto::Sha1Digest;
use crate::error::MetafileError;
use crate::file_entry::{FileEntry, FileOptions};
use log::debug;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

const TARGET: &str = "squall_metafile::storage";

/// 16 KiB: the v2 Merkle leaf size and the minimum piece size.
pub const BLOCK_SIZE: u64 = 16 * 1024;

/// Which protocol's integrity data a storage object carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// No piece data yet; files have not been hashed.
    None,
    V1,
    V2,
    Hybrid,
}

/// Single-file torrents store the name inline; multi-file torrents use a
/// file list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    Empty,
    Single,
    Multi,
}

/// Ordered file list, piece size and v1 piece table.
///
/// The piece table sits behind a lock so hasher workers can write distinct
/// indices through `&self`; everything structural (adding files, piece size)
/// takes `&mut self` and happens before hashing starts.
#[derive(Debug, Default)]
pub struct FileStorage {
    root_directory: PathBuf,
    files: Vec<FileEntry>,
    piece_size: u64,
    total_file_size: u64,
    total_regular_file_size: u64,
    pieces: Mutex<Vec<Sha1Digest>>,
}

impl FileStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_root_directory(&self) -> bool {
        !self.root_directory.as_os_str().is_empty()
    }

    pub fn root_directory(&self) -> &Path {
        &self.root_directory
    }

    /// Associate the storage with a physical directory.
    pub fn set_root_directory(&mut self, root: &Path) -> Result<(), MetafileError> {
        self.root_directory = std::fs::canonicalize(root)?;
        Ok(())
    }

    /// Set a root without touching the filesystem, for storages parsed from
    /// a metafile.
    pub fn set_root_directory_unchecked(&mut self, root: impl Into<PathBuf>) {
        self.root_directory = root.into();
    }

    pub fn add_file(&mut self, file: FileEntry) {
        let size = file.file_size();
        self.total_file_size += size;
        if !file.is_padding_file() {
            self.total_regular_file_size += size;
        }
        self.files.push(file);
    }

    /// Stat `path` and add it with its path relative to the root directory.
    pub fn add_file_from_path(
        &mut self,
        path: &Path,
        options: FileOptions,
    ) -> Result<(), MetafileError> {
        let entry = FileEntry::from_path(path, &self.root_directory, options)?;
        self.add_file(entry);
        Ok(())
    }

    pub fn add_files(&mut self, files: impl IntoIterator<Item = FileEntry>) {
        for file in files {
            self.add_file(file);
        }
    }

    /// Remove the file at `index`, adjusting totals.
    pub fn remove_file(&mut self, index: usize) -> Option<FileEntry> {
        if index >= self.files.len() {
            return None;
        }
        let entry = self.files.remove(index);
        self.total_file_size -= entry.file_size();
        if !entry.is_padding_file() {
            self.total_regular_file_size -= entry.file_size();
        }
        Some(entry)
    }

    pub fn clear(&mut self) {
        self.files.clear();
        self.total_file_size = 0;
        self.total_regular_file_size = 0;
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// File count excluding padding files.
    pub fn regular_file_count(&self) -> usize {
        self.files.iter().filter(|f| !f.is_padding_file()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn at(&self, index: usize) -> &FileEntry {
        &self.files[index]
    }

    pub fn get(&self, index: usize) -> Option<&FileEntry> {
        self.files.get(index)
    }

    pub fn files(&self) -> &[FileEntry] {
        &self.files
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FileEntry> {
        self.files.iter()
    }

    /// Total size including padding files.
    pub fn total_file_size(&self) -> u64 {
        self.total_file_size
    }

    /// Total size of real data, excluding padding files.
    pub fn total_regular_file_size(&self) -> u64 {
        self.total_regular_file_size
    }

    pub fn file_mode(&self) -> FileMode {
        match self.files.len() {
            0 => FileMode::Empty,
            1 if self.files[0].path().components().count() == 1 => FileMode::Single,
            _ => FileMode::Multi,
        }
    }

    /// Protocol support derivable from the present piece data.
    ///
    /// `None` until files are hashed; `Hybrid` when both the v1 piece table
    /// and per-file v2 data are complete.
    pub fn protocol(&self) -> Protocol {
        let v1 = !lock(&self.pieces).is_empty();
        let v2 = !self.files.is_empty()
            && self.files.iter().all(|f| {
                // padding files, symlinks and empty files carry no v2 data
                f.is_padding_file() || f.is_symlink() || f.file_size() == 0 || f.has_v2_data()
            });

        match (v1, v2) {
            (true, true) => Protocol::Hybrid,
            (true, false) => Protocol::V1,
            (false, true) => Protocol::V2,
            (false, false) => Protocol::None,
        }
    }

    pub fn piece_size(&self) -> u64 {
        self.piece_size
    }

    /// Number of pieces: `ceil(total_size / piece_size)`.
    pub fn piece_count(&self) -> u64 {
        if self.piece_size == 0 {
            0
        } else {
            self.total_file_size.div_ceil(self.piece_size)
        }
    }

    /// Set the piece size. Must be a power of two of at least 16 KiB.
    pub fn set_piece_size(&mut self, size: u64) -> Result<(), MetafileError> {
        if size < BLOCK_SIZE || !size.is_power_of_two() {
            return Err(MetafileError::InvalidPieceSize(size));
        }
        self.piece_size = size;
        Ok(())
    }

    /// Pick and set a piece size from the total file size (§ "piece-size
    /// auto-selection"): `2 ^ clamp(ceil(log2(total)) - 9, 15, 24)`,
    /// i.e. 32 KiB through 16 MiB.
    pub fn auto_piece_size(&mut self) -> u64 {
        let exp = ceil_log2(self.total_file_size).saturating_sub(9).clamp(15, 24);
        let piece_size = 1u64 << exp;
        debug!(
            target: TARGET,
            "auto piece size for {} bytes: 2^{exp}", self.total_file_size
        );
        self.piece_size = piece_size;
        piece_size
    }

    /// Size the v1 piece table to `piece_count`, clearing previous hashes.
    pub fn allocate_pieces(&mut self) {
        let count = usize::try_from(self.piece_count()).unwrap_or(usize::MAX);
        let mut pieces = lock(&self.pieces);
        pieces.clear();
        pieces.resize(count, Sha1Digest::ZERO);
    }

    /// Store the hash of one piece. Thread-safe; the pipeline writes every
    /// index exactly once.
    pub fn set_piece_hash(&self, index: u64, hash: Sha1Digest) {
        let mut pieces = lock(&self.pieces);
        pieces[index as usize] = hash;
    }

    pub fn piece_hash(&self, index: u64) -> Sha1Digest {
        lock(&self.pieces)[index as usize]
    }

    /// Snapshot of the v1 piece table.
    pub fn pieces(&self) -> Vec<Sha1Digest> {
        lock(&self.pieces).clone()
    }

    pub fn allocated_piece_count(&self) -> u64 {
        lock(&self.pieces).len() as u64
    }

    /// `[first, last)` piece indices whose byte range covers file `index`.
    pub fn get_pieces_offsets(&self, index: usize) -> (u64, u64) {
        let cumulative: u64 = self.files[..index].iter().map(FileEntry::file_size).sum();
        let offset = cumulative / self.piece_size;
        let count = self.files[index].file_size().div_ceil(self.piece_size);
        (offset, offset + count)
    }

    /// The contiguous slice of v1 pieces covering file `index`.
    pub fn get_pieces_span(&self, index: usize) -> Vec<Sha1Digest> {
        let (first, last) = self.get_pieces_offsets(index);
        lock(&self.pieces)[first as usize..last as usize].to_vec()
    }

    /// True when every regular file starts on a piece boundary.
    pub fn is_piece_aligned(&self) -> bool {
        debug_assert_ne!(self.piece_size, 0);
        let mut offset = 0u64;
        let mut aligned = true;
        for entry in &self.files {
            if !entry.is_padding_file() {
                aligned &= offset % self.piece_size == 0;
            }
            offset += entry.file_size();
        }
        aligned
    }

    /// Insert padding files so that every file except the last starts and
    /// ends on a piece boundary (BEP-47, used for hybrid torrents).
    pub fn optimize_alignment(&mut self) {
        debug_assert_ne!(self.piece_size, 0);
        if self.files.len() < 2 {
            return;
        }

        let piece_size = self.piece_size;
        let old = std::mem::take(&mut self.files);
        let last_index = old.len() - 1;
        self.total_file_size = 0;
        self.total_regular_file_size = 0;

        let mut padding_total = 0u64;
        for (index, entry) in old.into_iter().enumerate() {
            let remainder = entry.file_size() % piece_size;
            let is_last = index == last_index;
            self.add_file(entry);

            if !is_last && remainder != 0 {
                let padding_size = piece_size - remainder;
                padding_total += padding_size;
                self.add_file(FileEntry::padding(padding_size));
            }
        }

        debug!(target: TARGET, "alignment inserted {padding_total} padding bytes");
        debug_assert_eq!(
            self.total_file_size,
            self.total_regular_file_size + padding_total
        );
    }

    /// Cumulative file sizes, first entry excluded:
    /// `[0, s0, s0+s1, ...]` without the grand total.
    pub fn exclusive_file_size_scan(&self) -> Vec<u64> {
        let mut result = Vec::with_capacity(self.files.len());
        let mut sum = 0u64;
        for file in &self.files {
            result.push(sum);
            sum += file.file_size();
        }
        result
    }

    /// Inclusive cumulative sizes with padding counted, matching v1
    /// `bytes_done` accounting.
    pub fn inclusive_file_size_scan_v1(&self) -> Vec<u64> {
        let mut sum = 0u64;
        self.files
            .iter()
            .map(|f| {
                sum += f.file_size();
                sum
            })
            .collect()
    }

    /// Inclusive cumulative sizes with padding files counted as zero,
    /// matching v2 `bytes_done` accounting.
    pub fn inclusive_file_size_scan_v2(&self) -> Vec<u64> {
        let mut sum = 0u64;
        self.files
            .iter()
            .map(|f| {
                if !f.is_padding_file() {
                    sum += f.file_size();
                }
                sum
            })
            .collect()
    }

    /// Absolute on-disk paths of all files.
    pub fn absolute_file_paths(&self) -> Result<Vec<PathBuf>, MetafileError> {
        if !self.has_root_directory() {
            return Err(MetafileError::InvalidPath {
                path: String::new(),
                reason: "storage has no physical root directory",
            });
        }
        Ok(self
            .files
            .iter()
            .map(|f| self.root_directory.join(f.path()))
            .collect())
    }
}

impl Clone for FileStorage {
    fn clone(&self) -> Self {
        Self {
            root_directory: self.root_directory.clone(),
            files: self.files.clone(),
            piece_size: self.piece_size,
            total_file_size: self.total_file_size,
            total_regular_file_size: self.total_regular_file_size,
            pieces: Mutex::new(lock(&self.pieces).clone()),
        }
    }
}

impl PartialEq for FileStorage {
    fn eq(&self, other: &Self) -> bool {
        self.root_directory == other.root_directory
            && self.files == other.files
            && self.piece_size == other.piece_size
    }
}

impl Eq for FileStorage {}

impl<'a> IntoIterator for &'a FileStorage {
    type Item = &'a FileEntry;
    type IntoIter = std::slice::Iter<'a, FileEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.iter()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn ceil_log2(value: u64) -> u32 {
    match value {
        0 | 1 => 0,
        v => u64::BITS - (v - 1).leading_zeros(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;

    fn storage_with(sizes: &[u64]) -> FileStorage {
        let mut storage = FileStorage::new();
        for (i, size) in sizes.iter().enumerate() {
            storage.add_file(FileEntry::new(format!("dir/file{i}"), *size).unwrap());
        }
        storage
    }

    #[test]
    fn piece_count_identity() {
        let mut storage = storage_with(&[100 * KIB, 60 * KIB]);
        storage.set_piece_size(32 * KIB).unwrap();
        assert_eq!(storage.piece_count(), (160 * KIB).div_ceil(32 * KIB));

        let mut exact = storage_with(&[64 * KIB]);
        exact.set_piece_size(16 * KIB).unwrap();
        assert_eq!(exact.piece_count(), 4);
    }

    #[test]
    fn piece_size_validation() {
        let mut storage = storage_with(&[MIB]);
        assert!(storage.set_piece_size(8 * KIB).is_err());
        assert!(storage.set_piece_size(48 * KIB).is_err());
        assert!(storage.set_piece_size(16 * KIB).is_ok());
    }

    #[test]
    fn auto_piece_size_scenarios() {
        // 100 MiB: ceil(log2) = 27, clamp(27 - 9) = 18 -> 256 KiB
        let mut storage = storage_with(&[100 * MIB]);
        assert_eq!(storage.auto_piece_size(), 256 * KIB);

        // tiny torrents clamp to 32 KiB
        let mut storage = storage_with(&[KIB]);
        assert_eq!(storage.auto_piece_size(), 32 * KIB);

        // enormous torrents clamp to 16 MiB
        let mut storage = storage_with(&[400 * 1024 * MIB]);
        assert_eq!(storage.auto_piece_size(), 16 * MIB);
    }

    #[test]
    fn alignment_scenario() {
        // Sizes [2 MiB, 123 KiB, 3 KiB, 18 KiB] at P = 1 MiB: padding after
        // the second and third files only; six entries total.
        let mut storage = storage_with(&[2 * MIB, 123 * KIB, 3 * KIB, 18 * KIB]);
        storage.set_piece_size(MIB).unwrap();
        storage.optimize_alignment();

        let layout: Vec<(bool, u64)> = storage
            .iter()
            .map(|f| (f.is_padding_file(), f.file_size()))
            .collect();
        assert_eq!(
            layout,
            [
                (false, 2 * MIB),
                (false, 123 * KIB),
                (true, MIB - 123 * KIB),
                (false, 3 * KIB),
                (true, MIB - 3 * KIB),
                (false, 18 * KIB),
            ]
        );

        assert!(storage.is_piece_aligned());
        assert_eq!(
            storage.total_file_size(),
            storage.total_regular_file_size() + (MIB - 123 * KIB) + (MIB - 3 * KIB)
        );
    }

    #[test]
    fn alignment_skips_already_aligned_files() {
        let mut storage = storage_with(&[MIB, MIB, 3 * KIB]);
        storage.set_piece_size(MIB).unwrap();
        storage.optimize_alignment();
        assert_eq!(storage.file_count(), 3);
        assert!(storage.is_piece_aligned());
    }

    #[test]
    fn pieces_span() {
        let mut storage = storage_with(&[80 * KIB, 40 * KIB]);
        storage.set_piece_size(32 * KIB).unwrap();
        storage.allocate_pieces();
        assert_eq!(storage.allocated_piece_count(), 4);

        // file 0 covers pieces [0, 3); file 1 covers [2, 4)
        assert_eq!(storage.get_pieces_offsets(0), (0, 3));
        assert_eq!(storage.get_pieces_offsets(1), (2, 4));

        storage.set_piece_hash(2, Sha1Digest::new([9; 20]));
        assert_eq!(storage.get_pieces_span(1)[0], Sha1Digest::new([9; 20]));
    }

    #[test]
    fn file_modes() {
        let mut single = FileStorage::new();
        single.add_file(FileEntry::new("file.bin", 1).unwrap());
        assert_eq!(single.file_mode(), FileMode::Single);

        // one file inside a directory is still a multi-file layout
        let nested = storage_with(&[1]);
        assert_eq!(nested.file_mode(), FileMode::Multi);

        assert_eq!(FileStorage::new().file_mode(), FileMode::Empty);
    }

    #[test]
    fn protocol_detection() {
        let mut storage = storage_with(&[32 * KIB]);
        storage.set_piece_size(32 * KIB).unwrap();
        assert_eq!(storage.protocol(), Protocol::None);

        storage.allocate_pieces();
        assert_eq!(storage.protocol(), Protocol::V1);

        storage.at(0).set_pieces_root(crate::crypto::Sha256Digest::new([1; 32]));
        assert_eq!(storage.protocol(), Protocol::Hybrid);
    }

    #[test]
    fn remove_file_updates_totals() {
        let mut storage = storage_with(&[10, 20]);
        storage.add_file(FileEntry::padding(30));
        assert_eq!(storage.total_file_size(), 60);
        assert_eq!(storage.total_regular_file_size(), 30);

        storage.remove_file(2);
        assert_eq!(storage.total_file_size(), 30);
        assert_eq!(storage.total_regular_file_size(), 30);
        assert_eq!(storage.regular_file_count(), 2);
    }

    #[test]
    fn size_scans() {
        let mut storage = storage_with(&[10, 20]);
        storage.add_file(FileEntry::padding(5));
        storage.add_file(FileEntry::new("dir/tail", 7).unwrap());

        assert_eq!(storage.exclusive_file_size_scan(), [0, 10, 30, 35]);
        assert_eq!(storage.inclusive_file_size_scan_v1(), [10, 30, 35, 42]);
        assert_eq!(storage.inclusive_file_size_scan_v2(), [10, 30, 30, 37]);
    }
}
