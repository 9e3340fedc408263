//! A single file inside a torrent's storage.

use crate::attributes::FileAttributes;
use crate::crypto::{Checksum, HashFunction, Sha256Digest};
use crate::error::MetafileError;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

/// How [`FileEntry::from_path`] treats filesystem metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileOptions {
    /// Size only.
    None,
    /// Detect executable and hidden attributes (BEP-47).
    #[default]
    AddAttributes,
    /// Like `AddAttributes`, and store symlinks as symlinks instead of
    /// their targets.
    CopySymlinks,
}

#[derive(Debug, Clone, Default)]
struct V2Data {
    pieces_root: Option<Sha256Digest>,
    piece_layer: Option<Vec<Sha256Digest>>,
}

/// One file of a torrent.
///
/// Paths are relative to the storage root, UTF-8, and never escape it.
/// The v2 Merkle data and the checksum map have interior locks because the
/// hashing pipeline fills them from worker threads; everything else is
/// immutable after construction.
#[derive(Debug)]
pub struct FileEntry {
    path: PathBuf,
    file_size: u64,
    attributes: Option<FileAttributes>,
    symlink_path: Option<PathBuf>,
    last_modified: Mutex<Option<SystemTime>>,
    v2: Mutex<V2Data>,
    checksums: Mutex<BTreeMap<HashFunction, Checksum>>,
}

impl FileEntry {
    /// Create an entry with an explicit size, validating the path.
    pub fn new(path: impl Into<PathBuf>, file_size: u64) -> Result<Self, MetafileError> {
        let path = path.into();
        validate_relative_path(&path)?;
        Ok(Self {
            path,
            file_size,
            attributes: None,
            symlink_path: None,
            last_modified: Mutex::new(None),
            v2: Mutex::new(V2Data::default()),
            checksums: Mutex::new(BTreeMap::new()),
        })
    }

    /// Create an entry with attributes and an optional symlink target.
    pub fn with_attributes(
        path: impl Into<PathBuf>,
        file_size: u64,
        attributes: Option<FileAttributes>,
        symlink_path: Option<PathBuf>,
    ) -> Result<Self, MetafileError> {
        let mut entry = Self::new(path, file_size)?;
        if let Some(target) = &symlink_path {
            validate_relative_path(target)?;
        }
        entry.attributes = attributes;
        entry.symlink_path = symlink_path;
        Ok(entry)
    }

    /// Stat `file` and build an entry with its path relative to
    /// `root_directory`.
    pub fn from_path(
        file: &Path,
        root_directory: &Path,
        options: FileOptions,
    ) -> Result<Self, MetafileError> {
        let relative = file
            .strip_prefix(root_directory)
            .map_err(|_| MetafileError::InvalidPath {
                path: file.display().to_string(),
                reason: "file lies outside the root directory",
            })?
            .to_path_buf();

        let symlink_metadata = std::fs::symlink_metadata(file)?;
        let is_symlink = symlink_metadata.file_type().is_symlink();

        if is_symlink && options == FileOptions::CopySymlinks {
            let target = std::fs::read_link(file)?;
            let mut attributes = FileAttributes::SYMLINK;
            if is_hidden_name(&relative) {
                attributes.insert(FileAttributes::HIDDEN);
            }
            // symlink entries carry no data of their own
            return Self::with_attributes(relative, 0, Some(attributes), Some(target));
        }

        let metadata = std::fs::metadata(file)?;
        let mut entry = Self::new(relative, metadata.len())?;

        if matches!(options, FileOptions::AddAttributes | FileOptions::CopySymlinks) {
            let mut attributes = FileAttributes::empty();
            if is_hidden_name(&entry.path) {
                attributes.insert(FileAttributes::HIDDEN);
            }
            if is_executable(&metadata) {
                attributes.insert(FileAttributes::EXECUTABLE);
            }
            if !attributes.is_empty() {
                entry.attributes = Some(attributes);
            }
        }
        if let Ok(modified) = metadata.modified() {
            entry.set_last_modified(modified);
        }
        Ok(entry)
    }

    /// A BEP-47 padding file: `.pad/<size>`, carrying the padding attribute.
    pub fn padding(padding_size: u64) -> Self {
        Self {
            path: PathBuf::from(".pad").join(padding_size.to_string()),
            file_size: padding_size,
            attributes: Some(FileAttributes::PADDING),
            symlink_path: None,
            last_modified: Mutex::new(None),
            v2: Mutex::new(V2Data::default()),
            checksums: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn attributes(&self) -> Option<FileAttributes> {
        self.attributes
    }

    pub fn is_symlink(&self) -> bool {
        self.attributes.is_some_and(FileAttributes::is_symlink)
    }

    pub fn is_executable(&self) -> bool {
        self.attributes.is_some_and(FileAttributes::is_executable)
    }

    pub fn is_hidden(&self) -> bool {
        self.attributes.is_some_and(FileAttributes::is_hidden)
    }

    pub fn is_padding_file(&self) -> bool {
        self.attributes.is_some_and(FileAttributes::is_padding)
    }

    pub fn symlink_path(&self) -> Option<&Path> {
        self.symlink_path.as_deref()
    }

    pub fn last_modified(&self) -> Option<SystemTime> {
        *lock(&self.last_modified)
    }

    pub fn set_last_modified(&self, time: SystemTime) {
        *lock(&self.last_modified) = Some(time);
    }

    /// True once the hashing pipeline (or the parser) stored a pieces root.
    pub fn has_v2_data(&self) -> bool {
        lock(&self.v2).pieces_root.is_some()
    }

    pub fn pieces_root(&self) -> Option<Sha256Digest> {
        lock(&self.v2).pieces_root
    }

    pub fn set_pieces_root(&self, root: Sha256Digest) {
        lock(&self.v2).pieces_root = Some(root);
    }

    /// The piece layer, empty for files no larger than the piece size.
    pub fn piece_layer(&self) -> Vec<Sha256Digest> {
        lock(&self.v2).piece_layer.clone().unwrap_or_default()
    }

    pub fn set_piece_layer(&self, layer: Vec<Sha256Digest>) {
        lock(&self.v2).piece_layer = Some(layer);
    }

    pub fn checksum(&self, algorithm: HashFunction) -> Option<Checksum> {
        lock(&self.checksums).get(&algorithm).cloned()
    }

    pub fn checksums(&self) -> Vec<Checksum> {
        lock(&self.checksums).values().cloned().collect()
    }

    /// Attach a checksum, replacing any previous one for the algorithm.
    /// Serialized by the per-entry lock.
    pub fn add_checksum(&self, checksum: Checksum) {
        lock(&self.checksums).insert(checksum.algorithm(), checksum);
    }
}

impl Clone for FileEntry {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            file_size: self.file_size,
            attributes: self.attributes,
            symlink_path: self.symlink_path.clone(),
            last_modified: Mutex::new(*lock(&self.last_modified)),
            v2: Mutex::new(lock(&self.v2).clone()),
            checksums: Mutex::new(lock(&self.checksums).clone()),
        }
    }
}

impl PartialEq for FileEntry {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
            && self.file_size == other.file_size
            && self.attributes == other.attributes
            && self.symlink_path == other.symlink_path
    }
}

impl Eq for FileEntry {}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn is_hidden_name(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'))
}

#[cfg(unix)]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &std::fs::Metadata) -> bool {
    false
}

/// Validate a torrent-relative path: UTF-8, no absolute components, no `..`,
/// no `.`, not empty.
pub(crate) fn validate_relative_path(path: &Path) -> Result<(), MetafileError> {
    let fail = |reason| MetafileError::InvalidPath {
        path: path.display().to_string(),
        reason,
    };

    if path.as_os_str().is_empty() {
        return Err(fail("path is empty"));
    }
    if path.to_str().is_none() {
        return Err(fail("path is not valid UTF-8"));
    }
    for component in path.components() {
        match component {
            Component::Normal(part) if !part.is_empty() => {}
            Component::Normal(_) => return Err(fail("empty path component")),
            Component::ParentDir => return Err(fail("path escapes the root with \"..\"")),
            Component::CurDir => return Err(fail("\".\" component")),
            Component::RootDir | Component::Prefix(_) => return Err(fail("path is absolute")),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_validation() {
        assert!(FileEntry::new("data/file.bin", 1).is_ok());
        assert!(FileEntry::new("/etc/passwd", 1).is_err());
        assert!(FileEntry::new("../escape", 1).is_err());
        assert!(FileEntry::new("a/../b", 1).is_err());
        assert!(FileEntry::new("", 1).is_err());
        assert!(FileEntry::new("./x", 1).is_err());
    }

    #[test]
    fn padding_entry() {
        let pad = FileEntry::padding(901 * 1024);
        assert!(pad.is_padding_file());
        assert_eq!(pad.path(), Path::new(".pad/922624"));
        assert_eq!(pad.file_size(), 922624);
    }

    #[test]
    fn v2_data_set_once_by_pipeline() {
        let entry = FileEntry::new("a", 10).unwrap();
        assert!(!entry.has_v2_data());
        assert!(entry.piece_layer().is_empty());

        entry.set_pieces_root(Sha256Digest::new([1; 32]));
        entry.set_piece_layer(vec![Sha256Digest::new([2; 32])]);
        assert!(entry.has_v2_data());
        assert_eq!(entry.pieces_root(), Some(Sha256Digest::new([1; 32])));
        assert_eq!(entry.piece_layer().len(), 1);
    }

    #[test]
    fn checksums_replace_by_algorithm() {
        let entry = FileEntry::new("a", 10).unwrap();
        entry.add_checksum(Checksum::new(HashFunction::Md5, vec![0; 16]));
        entry.add_checksum(Checksum::new(HashFunction::Md5, vec![1; 16]));
        let checksums = entry.checksums();
        assert_eq!(checksums.len(), 1);
        assert_eq!(checksums[0].value(), &[1; 16][..]);
    }

    #[test]
    fn equality_ignores_hash_state() {
        let a = FileEntry::new("a", 10).unwrap();
        let b = FileEntry::new("a", 10).unwrap();
        b.set_pieces_root(Sha256Digest::new([1; 32]));
        assert_eq!(a, b);
    }
}
