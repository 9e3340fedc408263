//! Canonical bencode serialization and infohash computation.
//!
//! Key order is dictated by canonical bencode (ascending raw bytes), which
//! [`Dict`] maintains on insert; nothing here needs to care about ordering.
//! Optional fields are omitted when empty, and `private` only appears when
//! true, keeping the output minimal and stable.

use crate::crypto::{make_hasher, HashFunction, Sha1Digest, Sha256Digest};
use crate::error::MetafileError;
use crate::file_entry::FileEntry;
use crate::metafile::Metafile;
use crate::storage::{FileMode, FileStorage, Protocol};
use squall_bencode::{encode, Dict, Value};

fn int(value: u64) -> Value {
    Value::Integer(value as i64)
}

impl Metafile {
    /// The complete metafile as a bencode value, laid out for the protocol
    /// the storage supports.
    pub fn to_value(&self) -> Result<Value, MetafileError> {
        let mut torrent = self.common_dict();

        match self.protocol() {
            Protocol::None => {
                return Err(MetafileError::InvalidValue {
                    field: "info",
                    reason: "storage has no piece data; hash the files first".into(),
                })
            }
            Protocol::V1 => {
                torrent.insert("info", self.info_dict_v1()?);
            }
            Protocol::V2 => {
                torrent.insert("info", self.info_dict_v2()?);
                torrent.insert("piece layers", piece_layers_dict(self.storage()));
            }
            Protocol::Hybrid => {
                torrent.insert("info", self.info_dict_hybrid()?);
                torrent.insert("piece layers", piece_layers_dict(self.storage()));
            }
        }
        Ok(Value::Dict(torrent))
    }

    /// Canonical wire form of the metafile.
    pub fn encode(&self) -> Result<Vec<u8>, MetafileError> {
        Ok(encode(&self.to_value()?))
    }

    /// SHA-1 over the canonical v1 info dict (v1 and hybrid torrents).
    pub fn infohash_v1(&self) -> Result<Sha1Digest, MetafileError> {
        let info = match self.protocol() {
            Protocol::V1 => self.info_dict_v1()?,
            Protocol::Hybrid => self.info_dict_hybrid()?,
            _ => {
                return Err(MetafileError::InvalidValue {
                    field: "info",
                    reason: "no v1 piece data".into(),
                })
            }
        };
        let mut hasher = make_hasher(HashFunction::Sha1);
        let mut out = [0u8; 20];
        hasher.update(&encode(&info));
        hasher.finalize_to(&mut out);
        Ok(Sha1Digest::new(out))
    }

    /// SHA-256 over the canonical v2 info dict (v2 and hybrid torrents).
    pub fn infohash_v2(&self) -> Result<Sha256Digest, MetafileError> {
        let info = match self.protocol() {
            Protocol::V2 => self.info_dict_v2()?,
            Protocol::Hybrid => self.info_dict_hybrid()?,
            _ => {
                return Err(MetafileError::InvalidValue {
                    field: "info",
                    reason: "no v2 piece data".into(),
                })
            }
        };
        let mut hasher = make_hasher(HashFunction::Sha256);
        let mut out = [0u8; 32];
        hasher.update(&encode(&info));
        hasher.finalize_to(&mut out);
        Ok(Sha256Digest::new(out))
    }

    /// Top-level keys shared by every protocol.
    fn common_dict(&self) -> Dict {
        let mut torrent = Dict::new();

        if let Some(first) = self.trackers().first() {
            // `announce` mirrors the first tracker for single-tracker clients
            torrent.insert("announce", first.url.as_str());
            let tiers: Vec<Value> = self
                .trackers()
                .tiers()
                .into_iter()
                .map(|tier| Value::List(tier.into_iter().map(Value::from).collect()))
                .collect();
            torrent.insert("announce-list", Value::List(tiers));
        }
        if !self.comment().is_empty() {
            torrent.insert("comment", self.comment());
        }
        if !self.created_by().is_empty() {
            torrent.insert("created by", self.created_by());
        }
        if self.creation_date() != 0 {
            torrent.insert("creation date", Value::Integer(self.creation_date()));
        }
        let collections: Vec<Value> = self.collections().map(Value::from).collect();
        if !collections.is_empty() {
            torrent.insert("collections", Value::List(collections));
        }
        if !self.http_seeds().is_empty() {
            let seeds = self.http_seeds().iter().map(|s| Value::from(s.as_str()));
            torrent.insert("httpseeds", Value::List(seeds.collect()));
        }
        let similar: Vec<Value> = self.similar_torrents().map(Value::from).collect();
        if !similar.is_empty() {
            torrent.insert("similar", Value::List(similar));
        }
        if !self.web_seeds().is_empty() {
            let seeds = self.web_seeds().iter().map(|s| Value::from(s.as_str()));
            torrent.insert("url-list", Value::List(seeds.collect()));
        }
        if !self.dht_nodes().is_empty() {
            let nodes = self.dht_nodes().iter().map(|n| {
                Value::List(vec![
                    Value::from(n.host.as_str()),
                    Value::Integer(i64::from(n.port)),
                ])
            });
            torrent.insert("nodes", Value::List(nodes.collect()));
        }
        torrent
    }

    /// The v1 info dict: `name`/`length` inline for single-file torrents,
    /// a `files` list otherwise.
    pub fn info_dict_v1(&self) -> Result<Value, MetafileError> {
        let storage = self.storage();
        let mut info = Dict::new();

        match storage.file_mode() {
            FileMode::Single => {
                let file = storage.at(0);
                info.insert("length", int(file.file_size()));
                info.insert("name", self.effective_name());
                add_file_extras(&mut info, file);
            }
            FileMode::Multi => {
                let files: Vec<Value> = storage.iter().map(file_dict_v1).collect();
                info.insert("files", Value::List(files));
                info.insert("name", self.effective_name());
            }
            FileMode::Empty => {
                return Err(MetafileError::InvalidValue {
                    field: "files",
                    reason: "storage contains no files".into(),
                })
            }
        }

        info.insert("piece length", int(storage.piece_size()));
        info.insert("pieces", v1_pieces_bytes(storage));
        self.add_info_scalars(&mut info);
        Ok(Value::Dict(info))
    }

    /// The v2 info dict with its nested `file tree`.
    pub fn info_dict_v2(&self) -> Result<Value, MetafileError> {
        let storage = self.storage();
        let mut info = Dict::new();

        info.insert("file tree", file_tree(storage)?);
        info.insert("meta version", Value::Integer(2));
        info.insert("name", self.effective_name());
        info.insert("piece length", int(storage.piece_size()));
        self.add_info_scalars(&mut info);
        Ok(Value::Dict(info))
    }

    /// The combined hybrid info dict: the v2 layout with the v1 `pieces`
    /// string and `files` list (padding included) embedded. Both infohashes
    /// are computed over this one dict.
    pub fn info_dict_hybrid(&self) -> Result<Value, MetafileError> {
        let storage = self.storage();
        let mut info = Dict::new();

        match storage.file_mode() {
            FileMode::Single => {
                let file = storage.at(0);
                info.insert("length", int(file.file_size()));
                add_file_extras(&mut info, file);
            }
            FileMode::Multi => {
                let files: Vec<Value> = storage.iter().map(file_dict_v1).collect();
                info.insert("files", Value::List(files));
            }
            FileMode::Empty => {
                return Err(MetafileError::InvalidValue {
                    field: "files",
                    reason: "storage contains no files".into(),
                })
            }
        }

        info.insert("file tree", file_tree(storage)?);
        info.insert("meta version", Value::Integer(2));
        info.insert("name", self.effective_name());
        info.insert("piece length", int(storage.piece_size()));
        info.insert("pieces", v1_pieces_bytes(storage));
        self.add_info_scalars(&mut info);
        Ok(Value::Dict(info))
    }

    /// `private` and `source` live inside the info dict: both are meant to
    /// change the infohash.
    fn add_info_scalars(&self, info: &mut Dict) {
        if self.is_private() {
            info.insert("private", Value::Integer(1));
        }
        if !self.source().is_empty() {
            info.insert("source", self.source());
        }
    }
}

/// A `files` list entry: length, path components, and the optional extras.
fn file_dict_v1(entry: &FileEntry) -> Value {
    let mut file = Dict::new();
    file.insert("length", int(entry.file_size()));
    let components: Vec<Value> = entry
        .path()
        .components()
        .map(|c| Value::from(c.as_os_str().to_string_lossy().as_ref()))
        .collect();
    file.insert("path", Value::List(components));
    add_file_extras(&mut file, entry);
    Value::Dict(file)
}

/// `attr`, `symlink path` and checksum keys shared by v1 and v2 layouts.
fn add_file_extras(dict: &mut Dict, entry: &FileEntry) {
    if let Some(attributes) = entry.attributes() {
        dict.insert("attr", attributes.to_string());
    }
    if let Some(target) = entry.symlink_path() {
        let components: Vec<Value> = target
            .components()
            .map(|c| Value::from(c.as_os_str().to_string_lossy().as_ref()))
            .collect();
        dict.insert("symlink path", Value::List(components));
    }
    for checksum in entry.checksums() {
        dict.insert(checksum.name(), checksum.value());
    }
}

/// The nested v2 `file tree`. Padding files are v1-only and skipped.
fn file_tree(storage: &FileStorage) -> Result<Value, MetafileError> {
    let mut tree = Dict::new();

    for entry in storage {
        if entry.is_padding_file() {
            continue;
        }

        let mut leaf = Dict::new();
        leaf.insert("length", int(entry.file_size()));
        if let Some(root) = entry.pieces_root() {
            leaf.insert("pieces root", root.as_ref());
        }
        add_file_extras(&mut leaf, entry);
        let mut wrapper = Dict::new();
        wrapper.insert("", Value::Dict(leaf));

        let components: Vec<String> = entry
            .path()
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        insert_tree_path(&mut tree, entry, &components, Value::Dict(wrapper))?;
    }
    Ok(Value::Dict(tree))
}

fn insert_tree_path(
    node: &mut Dict,
    entry: &FileEntry,
    components: &[String],
    leaf: Value,
) -> Result<(), MetafileError> {
    let (head, rest) = match components {
        [head] => {
            if node.contains_key(head.as_bytes()) {
                return Err(MetafileError::DuplicatePath(
                    entry.path().display().to_string(),
                ));
            }
            node.insert(head.as_str(), leaf);
            return Ok(());
        }
        [head, rest @ ..] => (head, rest),
        [] => {
            return Err(MetafileError::InvalidPath {
                path: String::new(),
                reason: "path is empty",
            })
        }
    };

    if !node.contains_key(head.as_bytes()) {
        node.insert(head.as_str(), Value::Dict(Dict::new()));
    }
    match node.get_mut(head.as_bytes()).and_then(Value::as_dict_mut) {
        // a dict holding "" is a file leaf, not a directory
        Some(child) if !child.contains_key(b"") => insert_tree_path(child, entry, rest, leaf),
        // a file where a directory is needed
        _ => Err(MetafileError::DuplicatePath(
            entry.path().display().to_string(),
        )),
    }
}

/// The concatenated 20-byte v1 piece hashes.
fn v1_pieces_bytes(storage: &FileStorage) -> Vec<u8> {
    let pieces = storage.pieces();
    let mut bytes = Vec::with_capacity(pieces.len() * 20);
    for piece in pieces {
        bytes.extend_from_slice(piece.as_ref());
    }
    bytes
}

/// `piece layers`: pieces root -> concatenated layer digests, only for
/// files larger than one piece.
fn piece_layers_dict(storage: &FileStorage) -> Value {
    let mut layers = Dict::new();
    for entry in storage {
        if entry.is_padding_file() || entry.file_size() <= storage.piece_size() {
            continue;
        }
        let Some(root) = entry.pieces_root() else {
            continue;
        };
        let layer = entry.piece_layer();
        let mut bytes = Vec::with_capacity(layer.len() * 32);
        for digest in layer {
            bytes.extend_from_slice(digest.as_ref());
        }
        layers.insert(root.as_ref(), bytes);
    }
    Value::Dict(layers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Checksum;
    use crate::file_entry::FileEntry;
    use crate::storage::BLOCK_SIZE;

    /// Scenario: a single 5-byte file "hello.txt" containing b"hello" at a
    /// 16 KiB piece size has one piece, SHA1("hello"), and a well-known
    /// infohash any implementation must agree on.
    #[test]
    fn single_file_v1_infohash() {
        let mut m = Metafile::new();
        m.storage_mut()
            .add_file(FileEntry::new("hello.txt", 5).unwrap());
        m.storage_mut().set_piece_size(BLOCK_SIZE).unwrap();
        m.storage_mut().allocate_pieces();
        assert_eq!(m.storage().piece_count(), 1);

        m.storage_mut().set_piece_hash(
            0,
            Sha1Digest::from_hex("aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d").unwrap(),
        );

        let info = m.info_dict_v1().unwrap();
        let expected: Vec<u8> = [
            &b"d6:lengthi5e4:name9:hello.txt12:piece lengthi16384e6:pieces20:"[..],
            crate::hexadecimal::decode_hex("aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d")
                .unwrap()
                .as_slice(),
            b"e",
        ]
        .concat();
        assert_eq!(encode(&info), expected);

        // infohash = SHA1 of exactly those bytes
        let mut hasher = make_hasher(HashFunction::Sha1);
        let mut out = [0u8; 20];
        hasher.update(&expected);
        hasher.finalize_to(&mut out);
        assert_eq!(m.infohash_v1().unwrap(), Sha1Digest::new(out));
    }

    #[test]
    fn private_flag_only_when_true() {
        let mut m = Metafile::new();
        m.storage_mut()
            .add_file(FileEntry::new("hello.txt", 5).unwrap());
        m.storage_mut().set_piece_size(BLOCK_SIZE).unwrap();
        m.storage_mut().allocate_pieces();

        let info = m.info_dict_v1().unwrap();
        assert!(info.get(b"private").is_none());

        m.set_private(true);
        let info = m.info_dict_v1().unwrap();
        assert_eq!(info.get(b"private").and_then(Value::as_integer), Some(1));
    }

    #[test]
    fn file_tree_nests_directories() {
        let mut m = Metafile::new();
        m.storage_mut()
            .add_file(FileEntry::new("docs/a.txt", BLOCK_SIZE).unwrap());
        m.storage_mut()
            .add_file(FileEntry::new("docs/b.txt", BLOCK_SIZE).unwrap());
        m.storage_mut().set_piece_size(BLOCK_SIZE).unwrap();
        for entry in m.storage().iter() {
            entry.set_pieces_root(Sha256Digest::new([3; 32]));
            entry.set_piece_layer(Vec::new());
        }

        let info = m.info_dict_v2().unwrap();
        let tree = info.get(b"file tree").unwrap();
        let docs = tree.get(b"docs").unwrap();
        let leaf = docs.get(b"a.txt").unwrap().get(b"").unwrap();
        assert_eq!(leaf.get(b"length").and_then(Value::as_integer), Some(16384));
        assert_eq!(
            leaf.get(b"pieces root").and_then(Value::as_bytes),
            Some(&[3u8; 32][..])
        );
        assert!(docs.get(b"b.txt").is_some());
    }

    #[test]
    fn duplicate_paths_rejected_in_tree() {
        let mut m = Metafile::new();
        m.storage_mut()
            .add_file(FileEntry::new("a/b", BLOCK_SIZE).unwrap());
        m.storage_mut().add_file(FileEntry::new("a", BLOCK_SIZE).unwrap());
        m.storage_mut().set_piece_size(BLOCK_SIZE).unwrap();
        for entry in m.storage().iter() {
            entry.set_pieces_root(Sha256Digest::new([3; 32]));
        }

        assert!(matches!(
            m.info_dict_v2(),
            Err(MetafileError::DuplicatePath(_))
        ));
    }

    #[test]
    fn checksums_serialize_under_algorithm_names() {
        let mut m = Metafile::new();
        let entry = FileEntry::new("dir/file", 5).unwrap();
        entry.add_checksum(Checksum::new(HashFunction::Md5, vec![0xab; 16]));
        m.storage_mut().add_file(entry);
        m.storage_mut().add_file(FileEntry::new("dir/other", 1).unwrap());
        m.storage_mut().set_piece_size(BLOCK_SIZE).unwrap();
        m.storage_mut().allocate_pieces();

        let info = m.info_dict_v1().unwrap();
        let files = info.get(b"files").unwrap().as_list().unwrap();
        assert_eq!(
            files[0].get(b"md5").and_then(Value::as_bytes),
            Some(&[0xab; 16][..])
        );
    }

    #[test]
    fn padding_files_stay_out_of_the_file_tree() {
        let mut m = Metafile::new();
        m.storage_mut()
            .add_file(FileEntry::new("dir/a", BLOCK_SIZE).unwrap());
        m.storage_mut().add_file(FileEntry::padding(BLOCK_SIZE));
        m.storage_mut()
            .add_file(FileEntry::new("dir/b", BLOCK_SIZE).unwrap());
        m.storage_mut().set_piece_size(BLOCK_SIZE).unwrap();
        for entry in m.storage().iter() {
            if !entry.is_padding_file() {
                entry.set_pieces_root(Sha256Digest::new([7; 32]));
            }
        }

        let info = m.info_dict_v2().unwrap();
        let tree = info.get(b"file tree").unwrap().as_dict().unwrap();
        assert_eq!(tree.len(), 1);
        assert!(tree.get(b".pad").is_none());
    }
}
