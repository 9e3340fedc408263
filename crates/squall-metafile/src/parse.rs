//! Parsing metafiles out of decoded bencode.
//!
//! Decoding accepts what real-world torrents contain (unknown keys are
//! ignored), but the schema checks are strict: wrong kinds, bad lengths and
//! invalid paths abort with the offending field's name. Re-encoding a
//! parsed metafile produces canonical output even when the input was not.

use crate::announce::{AnnounceUrl, AnnounceUrlList};
use crate::attributes::FileAttributes;
use crate::crypto::{Checksum, HashFunction, Sha256Digest};
use crate::error::MetafileError;
use crate::file_entry::FileEntry;
use crate::metafile::Metafile;
use crate::storage::Protocol;
use itertools::Itertools;
use log::{debug, trace};
use squall_bencode::{decode, Dict, Value};
use std::path::PathBuf;

const TARGET: &str = "squall_metafile::parse";

impl Metafile {
    /// Decode and parse a metafile buffer.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MetafileError> {
        let value = decode(bytes)?;
        parse_metafile(&value)
    }
}

/// Parse a decoded bencode tree into a [`Metafile`].
pub fn parse_metafile(value: &Value) -> Result<Metafile, MetafileError> {
    let root = expect_dict(value, "metafile")?;
    let info = expect_dict(
        root.get(b"info").ok_or(MetafileError::MissingField("info"))?,
        "info",
    )?;

    let meta_version = match info.get(b"meta version") {
        None => 1,
        Some(v) => expect_integer(v, "meta version")?,
    };
    trace!(target: TARGET, "parsing metafile, meta version {meta_version}");

    let mut m = Metafile::new();
    parse_announce(root, &mut m)?;
    parse_scalars(root, info, &mut m)?;

    match meta_version {
        1 => {
            parse_file_list_v1(info, &mut m)?;
            parse_piece_size(info, &mut m)?;
            parse_pieces_v1(info, &mut m)?;
        }
        2 => {
            let hybrid = info
                .get(b"pieces")
                .and_then(Value::as_bytes)
                .is_some_and(|p| !p.is_empty());

            if hybrid {
                // the v1 list carries the padding files and the v1 sizes
                parse_file_list_v1(info, &mut m)?;
                parse_piece_size(info, &mut m)?;
                overlay_file_tree_v2(info, &mut m)?;
                parse_piece_layers(root, &mut m)?;
                parse_pieces_v1(info, &mut m)?;
            } else {
                parse_file_tree_v2(info, &mut m)?;
                parse_piece_size(info, &mut m)?;
                parse_piece_layers(root, &mut m)?;
            }
        }
        version => {
            return Err(MetafileError::InvalidValue {
                field: "meta version",
                reason: format!("unsupported version {version}"),
            })
        }
    }

    reject_duplicate_paths(&m)?;
    debug!(
        target: TARGET,
        "parsed metafile: {} files, protocol {:?}",
        m.storage().file_count(),
        m.protocol()
    );
    Ok(m)
}

/// Decode a buffer and tell which protocol it carries, without keeping the
/// metafile.
pub fn probe_protocol(bytes: &[u8]) -> Result<Protocol, MetafileError> {
    Ok(Metafile::from_bytes(bytes)?.protocol())
}

//  Field access helpers

fn expect_dict<'a>(value: &'a Value, field: &'static str) -> Result<&'a Dict, MetafileError> {
    value.as_dict().ok_or(MetafileError::WrongKind {
        field,
        expected: "dict",
        actual: value.kind_name(),
    })
}

fn expect_list<'a>(value: &'a Value, field: &'static str) -> Result<&'a [Value], MetafileError> {
    value.as_list().ok_or(MetafileError::WrongKind {
        field,
        expected: "list",
        actual: value.kind_name(),
    })
}

fn expect_bytes<'a>(value: &'a Value, field: &'static str) -> Result<&'a [u8], MetafileError> {
    value.as_bytes().ok_or(MetafileError::WrongKind {
        field,
        expected: "string",
        actual: value.kind_name(),
    })
}

fn expect_str<'a>(value: &'a Value, field: &'static str) -> Result<&'a str, MetafileError> {
    value.as_str().ok_or(MetafileError::WrongKind {
        field,
        expected: "UTF-8 string",
        actual: value.kind_name(),
    })
}

fn expect_integer(value: &Value, field: &'static str) -> Result<i64, MetafileError> {
    value.as_integer().ok_or(MetafileError::WrongKind {
        field,
        expected: "integer",
        actual: value.kind_name(),
    })
}

fn expect_size(value: &Value, field: &'static str) -> Result<u64, MetafileError> {
    let size = expect_integer(value, field)?;
    u64::try_from(size).map_err(|_| MetafileError::InvalidValue {
        field,
        reason: format!("negative size {size}"),
    })
}

fn parse_path_list(value: &Value, field: &'static str) -> Result<PathBuf, MetafileError> {
    let mut path = PathBuf::new();
    for component in expect_list(value, field)? {
        path.push(expect_str(component, field)?);
    }
    Ok(path)
}

//  Top-level fields

fn parse_announce(root: &Dict, m: &mut Metafile) -> Result<(), MetafileError> {
    if let Some(value) = root.get(b"announce-list") {
        let mut tier = 0;
        for tier_value in expect_list(value, "announce-list")? {
            let mut inserted = false;
            for url_value in expect_list(tier_value, "announce-list")? {
                let url = expect_str(url_value, "announce-list")?;
                // duplicates across tiers are silently dropped
                if m.trackers().contains(url) {
                    continue;
                }
                m.add_tracker(url, Some(tier))?;
                inserted = true;
            }
            if inserted {
                tier += 1;
            }
        }
    }

    if let Some(value) = root.get(b"announce") {
        let url = expect_str(value, "announce")?;
        let trackers = m.trackers_mut();
        if !trackers.contains(url) {
            if trackers.tier_size(0) >= 1 {
                // an announce missing from announce-list gets its own first
                // tier; everything else shifts down
                let mut rebuilt = AnnounceUrlList::new();
                rebuilt.insert(AnnounceUrl::new(url, 0))?;
                for announce in trackers.iter() {
                    rebuilt.insert(AnnounceUrl::new(announce.url.clone(), announce.tier + 1))?;
                }
                *trackers = rebuilt;
            } else {
                trackers.insert(AnnounceUrl::new(url, 0))?;
            }
        }
    }
    Ok(())
}

fn parse_scalars(root: &Dict, info: &Dict, m: &mut Metafile) -> Result<(), MetafileError> {
    if let Some(value) = root.get(b"comment") {
        m.set_comment(expect_str(value, "comment")?);
    }
    if let Some(value) = root.get(b"created by") {
        m.set_created_by(expect_str(value, "created by")?);
    }
    if let Some(value) = root.get(b"creation date") {
        m.set_creation_date(expect_integer(value, "creation date")?);
    }
    if let Some(value) = root.get(b"collections") {
        for collection in expect_list(value, "collections")? {
            m.add_collection(expect_str(collection, "collections")?);
        }
    }
    if let Some(value) = root.get(b"httpseeds") {
        for seed in expect_list(value, "httpseeds")? {
            m.add_http_seed(expect_str(seed, "httpseeds")?);
        }
    }
    if let Some(value) = root.get(b"url-list") {
        for seed in expect_list(value, "url-list")? {
            m.add_web_seed(expect_str(seed, "url-list")?);
        }
    }
    if let Some(value) = root.get(b"similar") {
        for infohash in expect_list(value, "similar")? {
            m.add_similar_torrent(expect_bytes(infohash, "similar")?.to_vec())?;
        }
    }
    if let Some(value) = root.get(b"nodes") {
        for node in expect_list(value, "nodes")? {
            let pair = expect_list(node, "nodes")?;
            if pair.len() != 2 {
                return Err(MetafileError::InvalidValue {
                    field: "nodes",
                    reason: format!("expected [host, port] pair, got {} items", pair.len()),
                });
            }
            let host = expect_str(&pair[0], "nodes")?;
            let port = expect_integer(&pair[1], "nodes")?;
            let port = u16::try_from(port).map_err(|_| MetafileError::InvalidValue {
                field: "nodes",
                reason: format!("port {port} out of range"),
            })?;
            m.add_dht_node(host, port);
        }
    }

    if let Some(value) = info.get(b"name") {
        m.set_name(expect_str(value, "name")?);
    }
    if let Some(value) = info.get(b"source") {
        m.set_source(expect_str(value, "source")?);
    }
    if let Some(value) = info.get(b"private") {
        match expect_integer(value, "private")? {
            0 => m.set_private(false),
            1 => m.set_private(true),
            other => {
                return Err(MetafileError::InvalidValue {
                    field: "private",
                    reason: format!("expected 0 or 1, got {other}"),
                })
            }
        }
    }
    Ok(())
}

//  File lists

/// Attributes, symlink target and checksums common to both layouts.
fn parse_file_extras(
    file_dict: &Dict,
) -> Result<(Option<FileAttributes>, Option<PathBuf>, Vec<Checksum>), MetafileError> {
    let attributes = match file_dict.get(b"attr") {
        Some(value) => Some(expect_str(value, "attr")?.parse::<FileAttributes>()?),
        None => None,
    };

    let symlink_path = match file_dict.get(b"symlink path") {
        Some(value) => Some(parse_path_list(value, "symlink path")?),
        None => None,
    };

    let mut checksums = Vec::new();
    for (key, value) in file_dict.iter() {
        let Ok(name) = std::str::from_utf8(key) else {
            continue;
        };
        let Some(algorithm) = HashFunction::from_name(name) else {
            continue;
        };
        let bytes = expect_bytes(value, algorithm.name())?;
        if bytes.len() != algorithm.digest_size() {
            return Err(MetafileError::InvalidValue {
                field: algorithm.name(),
                reason: format!(
                    "checksum must be {} bytes, got {}",
                    algorithm.digest_size(),
                    bytes.len()
                ),
            });
        }
        checksums.push(Checksum::new(algorithm, bytes.to_vec()));
    }
    Ok((attributes, symlink_path, checksums))
}

fn parse_file_entry_v1(file_dict: &Dict) -> Result<FileEntry, MetafileError> {
    let path = match file_dict.get(b"path") {
        Some(value) => parse_path_list(value, "path")?,
        // single-file layout stores the file name in "name"
        None => {
            let name = file_dict
                .get(b"name")
                .ok_or(MetafileError::MissingField("name"))?;
            PathBuf::from(expect_str(name, "name")?)
        }
    };

    let length = expect_size(
        file_dict
            .get(b"length")
            .ok_or(MetafileError::MissingField("length"))?,
        "length",
    )?;

    let (attributes, symlink_path, checksums) = parse_file_extras(file_dict)?;
    let entry = FileEntry::with_attributes(path, length, attributes, symlink_path)?;
    for checksum in checksums {
        entry.add_checksum(checksum);
    }
    Ok(entry)
}

fn parse_file_list_v1(info: &Dict, m: &mut Metafile) -> Result<(), MetafileError> {
    match info.get(b"files") {
        Some(value) => {
            for file_value in expect_list(value, "files")? {
                let entry = parse_file_entry_v1(expect_dict(file_value, "files")?)?;
                m.storage_mut().add_file(entry);
            }
        }
        // single-file torrent: the info dict itself describes the file
        None => {
            let entry = parse_file_entry_v1(info)?;
            m.storage_mut().add_file(entry);
        }
    }
    Ok(())
}

fn parse_file_entry_v2(file_dict: &Dict, path: PathBuf) -> Result<FileEntry, MetafileError> {
    let length = expect_size(
        file_dict
            .get(b"length")
            .ok_or(MetafileError::MissingField("length"))?,
        "length",
    )?;

    let pieces_root = match file_dict.get(b"pieces root") {
        Some(value) => Some(Sha256Digest::from_slice(expect_bytes(
            value,
            "pieces root",
        )?)?),
        // empty files and symlinks carry no root
        None if length == 0 => None,
        None => return Err(MetafileError::MissingField("pieces root")),
    };

    let (attributes, symlink_path, checksums) = parse_file_extras(file_dict)?;
    let entry = FileEntry::with_attributes(path, length, attributes, symlink_path)?;
    if let Some(root) = pieces_root {
        entry.set_pieces_root(root);
    }
    for checksum in checksums {
        entry.add_checksum(checksum);
    }
    Ok(entry)
}

/// Walk the nested `file tree` without recursion and yield entries in wire
/// order. A dict holding the empty key is a file; anything else descends.
fn walk_file_tree(info: &Dict) -> Result<Vec<FileEntry>, MetafileError> {
    let tree = expect_dict(
        info.get(b"file tree")
            .ok_or(MetafileError::MissingField("file tree"))?,
        "file tree",
    )?;

    let mut entries = Vec::new();
    let mut frames: Vec<(&Dict, usize, PathBuf)> = vec![(tree, 0, PathBuf::new())];

    while let Some(top) = frames.last_mut() {
        let dict: &Dict = top.0;
        let index = top.1;
        if index >= dict.len() {
            frames.pop();
            continue;
        }
        top.1 += 1;
        let prefix = top.2.clone();

        let (key, value) = match dict.entry_at(index) {
            Some(entry) => entry,
            None => continue,
        };
        let name = std::str::from_utf8(key).map_err(|_| MetafileError::InvalidPath {
            path: String::from_utf8_lossy(key).into_owned(),
            reason: "path component is not valid UTF-8",
        })?;
        let child = expect_dict(value, "file tree")?;

        match child.get(b"") {
            Some(leaf) => {
                let info_dict = expect_dict(leaf, "file tree")?;
                entries.push(parse_file_entry_v2(info_dict, prefix.join(name))?);
            }
            None => frames.push((child, 0, prefix.join(name))),
        }
    }
    Ok(entries)
}

fn parse_file_tree_v2(info: &Dict, m: &mut Metafile) -> Result<(), MetafileError> {
    for entry in walk_file_tree(info)? {
        m.storage_mut().add_file(entry);
    }
    Ok(())
}

/// Hybrid: the `files` list is already parsed; attach each tree leaf's v2
/// data to the matching v1 entry.
fn overlay_file_tree_v2(info: &Dict, m: &mut Metafile) -> Result<(), MetafileError> {
    for v2_entry in walk_file_tree(info)? {
        let existing = m
            .storage()
            .iter()
            .find(|f| f.path() == v2_entry.path())
            .ok_or_else(|| MetafileError::InvalidValue {
                field: "file tree",
                reason: format!(
                    "file \"{}\" is missing from the v1 file list",
                    v2_entry.path().display()
                ),
            })?;
        if let Some(root) = v2_entry.pieces_root() {
            existing.set_pieces_root(root);
        }
    }
    Ok(())
}

//  Piece data

fn parse_piece_size(info: &Dict, m: &mut Metafile) -> Result<(), MetafileError> {
    let size = expect_size(
        info.get(b"piece length")
            .ok_or(MetafileError::MissingField("piece length"))?,
        "piece length",
    )?;
    m.storage_mut().set_piece_size(size)
}

fn parse_pieces_v1(info: &Dict, m: &mut Metafile) -> Result<(), MetafileError> {
    let pieces = expect_bytes(
        info.get(b"pieces")
            .ok_or(MetafileError::MissingField("pieces"))?,
        "pieces",
    )?;
    if pieces.len() % 20 != 0 {
        return Err(MetafileError::InvalidValue {
            field: "pieces",
            reason: format!("length {} is not a multiple of 20", pieces.len()),
        });
    }

    let count = (pieces.len() / 20) as u64;
    if count != m.storage().piece_count() {
        return Err(MetafileError::InvalidValue {
            field: "pieces",
            reason: format!(
                "{count} hashes for {} pieces of data",
                m.storage().piece_count()
            ),
        });
    }

    m.storage_mut().allocate_pieces();
    for (index, chunk) in pieces.chunks_exact(20).enumerate() {
        let digest = crate::crypto::Sha1Digest::from_slice(chunk)?;
        m.storage().set_piece_hash(index as u64, digest);
    }
    Ok(())
}

fn parse_piece_layers(root: &Dict, m: &mut Metafile) -> Result<(), MetafileError> {
    let layers = expect_dict(
        root.get(b"piece layers")
            .ok_or(MetafileError::MissingField("piece layers"))?,
        "piece layers",
    )?;

    for (key, value) in layers.iter() {
        if key.len() != 32 {
            return Err(MetafileError::InvalidValue {
                field: "piece layers",
                reason: format!("key must be a 32-byte pieces root, got {} bytes", key.len()),
            });
        }
        let bytes = expect_bytes(value, "piece layers")?;
        if bytes.len() % 32 != 0 {
            return Err(MetafileError::InvalidValue {
                field: "piece layers",
                reason: format!("layer length {} is not a multiple of 32", bytes.len()),
            });
        }
    }

    let piece_size = m.storage().piece_size();
    for entry in m.storage().iter() {
        if entry.is_padding_file() || entry.file_size() <= piece_size {
            continue;
        }
        let Some(pieces_root) = entry.pieces_root() else {
            continue;
        };
        if let Some(value) = layers.get(pieces_root.as_ref()) {
            let bytes = expect_bytes(value, "piece layers")?;
            let layer = bytes
                .chunks_exact(32)
                .map(|chunk| Sha256Digest::from_slice(chunk).map_err(MetafileError::from))
                .collect::<Result<Vec<_>, _>>()?;
            entry.set_piece_layer(layer);
        }
    }
    Ok(())
}

fn reject_duplicate_paths(m: &Metafile) -> Result<(), MetafileError> {
    match m
        .storage()
        .iter()
        .map(FileEntry::path)
        .duplicates()
        .next()
    {
        Some(path) => Err(MetafileError::DuplicatePath(path.display().to_string())),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Sha1Digest;
    use crate::storage::BLOCK_SIZE;

    /// A v1 metafile built by hand, then round-tripped.
    fn sample_v1() -> Metafile {
        let mut m = Metafile::new();
        m.add_tracker("udp://tracker.example:6969", None).unwrap();
        m.add_tracker("http://backup.example/announce", None).unwrap();
        m.set_comment("sample");
        m.set_created_by("squall");
        m.set_creation_date(1_700_000_000);
        m.set_source("unit-test");
        m.add_web_seed("http://mirror.example/data/");
        m.add_dht_node("router.example", 6881);
        m.set_name("data");

        let storage = m.storage_mut();
        storage.add_file(FileEntry::new("data/one.bin", 40 * 1024).unwrap());
        storage.add_file(FileEntry::new("data/two.bin", 11).unwrap());
        storage.set_piece_size(BLOCK_SIZE).unwrap();
        storage.allocate_pieces();
        for index in 0..storage.piece_count() {
            storage.set_piece_hash(index, Sha1Digest::new([index as u8 + 1; 20]));
        }
        m
    }

    #[test]
    fn v1_roundtrip() {
        let original = sample_v1();
        let encoded = original.encode().unwrap();
        let parsed = Metafile::from_bytes(&encoded).unwrap();

        assert_eq!(parsed.trackers().len(), 2);
        assert_eq!(parsed.comment(), "sample");
        assert_eq!(parsed.created_by(), "squall");
        assert_eq!(parsed.creation_date(), 1_700_000_000);
        assert_eq!(parsed.source(), "unit-test");
        assert_eq!(parsed.name(), "data");
        assert_eq!(parsed.storage().file_count(), 2);
        assert_eq!(parsed.storage().piece_size(), BLOCK_SIZE);
        assert_eq!(parsed.protocol(), Protocol::V1);

        // canonical stability: encode(parse(encode(m))) == encode(m)
        assert_eq!(parsed.encode().unwrap(), encoded);
        // property 8: infohash survives the round trip
        assert_eq!(
            parsed.infohash_v1().unwrap(),
            original.infohash_v1().unwrap()
        );
    }

    #[test]
    fn single_file_roundtrip() {
        let mut m = Metafile::new();
        m.storage_mut()
            .add_file(FileEntry::new("hello.txt", 5).unwrap());
        m.storage_mut().set_piece_size(BLOCK_SIZE).unwrap();
        m.storage_mut().allocate_pieces();
        m.storage_mut().set_piece_hash(0, Sha1Digest::new([1; 20]));

        let parsed = Metafile::from_bytes(&m.encode().unwrap()).unwrap();
        assert_eq!(parsed.storage().file_count(), 1);
        assert_eq!(parsed.storage().at(0).path(), std::path::Path::new("hello.txt"));
        assert_eq!(parsed.name(), "hello.txt");
        assert_eq!(
            parsed.storage().file_mode(),
            crate::storage::FileMode::Single
        );
    }

    fn sample_v2() -> Metafile {
        let mut m = Metafile::new();
        m.set_name("tree");
        let storage = m.storage_mut();
        storage.add_file(FileEntry::new("tree/big.bin", 40 * 1024).unwrap());
        storage.add_file(FileEntry::new("tree/small.bin", 5).unwrap());
        storage.set_piece_size(BLOCK_SIZE).unwrap();

        let big = storage.at(0);
        big.set_pieces_root(Sha256Digest::new([5; 32]));
        big.set_piece_layer(vec![
            Sha256Digest::new([6; 32]),
            Sha256Digest::new([7; 32]),
            Sha256Digest::new([8; 32]),
        ]);
        let small = storage.at(1);
        small.set_pieces_root(Sha256Digest::new([9; 32]));
        small.set_piece_layer(Vec::new());
        m
    }

    #[test]
    fn v2_roundtrip() {
        let original = sample_v2();
        let encoded = original.encode().unwrap();
        let parsed = Metafile::from_bytes(&encoded).unwrap();

        assert_eq!(parsed.protocol(), Protocol::V2);
        assert_eq!(parsed.storage().file_count(), 2);
        let big = parsed.storage().at(0);
        assert_eq!(big.pieces_root(), Some(Sha256Digest::new([5; 32])));
        assert_eq!(big.piece_layer().len(), 3);
        let small = parsed.storage().at(1);
        assert_eq!(small.pieces_root(), Some(Sha256Digest::new([9; 32])));
        assert!(small.piece_layer().is_empty());

        assert_eq!(parsed.encode().unwrap(), encoded);
        assert_eq!(
            parsed.infohash_v2().unwrap(),
            original.infohash_v2().unwrap()
        );
    }

    #[test]
    fn announce_semantics() {
        // announce not present in announce-list pushes tiers down
        let input = b"d8:announce12:udp://first/13:announce-listll11:udp://tier0el11:udp://tier1ee4:infod6:lengthi16384e4:name1:a12:piece lengthi16384e6:pieces20:\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01ee";
        let m = Metafile::from_bytes(input).unwrap();

        let order: Vec<_> = m
            .trackers()
            .iter()
            .map(|a| (a.tier, a.url.as_str()))
            .collect();
        assert_eq!(
            order,
            [
                (0, "udp://first/"),
                (1, "udp://tier0"),
                (2, "udp://tier1")
            ]
        );
    }

    #[test]
    fn schema_errors() {
        // not a dict
        assert!(matches!(
            Metafile::from_bytes(b"le"),
            Err(MetafileError::WrongKind { .. })
        ));
        // no info
        assert!(matches!(
            Metafile::from_bytes(b"de"),
            Err(MetafileError::MissingField("info"))
        ));
        // pieces not a multiple of 20
        let bad_pieces =
            b"d4:infod6:lengthi5e4:name1:a12:piece lengthi16384e6:pieces3:abcee";
        assert!(matches!(
            Metafile::from_bytes(bad_pieces),
            Err(MetafileError::InvalidValue { field: "pieces", .. })
        ));
        // absolute path
        let bad_path = b"d4:infod5:filesld6:lengthi1e4:pathl1:a2:..1:beee4:name1:a12:piece lengthi16384e6:pieces20:\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01ee";
        assert!(matches!(
            Metafile::from_bytes(bad_path),
            Err(MetafileError::InvalidPath { .. })
        ));
        // private must be 0 or 1
        let bad_private = b"d4:infod6:lengthi16384e4:name1:a12:piece lengthi16384e6:pieces20:\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x017:privatei2eee";
        assert!(matches!(
            Metafile::from_bytes(bad_private),
            Err(MetafileError::InvalidValue { field: "private", .. })
        ));
    }

    #[test]
    fn duplicate_paths_rejected() {
        let input = b"d4:infod5:filesld6:lengthi1e4:pathl1:aeed6:lengthi2e4:pathl1:aeee4:name1:d12:piece lengthi16384e6:pieces20:\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01ee";
        assert!(matches!(
            Metafile::from_bytes(input),
            Err(MetafileError::DuplicatePath(_))
        ));
    }

    #[test]
    fn pieces_count_must_match_total_size() {
        // two pieces of hashes for one piece of data
        let input = b"d4:infod6:lengthi5e4:name1:a12:piece lengthi16384e6:pieces40:\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x02\x02\x02\x02\x02\x02\x02\x02\x02\x02\x02\x02\x02\x02\x02\x02\x02\x02\x02\x02ee";
        assert!(matches!(
            Metafile::from_bytes(input),
            Err(MetafileError::InvalidValue { field: "pieces", .. })
        ));
    }
}
