//! End-to-end pipeline tests over real temporary files.

use squall_hasher::{
    StorageHasher, StorageHasherOptions, StorageVerifier, StorageVerifierOptions,
};
use squall_metafile::{
    make_hasher, FileEntry, FileStorage, HashFunction, Metafile, Protocol, Sha1Digest,
    BLOCK_SIZE,
};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const PIECE: u64 = BLOCK_SIZE; // 16 KiB

fn sha1_of(parts: &[&[u8]]) -> Sha1Digest {
    let mut hasher = make_hasher(HashFunction::Sha1);
    let mut out = [0u8; 20];
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize_to(&mut out);
    Sha1Digest::new(out)
}

/// Deterministic, non-trivial file contents.
fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

fn write_files(dir: &Path, files: &[(&str, &[u8])]) -> FileStorage {
    let mut storage = FileStorage::new();
    storage.set_root_directory(dir).unwrap();
    for (name, contents) in files {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
        storage.add_file(FileEntry::new(*name, contents.len() as u64).unwrap());
    }
    storage
}

fn options(protocol: Protocol) -> StorageHasherOptions {
    StorageHasherOptions {
        protocol,
        // small chunks so even tiny fixtures stream through several
        min_chunk_size: PIECE,
        max_memory: 8 * PIECE,
        threads: 2,
        ..StorageHasherOptions::default()
    }
}

fn hash_storage(mut storage: FileStorage, opts: StorageHasherOptions) -> FileStorage {
    storage.set_piece_size(PIECE).unwrap();
    let mut hasher = StorageHasher::new(storage, opts).unwrap();
    hasher.start().unwrap();
    hasher.wait().unwrap();
    assert!(hasher.done());
    hasher.into_storage()
}

#[test]
fn v1_hashing_produces_expected_pieces() {
    let dir = TempDir::new().unwrap();
    let a = pattern(PIECE as usize + 100, 1); // crosses a piece boundary
    let b = pattern(50, 2);
    let storage = write_files(dir.path(), &[("data/a.bin", &a), ("data/b.bin", &b)]);

    let storage = hash_storage(storage, options(Protocol::V1));

    // pieces hash the concatenated stream
    let stream: Vec<u8> = [a.as_slice(), b.as_slice()].concat();
    assert_eq!(storage.piece_count(), 2);
    assert_eq!(
        storage.piece_hash(0),
        sha1_of(&[&stream[..PIECE as usize]])
    );
    assert_eq!(
        storage.piece_hash(1),
        sha1_of(&[&stream[PIECE as usize..]])
    );
    assert_eq!(storage.protocol(), Protocol::V1);
}

#[test]
fn v1_progress_counters_add_up() {
    let dir = TempDir::new().unwrap();
    let a = pattern(3 * PIECE as usize, 3);
    let mut storage = write_files(dir.path(), &[("data/a.bin", &a)]);
    storage.set_piece_size(PIECE).unwrap();

    let mut hasher = StorageHasher::new(storage, options(Protocol::V1)).unwrap();
    hasher.start().unwrap();
    hasher.wait().unwrap();

    assert_eq!(hasher.bytes_read(), a.len() as u64);
    assert_eq!(hasher.bytes_hashed(), a.len() as u64);
    assert_eq!(hasher.bytes_done(), a.len() as u64);
    let progress = hasher.current_file_progress();
    assert_eq!(progress.file_index, 0);
    assert_eq!(progress.file_bytes_done, a.len() as u64);
}

#[test]
fn v2_single_and_multi_piece_files() {
    let dir = TempDir::new().unwrap();
    let exact = pattern(BLOCK_SIZE as usize, 4); // exactly one block
    let long = pattern(BLOCK_SIZE as usize + 1, 5); // forces a short final block
    let storage = write_files(
        dir.path(),
        &[("t/exact.bin", &exact), ("t/long.bin", &long)],
    );

    let storage = hash_storage(storage, options(Protocol::V2));
    assert_eq!(storage.protocol(), Protocol::V2);

    // single-block file: root is the block hash, no piece layer
    let entry = storage.at(0);
    assert!(entry.has_v2_data());
    assert!(entry.piece_layer().is_empty());

    // 16 KiB + 1: two pieces at a 16 KiB piece size
    let entry = storage.at(1);
    assert!(entry.has_v2_data());
    assert_eq!(entry.piece_layer().len(), 2);
}

#[test]
fn v2_one_byte_file() {
    let dir = TempDir::new().unwrap();
    let tiny = [0x42u8];
    let storage = write_files(dir.path(), &[("t/tiny.bin", &tiny)]);
    let storage = hash_storage(storage, options(Protocol::V2));

    let entry = storage.at(0);
    let mut hasher = make_hasher(HashFunction::Sha256);
    let mut out = [0u8; 32];
    hasher.update(&tiny);
    hasher.finalize_to(&mut out);
    assert_eq!(entry.pieces_root().unwrap().as_ref(), &out);
    assert!(entry.piece_layer().is_empty());
}

#[test]
fn hybrid_padding_and_piece_table() {
    let dir = TempDir::new().unwrap();
    let a = pattern(PIECE as usize + 4096, 6); // 20 KiB: needs 12 KiB padding
    let b = pattern(10 * 1024, 7); // tail file: stays unpadded
    let storage = write_files(dir.path(), &[("h/a.bin", &a), ("h/b.bin", &b)]);

    let storage = hash_storage(storage, options(Protocol::Hybrid));
    assert_eq!(storage.protocol(), Protocol::Hybrid);
    assert!(storage.is_piece_aligned());

    // a, pad, b
    assert_eq!(storage.file_count(), 3);
    assert!(storage.at(1).is_padding_file());
    let padding = storage.at(1).file_size();
    assert_eq!(padding, 2 * PIECE - a.len() as u64);
    assert_eq!(
        storage.total_file_size(),
        storage.total_regular_file_size() + padding
    );

    // v1 pieces: [a0], [a-tail + zeroes], [b] (last file unpadded)
    assert_eq!(storage.piece_count(), 3);
    let zeroes = vec![0u8; padding as usize];
    assert_eq!(storage.piece_hash(0), sha1_of(&[&a[..PIECE as usize]]));
    assert_eq!(
        storage.piece_hash(1),
        sha1_of(&[&a[PIECE as usize..], &zeroes])
    );
    assert_eq!(storage.piece_hash(2), sha1_of(&[&b]));

    // v2 data exists for the regular files only
    assert!(storage.at(0).has_v2_data());
    assert!(!storage.at(1).has_v2_data());
    assert!(storage.at(2).has_v2_data());
    assert_eq!(storage.at(0).piece_layer().len(), 2);
    assert!(storage.at(2).piece_layer().is_empty());
}

#[test]
fn checksums_attach_to_every_regular_file() {
    let dir = TempDir::new().unwrap();
    let a = pattern(PIECE as usize + 10, 8);
    let b = pattern(123, 9);
    let storage = write_files(dir.path(), &[("c/a.bin", &a), ("c/b.bin", &b)]);

    let mut opts = options(Protocol::V1);
    opts.checksums = BTreeSet::from([HashFunction::Md5, HashFunction::Sha256]);
    let storage = hash_storage(storage, opts);

    for (index, contents) in [(0usize, &a), (1usize, &b)] {
        for algorithm in [HashFunction::Md5, HashFunction::Sha256] {
            let checksum = storage.at(index).checksum(algorithm).unwrap();
            let mut hasher = make_hasher(algorithm);
            let mut expected = vec![0u8; algorithm.digest_size()];
            hasher.update(contents);
            hasher.finalize_to(&mut expected);
            assert_eq!(checksum.value(), expected, "{algorithm} for file {index}");
        }
    }
}

#[test]
fn created_metafile_verifies_clean() {
    let dir = TempDir::new().unwrap();
    let a = pattern(2 * PIECE as usize + 17, 10);
    let b = pattern(PIECE as usize / 2, 11);
    let storage = write_files(dir.path(), &[("v/a.bin", &a), ("v/b.bin", &b)]);
    let storage = hash_storage(storage, options(Protocol::V1));

    // round-trip through the wire format, as `verify <metafile>` would
    let mut metafile = Metafile::new();
    metafile.set_name("v");
    metafile.set_storage(storage);
    let encoded = metafile.encode().unwrap();
    let parsed = Metafile::from_bytes(&encoded).unwrap();

    let mut verified = parsed.into_storage();
    verified.set_root_directory(dir.path()).unwrap();
    let mut verifier =
        StorageVerifier::new(verified, StorageVerifierOptions::default()).unwrap();
    verifier.start().unwrap();
    verifier.wait().unwrap();

    assert!(verifier.all_valid());
    assert_eq!(verifier.percentage(0), 100.0);
    assert_eq!(verifier.percentage(1), 100.0);
}

#[test]
fn corruption_fails_exactly_one_piece() {
    let dir = TempDir::new().unwrap();
    let a = pattern(3 * PIECE as usize, 12);
    let storage = write_files(dir.path(), &[("v/a.bin", &a)]);
    let storage = hash_storage(storage, options(Protocol::V1));

    // flip one byte inside the second piece
    let mut corrupted = a;
    corrupted[PIECE as usize + 7] ^= 0x80;
    fs::write(dir.path().join("v/a.bin"), &corrupted).unwrap();

    let mut verifier =
        StorageVerifier::new(storage, StorageVerifierOptions::default()).unwrap();
    verifier.start().unwrap();
    verifier.wait().unwrap();

    assert_eq!(verifier.piece_map(), vec![1, 0, 1]);
    assert!(!verifier.all_valid());
    let expected = 2.0 / 3.0 * 100.0;
    assert!((verifier.percentage(0) - expected).abs() < 1e-9);
}

#[test]
fn missing_middle_file_fails_its_pieces() {
    let dir = TempDir::new().unwrap();
    let a = pattern(PIECE as usize, 13);
    let b = pattern(PIECE as usize, 14);
    let c = pattern(PIECE as usize, 15);
    let storage = write_files(
        dir.path(),
        &[("m/a.bin", &a), ("m/b.bin", &b), ("m/c.bin", &c)],
    );
    let storage = hash_storage(storage, options(Protocol::V1));

    fs::remove_file(dir.path().join("m/b.bin")).unwrap();

    let mut verifier =
        StorageVerifier::new(storage, StorageVerifierOptions::default()).unwrap();
    verifier.start().unwrap();
    verifier.wait().unwrap();

    assert_eq!(verifier.piece_map(), vec![1, 0, 1]);
    assert_eq!(verifier.percentage(0), 100.0);
    assert_eq!(verifier.percentage(1), 0.0);
    assert_eq!(verifier.percentage(2), 100.0);
}

#[test]
fn missing_first_file_emits_stubs() {
    let dir = TempDir::new().unwrap();
    let a = pattern(PIECE as usize, 16);
    let b = pattern(PIECE as usize, 17);
    let storage = write_files(dir.path(), &[("s/a.bin", &a), ("s/b.bin", &b)]);
    let storage = hash_storage(storage, options(Protocol::V1));

    fs::remove_file(dir.path().join("s/a.bin")).unwrap();

    let mut verifier =
        StorageVerifier::new(storage, StorageVerifierOptions::default()).unwrap();
    verifier.start().unwrap();
    verifier.wait().unwrap();

    assert_eq!(verifier.piece_map(), vec![0, 1]);
    // the missing range still counts towards completion accounting
    assert_eq!(verifier.bytes_done(), 2 * PIECE);
}

#[test]
fn v2_verification_detects_missing_file() {
    let dir = TempDir::new().unwrap();
    let a = pattern(2 * PIECE as usize, 18);
    let b = pattern(PIECE as usize / 4, 19);
    let storage = write_files(dir.path(), &[("w/a.bin", &a), ("w/b.bin", &b)]);
    let storage = hash_storage(storage, options(Protocol::V2));

    fs::remove_file(dir.path().join("w/b.bin")).unwrap();

    let mut verifier =
        StorageVerifier::new(storage, StorageVerifierOptions::default()).unwrap();
    verifier.start().unwrap();
    verifier.wait().unwrap();

    // a: two layer slots valid; b: its single slot invalid
    assert_eq!(verifier.piece_map(), vec![1, 1, 0]);
    assert_eq!(verifier.percentage(0), 100.0);
    assert_eq!(verifier.percentage(1), 0.0);
}

#[test]
fn hashing_missing_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let mut storage = FileStorage::new();
    storage.set_root_directory(dir.path()).unwrap();
    storage.add_file(FileEntry::new("ghost.bin", 100).unwrap());
    storage.set_piece_size(PIECE).unwrap();

    let mut hasher = StorageHasher::new(storage, options(Protocol::V1)).unwrap();
    assert!(matches!(
        hasher.start(),
        Err(squall_hasher::PipelineError::MissingFile(_))
    ));
}

#[test]
fn cancellation_is_not_an_error() {
    let dir = TempDir::new().unwrap();
    let a = pattern(8 * PIECE as usize, 20);
    let mut storage = write_files(dir.path(), &[("x/a.bin", &a)]);
    storage.set_piece_size(PIECE).unwrap();

    let mut hasher = StorageHasher::new(storage, options(Protocol::V1)).unwrap();
    hasher.start().unwrap();
    hasher.cancel();

    assert!(hasher.done());
    assert!(hasher.cancelled());
    assert!(!hasher.running());
}

#[test]
fn hybrid_roundtrips_through_the_wire_format() {
    let dir = TempDir::new().unwrap();
    let a = pattern(PIECE as usize + 1000, 21);
    let b = pattern(2000, 22);
    let storage = write_files(dir.path(), &[("hy/a.bin", &a), ("hy/b.bin", &b)]);
    let storage = hash_storage(storage, options(Protocol::Hybrid));

    let mut metafile = Metafile::new();
    metafile.set_name("hy");
    metafile.set_storage(storage);

    let v1 = metafile.infohash_v1().unwrap();
    let v2 = metafile.infohash_v2().unwrap();

    let parsed = Metafile::from_bytes(&metafile.encode().unwrap()).unwrap();
    assert_eq!(parsed.protocol(), Protocol::Hybrid);
    assert_eq!(parsed.infohash_v1().unwrap(), v1);
    assert_eq!(parsed.infohash_v2().unwrap(), v2);
}
