//! The single-threaded disk reader feeding the consumer queues.

use crate::chunk::DataChunk;
use crate::error::PipelineError;
use crate::pool::BufferPool;
use crossbeam_channel::Sender;
use log::{debug, warn};
use squall_metafile::FileStorage;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

const TARGET: &str = "squall_hasher::reader";

/// v1 chunks are addressed by global piece index and may cross file
/// boundaries; v2 chunks are addressed per file and never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderMode {
    V1,
    V2,
}

#[derive(Default)]
struct ReaderShared {
    bytes_read: AtomicU64,
    started: AtomicBool,
    cancelled: AtomicBool,
    error: Mutex<Option<std::io::Error>>,
}

impl ReaderShared {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Owns the reader thread and the buffer pool.
///
/// The reader walks the storage's files in order, fills pooled buffers and
/// pushes each chunk to every registered queue. Missing files become stubs
/// so verification can proceed; readers never fail the pipeline for them.
/// Real I/O errors stop the reader and surface from [`ChunkReader::wait`].
pub struct ChunkReader {
    shared: Arc<ReaderShared>,
    inner: Option<ReaderInner>,
    handle: Option<JoinHandle<()>>,
}

struct ReaderInner {
    storage: Arc<FileStorage>,
    mode: ReaderMode,
    chunk_size: usize,
    pool: BufferPool,
    queues: Vec<Sender<DataChunk>>,
    shared: Arc<ReaderShared>,
}

impl ChunkReader {
    pub fn new(
        storage: Arc<FileStorage>,
        mode: ReaderMode,
        chunk_size: u64,
        max_memory: u64,
    ) -> Self {
        debug_assert!(chunk_size % storage.piece_size() == 0);
        let capacity = (max_memory / chunk_size).max(1) as usize;
        let shared = Arc::new(ReaderShared::default());
        Self {
            inner: Some(ReaderInner {
                storage,
                mode,
                chunk_size: chunk_size as usize,
                pool: BufferPool::new(capacity, chunk_size as usize),
                queues: Vec::new(),
                shared: Arc::clone(&shared),
            }),
            shared,
            handle: None,
        }
    }

    /// Register a consumer queue. All queues receive every chunk.
    pub fn register_queue(&mut self, queue: Sender<DataChunk>) {
        if let Some(inner) = &mut self.inner {
            inner.queues.push(queue);
        }
    }

    pub fn start(&mut self) {
        let Some(inner) = self.inner.take() else {
            return;
        };
        let shared = Arc::clone(&self.shared);
        self.handle = Some(
            std::thread::Builder::new()
                .name("squall-reader".into())
                .spawn(move || {
                    let result = match inner.mode {
                        ReaderMode::V1 => inner.run_v1(),
                        ReaderMode::V2 => inner.run_v2(),
                    };
                    if let Err(error) = result {
                        warn!(target: TARGET, "reader failed: {error}");
                        *shared.error.lock().unwrap_or_else(PoisonError::into_inner) =
                            Some(error);
                    }
                })
                .unwrap_or_else(|e| panic!("failed to spawn reader thread: {e}")),
        );
        self.shared.started.store(true, Ordering::Release);
    }

    pub fn request_cancellation(&self) {
        self.shared.cancelled.store(true, Ordering::Relaxed);
    }

    /// Join the reader and surface any I/O error it hit.
    pub fn wait(&mut self) -> Result<(), PipelineError> {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        match self
            .shared
            .error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            Some(error) => Err(PipelineError::Io(error)),
            None => Ok(()),
        }
    }

    pub fn started(&self) -> bool {
        self.shared.started.load(Ordering::Acquire)
    }

    pub fn bytes_read(&self) -> u64 {
        self.shared.bytes_read.load(Ordering::Relaxed)
    }
}

impl ReaderInner {
    /// Sequential read of the whole storage into cross-file chunks.
    ///
    /// Padding and missing files are zero-filled into the current chunk up
    /// to the next piece boundary; whole missing pieces become stubs so the
    /// hashers can advance without data.
    fn run_v1(self) -> std::io::Result<()> {
        let storage = Arc::clone(&self.storage);
        let piece_size = storage.piece_size() as usize;
        let pieces_per_chunk = (self.chunk_size / piece_size) as u64;
        let paths = file_paths(&storage);

        let mut buf = self.pool.acquire(self.chunk_size);
        let mut chunk_offset = 0usize;
        let mut chunk_first_file = 0usize;
        let mut piece_index = 0u64;

        for (file_index, path) in paths.iter().enumerate() {
            if self.shared.is_cancelled() {
                return Ok(());
            }
            let entry = storage.at(file_index);
            if entry.is_padding_file() || !path.exists() {
                self.fill_missing_v1(
                    file_index,
                    &mut buf,
                    &mut chunk_offset,
                    &mut chunk_first_file,
                    &mut piece_index,
                    pieces_per_chunk,
                );
                continue;
            }

            stamp_last_modified(&storage, file_index, path);
            let mut file = File::open(path)?;

            loop {
                if self.shared.is_cancelled() {
                    return Ok(());
                }
                if chunk_offset == 0 {
                    chunk_first_file = file_index;
                }
                let want = self.chunk_size - chunk_offset;
                let got = read_full(&mut file, &mut buf[chunk_offset..])?;
                chunk_offset += got;
                self.shared.bytes_read.fetch_add(got as u64, Ordering::Relaxed);

                if chunk_offset == self.chunk_size {
                    buf = self.swap_and_push(buf, piece_index, chunk_first_file);
                    chunk_offset = 0;
                    piece_index += pieces_per_chunk;
                }
                if got < want {
                    break; // end of file; the next file continues this chunk
                }
            }
        }

        // flush the final partial chunk
        if chunk_offset != 0 && !self.shared.is_cancelled() {
            buf.truncate(chunk_offset);
            let pieces_in_chunk = chunk_offset.div_ceil(piece_size) as u64;
            let data = self.pool.share(buf);
            self.push(DataChunk::new(
                piece_index as u32,
                chunk_first_file as u32,
                Some(data),
            ));
            piece_index += pieces_in_chunk;
            debug_assert_eq!(piece_index, storage.piece_count());
        }
        debug!(target: TARGET, "v1 reader done, {} bytes", self.shared.bytes_read.load(Ordering::Relaxed));
        Ok(())
    }

    /// Account for a padding or missing file without touching the disk.
    #[allow(clippy::too_many_arguments)]
    fn fill_missing_v1(
        &self,
        file_index: usize,
        buf: &mut Vec<u8>,
        chunk_offset: &mut usize,
        chunk_first_file: &mut usize,
        piece_index: &mut u64,
        pieces_per_chunk: u64,
    ) {
        let piece_size = self.storage.piece_size() as usize;
        let mut missing = self.storage.at(file_index).file_size() as usize;

        // 1. zero-fill the open chunk so shared pieces hash deterministically
        if *chunk_offset != 0 {
            let fill = (self.chunk_size - *chunk_offset).min(missing);
            buf[*chunk_offset..*chunk_offset + fill].fill(0);
            *chunk_offset += fill;
            missing -= fill;

            if *chunk_offset == self.chunk_size {
                let full = std::mem::replace(buf, self.pool.acquire(self.chunk_size));
                let data = self.pool.share(full);
                self.push(DataChunk::new(
                    *piece_index as u32,
                    *chunk_first_file as u32,
                    Some(data),
                ));
                *piece_index += pieces_per_chunk;
                *chunk_offset = 0;
            }
        }

        // 2. whole missing pieces become data-less stubs, one per piece
        let stub_pieces = (missing / piece_size) as u64;
        for _ in 0..stub_pieces {
            self.push(DataChunk::stub(*piece_index as u32, file_index as u32));
            *piece_index += 1;
        }
        missing -= stub_pieces as usize * piece_size;

        // 3. leftover missing bytes start the next chunk as zeroes
        if missing > 0 {
            if *chunk_offset == 0 {
                *chunk_first_file = file_index;
            }
            buf[*chunk_offset..*chunk_offset + missing].fill(0);
            *chunk_offset += missing;
        }
    }

    /// Per-file chunking: the piece index restarts at zero for every file.
    fn run_v2(self) -> std::io::Result<()> {
        let storage = Arc::clone(&self.storage);
        let piece_size = storage.piece_size();
        let pieces_per_chunk = self.chunk_size as u64 / piece_size;
        let paths = file_paths(&storage);

        for (file_index, path) in paths.iter().enumerate() {
            if self.shared.is_cancelled() {
                return Ok(());
            }
            let entry = storage.at(file_index);
            if entry.is_padding_file() {
                // padding is implicit in v2; count it as read
                self.shared
                    .bytes_read
                    .fetch_add(entry.file_size(), Ordering::Relaxed);
                continue;
            }
            if !path.exists() {
                self.push(DataChunk::stub(0, file_index as u32));
                self.shared
                    .bytes_read
                    .fetch_add(entry.file_size(), Ordering::Relaxed);
                continue;
            }

            stamp_last_modified(&storage, file_index, path);
            let mut file = File::open(path)?;
            let mut piece_index = 0u64;

            loop {
                if self.shared.is_cancelled() {
                    return Ok(());
                }
                let mut buf = self.pool.acquire(self.chunk_size);
                let got = read_full(&mut file, &mut buf)?;
                if got == 0 {
                    // EOF on a chunk boundary, or an empty file
                    drop(self.pool.share(buf));
                    break;
                }
                buf.truncate(got);
                self.shared.bytes_read.fetch_add(got as u64, Ordering::Relaxed);
                let data = self.pool.share(buf);
                self.push(DataChunk::new(
                    piece_index as u32,
                    file_index as u32,
                    Some(data),
                ));
                piece_index += pieces_per_chunk;

                if got < self.chunk_size {
                    break;
                }
            }
        }
        debug!(target: TARGET, "v2 reader done, {} bytes", self.shared.bytes_read.load(Ordering::Relaxed));
        Ok(())
    }

    fn swap_and_push(&self, full: Vec<u8>, piece_index: u64, first_file: usize) -> Vec<u8> {
        let fresh = self.pool.acquire(self.chunk_size);
        let data = self.pool.share(full);
        self.push(DataChunk::new(
            piece_index as u32,
            first_file as u32,
            Some(data),
        ));
        fresh
    }

    fn push(&self, chunk: DataChunk) {
        for queue in &self.queues {
            // a consumer that went away just stops receiving
            let _ = queue.send(chunk.clone());
        }
    }
}

fn file_paths(storage: &FileStorage) -> Vec<PathBuf> {
    storage
        .iter()
        .map(|f| storage.root_directory().join(f.path()))
        .collect()
}

fn stamp_last_modified(storage: &FileStorage, file_index: usize, path: &std::path::Path) {
    if let Ok(metadata) = std::fs::metadata(path) {
        if let Ok(modified) = metadata.modified() {
            storage.at(file_index).set_last_modified(modified);
        }
    }
}

/// Read until `buf` is full or EOF; returns the number of bytes read.
fn read_full(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
