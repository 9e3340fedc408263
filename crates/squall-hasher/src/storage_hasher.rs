//! The hashing orchestrator: wires the reader to the consumers and manages
//! thread lifecycles.

use crate::checksum_hasher::{V1ChecksumSink, V2ChecksumSink};
use crate::error::PipelineError;
use crate::piece_hasher::{V1PieceSink, V2PieceSink};
use crate::reader::{ChunkReader, ReaderMode};
use crate::worker::{ChunkProcessor, Processor};
use log::{debug, info};
use squall_metafile::{FileStorage, HashFunction, Protocol};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const TARGET: &str = "squall_hasher::storage_hasher";

const MIB: u64 = 1024 * 1024;

/// Tuning knobs for a [`StorageHasher`].
#[derive(Debug, Clone)]
pub struct StorageHasherOptions {
    /// Protocol to produce piece data for. `Protocol::None` is invalid.
    pub protocol: Protocol,
    /// Per-file checksums to compute alongside the pieces.
    pub checksums: BTreeSet<HashFunction>,
    /// Smallest block read from disk in one go. Piece sizes below this are
    /// grouped into one read.
    pub min_chunk_size: u64,
    /// Upper bound on chunk memory held by the pipeline.
    pub max_memory: u64,
    /// Piece hasher worker threads. Each checksum algorithm adds one more.
    pub threads: usize,
}

impl Default for StorageHasherOptions {
    fn default() -> Self {
        Self {
            protocol: Protocol::V1,
            checksums: BTreeSet::new(),
            min_chunk_size: MIB,
            max_memory: 128 * MIB,
            threads: 2,
        }
    }
}

/// Which file is being processed and how far along it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileProgress {
    pub file_index: usize,
    pub file_bytes_done: u64,
}

/// Hashes a [`FileStorage`]'s files into piece data.
///
/// Construction prepares the storage (auto piece size, hybrid padding,
/// piece allocation); [`start`](StorageHasher::start) spawns the reader and
/// worker threads; [`wait`](StorageHasher::wait) blocks until the storage
/// is fully hashed. Progress counters may be polled from another reference
/// while waiting happens elsewhere.
pub struct StorageHasher {
    storage: Arc<FileStorage>,
    protocol: Protocol,
    checksums: BTreeSet<HashFunction>,
    min_chunk_size: u64,
    max_memory: u64,
    threads: usize,

    reader: Option<ChunkReader>,
    piece_hasher: Option<Box<dyn Processor>>,
    checksum_hashers: Vec<Box<dyn Processor>>,

    started: bool,
    stopped: bool,
    cancelled: bool,

    cumulative_file_size: Vec<u64>,
    current_file_index: AtomicUsize,
}

impl StorageHasher {
    /// Prepare `storage` for hashing under `options`.
    ///
    /// Applies piece-size auto-selection when none is set, hybrid padding
    /// alignment, and v1 piece allocation.
    pub fn new(
        mut storage: FileStorage,
        options: StorageHasherOptions,
    ) -> Result<Self, PipelineError> {
        if options.protocol == Protocol::None {
            return Err(PipelineError::Config(
                "hashing requires a concrete protocol version".into(),
            ));
        }
        if storage.is_empty() {
            return Err(PipelineError::Config("storage contains no files".into()));
        }

        if storage.piece_size() == 0 {
            let chosen = storage.auto_piece_size();
            debug!(target: TARGET, "auto-selected piece size {chosen}");
        }

        if options.protocol == Protocol::Hybrid {
            storage.optimize_alignment();
        }
        if matches!(options.protocol, Protocol::V1 | Protocol::Hybrid) {
            storage.allocate_pieces();
        }

        let cumulative_file_size = match options.protocol {
            Protocol::V1 => storage.inclusive_file_size_scan_v1(),
            _ => storage.inclusive_file_size_scan_v2(),
        };

        Ok(Self {
            storage: Arc::new(storage),
            protocol: options.protocol,
            checksums: options.checksums,
            min_chunk_size: options.min_chunk_size,
            max_memory: options.max_memory,
            threads: options.threads.max(1),
            reader: None,
            piece_hasher: None,
            checksum_hashers: Vec::new(),
            started: false,
            stopped: false,
            cancelled: false,
            cumulative_file_size,
            current_file_index: AtomicUsize::new(0),
        })
    }

    pub fn storage(&self) -> &FileStorage {
        &self.storage
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Spawn the reader, piece hashers and checksum hashers.
    ///
    /// Every regular file must exist on disk; creation does not tolerate
    /// missing files the way verification does.
    pub fn start(&mut self) -> Result<(), PipelineError> {
        if self.started || self.done() {
            return Err(PipelineError::InvalidState(
                "cannot start a finished or cancelled hasher",
            ));
        }

        let paths = self.storage.absolute_file_paths()?;
        for (entry, path) in self.storage.iter().zip(&paths) {
            if !entry.is_padding_file() && !path.exists() {
                return Err(PipelineError::MissingFile(path.clone()));
            }
        }

        let piece_size = self.storage.piece_size();
        let chunk_size = self
            .min_chunk_size
            .max(piece_size)
            .div_ceil(piece_size)
            * piece_size;
        let queue_capacity = ((self.max_memory / chunk_size).max(1)) as usize;
        info!(
            target: TARGET,
            "hashing {} files, protocol {:?}, chunk size {chunk_size}, {} workers",
            self.storage.file_count(),
            self.protocol,
            self.threads
        );

        let mode = if self.protocol == Protocol::V1 {
            ReaderMode::V1
        } else {
            ReaderMode::V2
        };
        let mut reader = ChunkReader::new(
            Arc::clone(&self.storage),
            mode,
            chunk_size,
            self.max_memory,
        );

        let mut piece_hasher: Box<dyn Processor> = match self.protocol {
            Protocol::V1 => Box::new(ChunkProcessor::new(
                Arc::new(V1PieceSink::new(Arc::clone(&self.storage))),
                queue_capacity,
                self.threads,
            )),
            _ => Box::new(ChunkProcessor::new(
                Arc::new(V2PieceSink::new(
                    Arc::clone(&self.storage),
                    self.protocol == Protocol::Hybrid,
                )),
                queue_capacity,
                self.threads,
            )),
        };
        reader.register_queue(piece_hasher.queue());

        let mut checksum_hashers: Vec<Box<dyn Processor>> = self
            .checksums
            .iter()
            .map(|&algorithm| -> Box<dyn Processor> {
                // one single-threaded consumer per algorithm so the running
                // hash sees bytes in order
                if self.protocol == Protocol::V1 {
                    Box::new(ChunkProcessor::new(
                        Arc::new(V1ChecksumSink::new(Arc::clone(&self.storage), algorithm)),
                        queue_capacity,
                        1,
                    ))
                } else {
                    Box::new(ChunkProcessor::new(
                        Arc::new(V2ChecksumSink::new(Arc::clone(&self.storage), algorithm)),
                        queue_capacity,
                        1,
                    ))
                }
            })
            .collect();
        for hasher in &checksum_hashers {
            reader.register_queue(hasher.queue());
        }

        piece_hasher.start();
        for hasher in &mut checksum_hashers {
            hasher.start();
        }
        reader.start();

        self.reader = Some(reader);
        self.piece_hasher = Some(piece_hasher);
        self.checksum_hashers = checksum_hashers;
        self.started = true;
        Ok(())
    }

    /// Block until everything is hashed.
    ///
    /// The reader drains first; only then are the consumers told to stop,
    /// so no chunk is ever abandoned in a queue.
    pub fn wait(&mut self) -> Result<(), PipelineError> {
        if !self.started {
            return Err(PipelineError::InvalidState("hasher not running"));
        }
        if self.done() {
            return Err(PipelineError::InvalidState("hasher already done"));
        }

        let read_result = match &mut self.reader {
            Some(reader) => reader.wait(),
            None => Ok(()),
        };
        if let Err(error) = read_result {
            // disk failed: drop pending work and surface the error
            self.cancel_consumers();
            self.stopped = true;
            self.cancelled = true;
            return Err(error);
        }

        if let Some(hasher) = &mut self.piece_hasher {
            hasher.request_stop();
        }
        for hasher in &self.checksum_hashers {
            hasher.request_stop();
        }
        if let Some(hasher) = &mut self.piece_hasher {
            hasher.wait();
        }
        for hasher in &mut self.checksum_hashers {
            hasher.wait();
        }
        self.stopped = true;
        debug!(target: TARGET, "hashing complete: {} bytes hashed", self.bytes_hashed());
        Ok(())
    }

    /// Cooperatively stop all stages and discard partial state.
    pub fn cancel(&mut self) {
        if !self.started {
            self.cancelled = true;
            return;
        }
        if let Some(reader) = &self.reader {
            reader.request_cancellation();
        }
        self.cancel_consumers();
        if let Some(reader) = &mut self.reader {
            let _ = reader.wait();
        }
        self.cancelled = true;
        self.stopped = true;
    }

    fn cancel_consumers(&mut self) {
        if let Some(hasher) = &self.piece_hasher {
            hasher.request_cancellation();
        }
        for hasher in &self.checksum_hashers {
            hasher.request_cancellation();
        }
        if let Some(hasher) = &mut self.piece_hasher {
            hasher.wait();
        }
        for hasher in &mut self.checksum_hashers {
            hasher.wait();
        }
    }

    pub fn started(&self) -> bool {
        self.started
    }

    pub fn cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn running(&self) -> bool {
        self.started && !self.cancelled && !self.stopped
    }

    /// Finished or cancelled; either way, no more work will happen.
    pub fn done(&self) -> bool {
        self.cancelled || (self.started && self.stopped)
    }

    /// Bytes the reader pulled from disk.
    pub fn bytes_read(&self) -> u64 {
        self.reader.as_ref().map_or(0, ChunkReader::bytes_read)
    }

    /// Bytes fed through the piece hash functions.
    pub fn bytes_hashed(&self) -> u64 {
        self.piece_hasher.as_ref().map_or(0, |h| h.bytes_hashed())
    }

    /// Bytes accounted for, padding and stubs included.
    pub fn bytes_done(&self) -> u64 {
        self.piece_hasher.as_ref().map_or(0, |h| h.bytes_done())
    }

    /// Locate `bytes_done` within the cumulative file sizes.
    pub fn current_file_progress(&self) -> FileProgress {
        let bytes = self.bytes_done();
        let start = self
            .current_file_index
            .load(Ordering::Relaxed)
            .min(self.cumulative_file_size.len());
        let found = start
            + self.cumulative_file_size[start..].partition_point(|&c| c < bytes);
        let file_index = found.min(self.cumulative_file_size.len().saturating_sub(1));
        self.current_file_index.store(file_index, Ordering::Relaxed);

        let preceding = match file_index {
            0 => 0,
            i => self.cumulative_file_size[i - 1],
        };
        FileProgress {
            file_index,
            file_bytes_done: bytes.saturating_sub(preceding),
        }
    }

    /// Tear down and hand the hashed storage back.
    pub fn into_storage(self) -> FileStorage {
        let Self {
            storage,
            reader,
            piece_hasher,
            checksum_hashers,
            ..
        } = self;
        drop(reader);
        drop(piece_hasher);
        drop(checksum_hashers);
        Arc::try_unwrap(storage).unwrap_or_else(|shared| (*shared).clone())
    }
}
