//! The verification orchestrator: same pipeline as hashing, but the
//! consumer compares against the metafile's piece data.

use crate::error::PipelineError;
use crate::reader::{ChunkReader, ReaderMode};
use crate::verify::{V1VerifySink, V2VerifySink};
use crate::worker::ChunkProcessor;
use log::{debug, info};
use squall_metafile::{FileStorage, Protocol};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const TARGET: &str = "squall_hasher::storage_verifier";

const MIB: u64 = 1024 * 1024;

/// Tuning knobs for a [`StorageVerifier`].
#[derive(Debug, Clone, Default)]
pub struct StorageVerifierOptions {
    /// Which protocol's piece data to verify against. Defaults to the
    /// storage's own protocol; hybrid storages verify through v2.
    pub protocol: Option<Protocol>,
    pub min_chunk_size: Option<u64>,
    pub max_memory: Option<u64>,
    pub threads: Option<usize>,
}

enum VerifyProcessor {
    V1(ChunkProcessor<V1VerifySink>),
    V2(ChunkProcessor<V2VerifySink>),
}

impl VerifyProcessor {
    fn start(&mut self) {
        match self {
            VerifyProcessor::V1(p) => p.start(),
            VerifyProcessor::V2(p) => p.start(),
        }
    }

    fn request_stop(&self) {
        match self {
            VerifyProcessor::V1(p) => p.request_stop(),
            VerifyProcessor::V2(p) => p.request_stop(),
        }
    }

    fn request_cancellation(&self) {
        match self {
            VerifyProcessor::V1(p) => p.request_cancellation(),
            VerifyProcessor::V2(p) => p.request_cancellation(),
        }
    }

    fn wait(&mut self) {
        match self {
            VerifyProcessor::V1(p) => p.wait(),
            VerifyProcessor::V2(p) => p.wait(),
        }
    }

    fn queue(&self) -> crossbeam_channel::Sender<crate::chunk::DataChunk> {
        match self {
            VerifyProcessor::V1(p) => p.queue(),
            VerifyProcessor::V2(p) => p.queue(),
        }
    }

    fn bytes_hashed(&self) -> u64 {
        match self {
            VerifyProcessor::V1(p) => p.progress().bytes_hashed(),
            VerifyProcessor::V2(p) => p.progress().bytes_hashed(),
        }
    }

    fn bytes_done(&self) -> u64 {
        match self {
            VerifyProcessor::V1(p) => p.progress().bytes_done(),
            VerifyProcessor::V2(p) => p.progress().bytes_done(),
        }
    }

    fn piece_map(&self) -> Vec<u8> {
        match self {
            VerifyProcessor::V1(p) => p.sink().piece_map(),
            VerifyProcessor::V2(p) => p.sink().piece_map(),
        }
    }

    fn percentage(&self, file_index: usize) -> f64 {
        match self {
            VerifyProcessor::V1(p) => p.sink().percentage(file_index),
            VerifyProcessor::V2(p) => p.sink().percentage(file_index),
        }
    }
}

/// Checks on-disk data against a parsed metafile's piece hashes.
///
/// Missing files are tolerated: their pieces simply stay invalid in the
/// [`piece_map`](StorageVerifier::piece_map).
pub struct StorageVerifier {
    storage: Arc<FileStorage>,
    protocol: Protocol,
    min_chunk_size: u64,
    max_memory: u64,
    threads: usize,

    reader: Option<ChunkReader>,
    verifier: Option<VerifyProcessor>,

    started: bool,
    stopped: bool,
    cancelled: bool,

    cumulative_file_size: Vec<u64>,
    current_file_index: AtomicUsize,
}

impl StorageVerifier {
    /// Verify `storage` (parsed from a metafile, with its piece data and a
    /// physical root directory) under `options`.
    pub fn new(
        storage: FileStorage,
        options: StorageVerifierOptions,
    ) -> Result<Self, PipelineError> {
        let derived = storage.protocol();
        let protocol = match options.protocol.unwrap_or(derived) {
            Protocol::Hybrid => Protocol::V2,
            p => p,
        };
        if protocol == Protocol::None {
            return Err(PipelineError::Config(
                "storage carries no piece data to verify against".into(),
            ));
        }
        if !storage.has_root_directory() {
            return Err(PipelineError::Config(
                "verification requires a physical root directory".into(),
            ));
        }
        if storage.piece_size() == 0 {
            return Err(PipelineError::Config("piece size is not set".into()));
        }

        let cumulative_file_size = match protocol {
            Protocol::V1 => storage.inclusive_file_size_scan_v1(),
            _ => storage.inclusive_file_size_scan_v2(),
        };

        Ok(Self {
            storage: Arc::new(storage),
            protocol,
            min_chunk_size: options.min_chunk_size.unwrap_or(MIB),
            max_memory: options.max_memory.unwrap_or(128 * MIB),
            threads: options.threads.unwrap_or(2).max(1),
            reader: None,
            verifier: None,
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

    pub fn start(&mut self) -> Result<(), PipelineError> {
        if self.started || self.done() {
            return Err(PipelineError::InvalidState(
                "cannot start a finished or cancelled verifier",
            ));
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
            "verifying {} files against {:?} piece data",
            self.storage.file_count(),
            self.protocol
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

        let mut verifier = match self.protocol {
            Protocol::V1 => VerifyProcessor::V1(ChunkProcessor::new(
                Arc::new(V1VerifySink::new(Arc::clone(&self.storage))),
                queue_capacity,
                self.threads,
            )),
            _ => VerifyProcessor::V2(ChunkProcessor::new(
                Arc::new(V2VerifySink::new(Arc::clone(&self.storage))),
                queue_capacity,
                self.threads,
            )),
        };
        reader.register_queue(verifier.queue());

        verifier.start();
        reader.start();
        self.reader = Some(reader);
        self.verifier = Some(verifier);
        self.started = true;
        Ok(())
    }

    pub fn wait(&mut self) -> Result<(), PipelineError> {
        if !self.started {
            return Err(PipelineError::InvalidState("verifier not running"));
        }
        if self.done() {
            return Err(PipelineError::InvalidState("verifier already done"));
        }

        let read_result = match &mut self.reader {
            Some(reader) => reader.wait(),
            None => Ok(()),
        };
        if let Err(error) = read_result {
            if let Some(verifier) = &mut self.verifier {
                verifier.request_cancellation();
                verifier.wait();
            }
            self.stopped = true;
            self.cancelled = true;
            return Err(error);
        }

        if let Some(verifier) = &mut self.verifier {
            verifier.request_stop();
            verifier.wait();
        }
        self.stopped = true;
        debug!(target: TARGET, "verification complete");
        Ok(())
    }

    pub fn cancel(&mut self) {
        if !self.started {
            self.cancelled = true;
            return;
        }
        if let Some(reader) = &self.reader {
            reader.request_cancellation();
        }
        if let Some(verifier) = &mut self.verifier {
            verifier.request_cancellation();
            verifier.wait();
        }
        if let Some(reader) = &mut self.reader {
            let _ = reader.wait();
        }
        self.cancelled = true;
        self.stopped = true;
    }

    pub fn running(&self) -> bool {
        self.started && !self.cancelled && !self.stopped
    }

    pub fn done(&self) -> bool {
        self.cancelled || (self.started && self.stopped)
    }

    pub fn bytes_read(&self) -> u64 {
        self.reader.as_ref().map_or(0, ChunkReader::bytes_read)
    }

    pub fn bytes_hashed(&self) -> u64 {
        self.verifier.as_ref().map_or(0, VerifyProcessor::bytes_hashed)
    }

    pub fn bytes_done(&self) -> u64 {
        self.verifier.as_ref().map_or(0, VerifyProcessor::bytes_done)
    }

    /// One byte per piece slot: 1 when the piece verified.
    ///
    /// For v1 the slots are the global pieces; for v2 each file contributes
    /// its piece-layer entries, or a single slot for single-piece files.
    pub fn piece_map(&self) -> Vec<u8> {
        self.verifier.as_ref().map_or_else(Vec::new, VerifyProcessor::piece_map)
    }

    /// True once every piece slot verified.
    pub fn all_valid(&self) -> bool {
        let map = self.piece_map();
        !map.is_empty() && map.iter().all(|&v| v == 1)
    }

    /// Valid share of `file_index`'s pieces, 0..=100. Padding files report
    /// 100.
    pub fn percentage(&self, file_index: usize) -> f64 {
        self.verifier
            .as_ref()
            .map_or(0.0, |v| v.percentage(file_index))
    }

    /// Locate `bytes_done` within the cumulative file sizes.
    pub fn current_file_progress(&self) -> crate::storage_hasher::FileProgress {
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
        crate::storage_hasher::FileProgress {
            file_index,
            file_bytes_done: bytes.saturating_sub(preceding),
        }
    }
}
