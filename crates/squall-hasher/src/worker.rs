//! The shared worker-pool machinery behind every chunk consumer.

use crate::chunk::DataChunk;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::trace;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

const TARGET: &str = "squall_hasher::worker";

/// Monotonic byte counters every consumer reports.
#[derive(Debug, Default)]
pub struct Progress {
    bytes_hashed: AtomicU64,
    bytes_done: AtomicU64,
}

impl Progress {
    /// Bytes actually fed through a hash function.
    pub fn bytes_hashed(&self) -> u64 {
        self.bytes_hashed.load(Ordering::Relaxed)
    }

    /// Bytes accounted for, including stubs and padding that were never
    /// hashed.
    pub fn bytes_done(&self) -> u64 {
        self.bytes_done.load(Ordering::Relaxed)
    }

    pub(crate) fn add_hashed(&self, bytes: u64) {
        self.bytes_hashed.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn add_done(&self, bytes: u64) {
        self.bytes_done.fetch_add(bytes, Ordering::Relaxed);
    }
}

/// What a concrete consumer (piece hasher, verifier, checksum hasher)
/// plugs into the worker pool.
pub(crate) trait ChunkSink: Send + Sync + 'static {
    /// Per-worker mutable state, usually the worker's own hashers.
    type Worker: Send;

    fn make_worker(&self) -> Self::Worker;

    /// Handle one chunk. Called concurrently from every worker.
    fn process(&self, worker: &mut Self::Worker, chunk: &DataChunk);

    fn progress(&self) -> &Progress;
}

#[derive(Default)]
struct Flags {
    started: AtomicBool,
    stop_requested: AtomicBool,
    cancelled: AtomicBool,
}

/// A bounded queue drained by `thread_count` workers feeding one sink.
pub(crate) struct ChunkProcessor<S: ChunkSink> {
    sink: Arc<S>,
    tx: Sender<DataChunk>,
    rx: Receiver<DataChunk>,
    flags: Arc<Flags>,
    thread_count: usize,
    threads: Vec<JoinHandle<()>>,
}

impl<S: ChunkSink> ChunkProcessor<S> {
    pub fn new(sink: Arc<S>, capacity: usize, thread_count: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self {
            sink,
            tx,
            rx,
            flags: Arc::new(Flags::default()),
            thread_count: thread_count.max(1),
            threads: Vec::new(),
        }
    }

    pub fn sink(&self) -> &Arc<S> {
        &self.sink
    }

    /// The producer side of the input queue, for reader registration.
    pub fn queue(&self) -> Sender<DataChunk> {
        self.tx.clone()
    }

    pub fn progress(&self) -> &Progress {
        self.sink.progress()
    }

    /// Spawn the worker threads.
    pub fn start(&mut self) {
        debug_assert!(self.threads.is_empty());
        for index in 0..self.thread_count {
            let sink = Arc::clone(&self.sink);
            let rx = self.rx.clone();
            let flags = Arc::clone(&self.flags);
            self.threads.push(
                std::thread::Builder::new()
                    .name(format!("squall-hash-{index}"))
                    .spawn(move || worker_loop(sink, rx, flags))
                    .unwrap_or_else(|e| panic!("failed to spawn hash worker: {e}")),
            );
        }
        self.flags.started.store(true, Ordering::Release);
    }

    /// Ask workers to exit once the pending queue is drained. Nothing may
    /// be pushed after this call.
    pub fn request_stop(&self) {
        self.flags.stop_requested.store(true, Ordering::Relaxed);
    }

    /// Ask workers to exit and discard pending work.
    pub fn request_cancellation(&self) {
        self.flags.cancelled.store(true, Ordering::Relaxed);
        self.flags.stop_requested.store(true, Ordering::Relaxed);
    }

    /// Wake any blocked workers with sentinels and join them all.
    pub fn wait(&mut self) {
        if self.threads.is_empty() {
            return;
        }
        trace!(target: TARGET, "waking {} workers for shutdown", self.thread_count);

        // 2N+1 sentinels guarantee no worker stays blocked on pop
        let mut remaining = 2 * self.thread_count + 1;
        while remaining > 0 {
            match self.tx.try_send(DataChunk::sentinel()) {
                Ok(()) => remaining -= 1,
                Err(TrySendError::Full(_)) => {
                    // queue full: workers are still draining, unless they
                    // are all gone and no more wake-ups are needed
                    if self.threads.iter().all(JoinHandle::is_finished) {
                        break;
                    }
                    std::thread::yield_now();
                }
                Err(TrySendError::Disconnected(_)) => break,
            }
        }

        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }

    pub fn started(&self) -> bool {
        self.flags.started.load(Ordering::Acquire)
    }

    pub fn cancelled(&self) -> bool {
        self.flags.cancelled.load(Ordering::Relaxed)
    }
}

fn worker_loop<S: ChunkSink>(sink: Arc<S>, rx: Receiver<DataChunk>, flags: Arc<Flags>) {
    let mut worker = sink.make_worker();

    while !flags.stop_requested.load(Ordering::Relaxed) {
        match rx.recv() {
            Ok(chunk) => {
                if chunk.is_sentinel() {
                    break;
                }
                sink.process(&mut worker, &chunk);
            }
            Err(_) => return,
        }
    }

    if flags.cancelled.load(Ordering::Relaxed) {
        // discard pending work, releasing buffers back to the pool
        while rx.try_recv().is_ok() {}
    } else {
        // finish whatever is still queued
        while let Ok(chunk) = rx.try_recv() {
            if chunk.is_sentinel() {
                break;
            }
            sink.process(&mut worker, &chunk);
        }
    }
}

/// Object-safe face of [`ChunkProcessor`] for the orchestrators.
pub(crate) trait Processor: Send {
    fn start(&mut self);
    fn request_stop(&self);
    fn request_cancellation(&self);
    fn wait(&mut self);
    fn queue(&self) -> Sender<DataChunk>;
    fn bytes_hashed(&self) -> u64;
    fn bytes_done(&self) -> u64;
}

impl<S: ChunkSink> Processor for ChunkProcessor<S> {
    fn start(&mut self) {
        ChunkProcessor::start(self);
    }

    fn request_stop(&self) {
        ChunkProcessor::request_stop(self);
    }

    fn request_cancellation(&self) {
        ChunkProcessor::request_cancellation(self);
    }

    fn wait(&mut self) {
        ChunkProcessor::wait(self);
    }

    fn queue(&self) -> Sender<DataChunk> {
        ChunkProcessor::queue(self)
    }

    fn bytes_hashed(&self) -> u64 {
        self.progress().bytes_hashed()
    }

    fn bytes_done(&self) -> u64 {
        self.progress().bytes_done()
    }
}
