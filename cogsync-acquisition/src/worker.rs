use crate::device::BoardDriver;
use crate::error::DeviceError;
use cogsync_core::{ChannelLayout, SignalBatch};
use crossbeam::channel::{self, Receiver, SendTimeoutError, Sender};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Sleep between reads that returned nothing. Also bounds stop latency.
    pub poll_interval: Duration,
    pub queue_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            queue_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub polls: u64,
    pub batches: u64,
    pub samples: u64,
    pub backpressure_waits: u64,
}

/// Background producer that polls a board and queues channel-split batches.
pub struct AcquisitionWorker<B: BoardDriver> {
    board: Arc<B>,
    layout: ChannelLayout,
    sender: Sender<SignalBatch>,
    stop: Arc<AtomicBool>,
    poll_interval: Duration,
    stats: WorkerStats,
}

impl<B: BoardDriver + 'static> AcquisitionWorker<B> {
    /// Starts polling on a dedicated thread. The board must already be streaming.
    pub fn spawn(board: Arc<B>, config: WorkerConfig) -> Result<WorkerHandle, DeviceError> {
        let (sender, receiver) = channel::bounded(config.queue_capacity.max(1));
        let stop = Arc::new(AtomicBool::new(false));
        let worker = AcquisitionWorker {
            layout: board.channel_layout(),
            board,
            sender,
            stop: Arc::clone(&stop),
            poll_interval: config.poll_interval,
            stats: WorkerStats::default(),
        };
        let thread = thread::Builder::new()
            .name("acquisition".into())
            .spawn(move || worker.run())?;
        info!(
            poll_ms = config.poll_interval.as_millis() as u64,
            capacity = config.queue_capacity,
            "acquisition worker started"
        );
        Ok(WorkerHandle {
            receiver,
            stop,
            thread: Some(thread),
        })
    }
}

impl<B: BoardDriver> AcquisitionWorker<B> {
    fn run(mut self) -> Result<WorkerStats, DeviceError> {
        while !self.stop.load(Ordering::Acquire) {
            if !self.poll_once()? {
                thread::sleep(self.poll_interval);
            }
        }
        // Final drain so samples that arrived after the last poll are kept.
        self.poll_once()?;
        debug!(stats = ?self.stats, "acquisition worker finished");
        Ok(self.stats)
    }

    /// Returns whether the read produced a batch.
    fn poll_once(&mut self) -> Result<bool, DeviceError> {
        self.stats.polls += 1;
        let Some(raw) = self.board.read_available()? else {
            return Ok(false);
        };
        let batch = self.layout.split(&raw)?;
        if batch.is_empty() {
            return Ok(false);
        }
        debug!(
            signal = ?batch.signal().dim(),
            aux = ?batch.aux().dim(),
            timestamps = batch.len(),
            "batch queued"
        );
        self.stats.batches += 1;
        self.stats.samples += batch.len() as u64;
        self.push(batch)?;
        Ok(true)
    }

    fn push(&mut self, mut batch: SignalBatch) -> Result<(), DeviceError> {
        loop {
            match self.sender.send_timeout(batch, self.poll_interval) {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Timeout(returned)) => {
                    self.stats.backpressure_waits += 1;
                    warn!(
                        queued = self.sender.len(),
                        "acquisition queue full, waiting for consumer"
                    );
                    batch = returned;
                }
                Err(SendTimeoutError::Disconnected(_)) => return Err(DeviceError::QueueClosed),
            }
        }
    }
}

/// Controller-side handle: the consumer end of the queue plus the stop flag.
pub struct WorkerHandle {
    receiver: Receiver<SignalBatch>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<Result<WorkerStats, DeviceError>>>,
}

impl WorkerHandle {
    pub fn receiver(&self) -> Receiver<SignalBatch> {
        self.receiver.clone()
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// True once the thread has exited, whether stopped or failed.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(|t| t.is_finished())
    }

    /// Waits for the thread and returns its outcome. Call `request_stop` first unless
    /// the worker already finished on its own.
    pub fn join(&mut self) -> Result<WorkerStats, DeviceError> {
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .unwrap_or_else(|_| Err(DeviceError::Stream("acquisition thread panicked".into()))),
            None => Ok(WorkerStats::default()),
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.request_stop();
    }
}
