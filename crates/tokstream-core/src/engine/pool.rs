//! Bounded pool of conversion workers.
//!
//! Each submitted batch gets a fresh worker task and a [`WorkerSlot`]: the
//! worker's private bounded frame queue. At most `worker_count` workers run
//! at once; submitting while every permit is taken waits for one to free up.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{timeout, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::batch::TokenBatch;
use super::worker::{BatchOutcome, ConversionWorker, SlotMessage, WorkerContext};
use crate::error::{Error, Result};

/// A submitted batch's output queue, consumed by the sequencer.
pub struct WorkerSlot {
    seq: u64,
    frames: mpsc::Receiver<SlotMessage>,
    closed: bool,
}

impl WorkerSlot {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Next frame or sentinel. `None` means the worker went away without a
    /// sentinel.
    pub async fn recv(&mut self) -> Option<SlotMessage> {
        if self.closed {
            return None;
        }
        self.frames.recv().await
    }

    /// Stop accepting frames and discard anything still queued.
    pub fn close(&mut self) {
        self.closed = true;
        self.frames.close();
        while self.frames.try_recv().is_ok() {}
    }
}

/// Decrements the in-flight counter when a worker task ends, however it ends.
struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

pub struct WorkerPool {
    ctx: Arc<WorkerContext>,
    permits: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    queue_capacity: usize,
    closing: CancellationToken,
    tasks: JoinSet<BatchOutcome>,
}

impl WorkerPool {
    pub fn new(
        ctx: Arc<WorkerContext>,
        worker_count: usize,
        queue_capacity: usize,
        closing: CancellationToken,
    ) -> Self {
        Self {
            ctx,
            permits: Arc::new(Semaphore::new(worker_count.max(1))),
            in_flight: Arc::new(AtomicUsize::new(0)),
            queue_capacity: queue_capacity.max(1),
            closing,
            tasks: JoinSet::new(),
        }
    }

    /// Batches whose worker has not finished yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Start a worker for `batch`, waiting for a free slot if necessary.
    ///
    /// # Errors
    ///
    /// [`Error::PoolClosed`] if the session closes while waiting.
    pub async fn submit(&mut self, batch: TokenBatch) -> Result<WorkerSlot> {
        let permit = tokio::select! {
            biased;
            _ = self.closing.cancelled() => return Err(Error::PoolClosed),
            permit = Arc::clone(&self.permits).acquire_owned() => {
                permit.map_err(|_| Error::PoolClosed)?
            }
        };

        // Reap finished tasks so the set does not grow over a long session.
        while let Some(joined) = self.tasks.try_join_next() {
            if let Err(e) = joined {
                error!("Conversion worker panicked: {e}");
            }
        }

        let seq = batch.seq();
        let (tx, rx) = mpsc::channel(self.queue_capacity);

        self.in_flight.fetch_add(1, Ordering::AcqRel);
        let guard = InFlightGuard(Arc::clone(&self.in_flight));
        let worker = ConversionWorker::new(Arc::clone(&self.ctx), self.closing.clone());

        self.tasks.spawn(async move {
            let _permit = permit;
            let _guard = guard;
            worker.run(batch, tx).await
        });

        debug!(batch = seq, in_flight = self.in_flight(), "Submitted batch");
        Ok(WorkerSlot {
            seq,
            frames: rx,
            closed: false,
        })
    }

    /// Wait for every worker to finish, at most `limit`.
    ///
    /// Workers still running after the limit are aborted.
    pub async fn join(&mut self, limit: Duration) {
        if timeout(limit, drain(&mut self.tasks)).await.is_err() {
            self.abort_remaining().await;
        }
    }

    /// Like [`join`](Self::join), against a deadline shared with the rest of
    /// the teardown.
    pub async fn join_until(&mut self, deadline: Instant) {
        if timeout_at(deadline, drain(&mut self.tasks)).await.is_err() {
            self.abort_remaining().await;
        }
    }

    async fn abort_remaining(&mut self) {
        warn!(
            "Workers did not finish in time, aborting {} task(s)",
            self.tasks.len()
        );
        self.tasks.abort_all();
        while self.tasks.join_next().await.is_some() {}
    }
}

async fn drain(tasks: &mut JoinSet<BatchOutcome>) {
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            if e.is_panic() {
                error!("Conversion worker panicked: {e}");
            }
        }
    }
}
