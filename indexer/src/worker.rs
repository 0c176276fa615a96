use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::IndexerError;
use crate::event::UserOperationEvent;
use crate::processor::{IndexOutcome, UserOperationProcessor};

const QUEUE_CAPACITY: usize = 1000;

/// Counters returned when the pool shuts down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexerStats {
    pub inserted: u64,
    pub duplicates: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl IndexerStats {
    pub fn processed(&self) -> u64 {
        self.inserted + self.duplicates + self.skipped + self.failed
    }
}

#[derive(Default)]
struct Counters {
    inserted: AtomicU64,
    duplicates: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn record(&self, outcome: &Result<IndexOutcome, IndexerError>) {
        let counter = match outcome {
            Ok(IndexOutcome::Inserted) => &self.inserted,
            Ok(IndexOutcome::Duplicate) => &self.duplicates,
            Ok(IndexOutcome::UnknownSender) => &self.skipped,
            Err(_) => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> IndexerStats {
        IndexerStats {
            inserted: self.inserted.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Fixed set of tokio workers draining one shared event channel.
///
/// A failing event is logged and counted; it never stops a worker.
pub struct IndexerPool {
    sender: mpsc::Sender<UserOperationEvent>,
    workers: Vec<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl IndexerPool {
    pub fn start(processor: Arc<UserOperationProcessor>, chain_id: u64, workers: usize) -> Self {
        let (sender, receiver) = mpsc::channel(QUEUE_CAPACITY);
        let receiver = Arc::new(Mutex::new(receiver));
        let counters = Arc::new(Counters::default());

        let workers = (0..workers.max(1))
            .map(|worker| {
                let receiver = Arc::clone(&receiver);
                let processor = Arc::clone(&processor);
                let counters = Arc::clone(&counters);
                tokio::spawn(async move {
                    loop {
                        // lock only while waiting so other workers process in parallel
                        let next = receiver.lock().await.recv().await;
                        let Some(event) = next else { break };

                        let outcome = processor.process(&event, chain_id).await;
                        if let Err(e) = &outcome {
                            error!(worker, user_op_hash = ?event.user_op_hash, error = %e, "event dropped");
                        }
                        counters.record(&outcome);
                    }
                    debug!(worker, "indexer worker stopped");
                })
            })
            .collect();

        Self {
            sender,
            workers,
            counters,
        }
    }

    /// Queue an event; waits while the queue is full.
    pub async fn submit(&self, event: UserOperationEvent) -> Result<(), IndexerError> {
        self.sender
            .send(event)
            .await
            .map_err(|_| IndexerError::Shutdown)
    }

    /// Counters so far; events still queued are not included.
    pub fn stats(&self) -> IndexerStats {
        self.counters.snapshot()
    }

    /// Close the queue, let the workers drain it, and return the final counters.
    pub async fn shutdown(self) -> IndexerStats {
        drop(self.sender);
        for handle in self.workers {
            if let Err(e) = handle.await {
                error!(error = %e, "indexer worker panicked");
            }
        }

        let stats = self.counters.snapshot();
        info!(
            inserted = stats.inserted,
            duplicates = stats.duplicates,
            skipped = stats.skipped,
            failed = stats.failed,
            "indexer pool stopped"
        );
        stats
    }
}
