//! PersistenceWriter - Writes outcomes and windows to the storage backend
//!
//! The log processor hands writes over through a bounded queue and never
//! waits for the backend. Each write is retried a bounded number of times
//! with linear backoff, then logged and dropped. A failing backend therefore
//! costs history, never monitoring.
//!
//! With a retention period configured, the writer also deletes old records
//! once at startup and then every hour.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::config::RetryPolicy;
use crate::error::{PipelineError, PipelineResult};
use crate::storage::{StorageBackend, StorageResult};
use tokio_util::sync::CancellationToken;

use super::messages::{AggregateWindow, ProbeOutcome};

/// Interval between retention cleanups
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Capacity of the write queue
pub const WRITE_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub enum PersistRequest {
    Outcome(ProbeOutcome),
    Window(AggregateWindow),
}

impl PersistRequest {
    fn target(&self) -> &str {
        match self {
            PersistRequest::Outcome(outcome) => &outcome.target,
            PersistRequest::Window(window) => &window.target,
        }
    }
}

/// Counters kept by the writer, logged on shutdown
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriterStats {
    pub written: u64,
    pub failed: u64,
    pub deleted: u64,
}

pub struct PersistenceWriter {
    input: mpsc::Receiver<PersistRequest>,
    storage: Arc<dyn StorageBackend>,
    retry: RetryPolicy,
    retention: Option<Duration>,
    cancel: CancellationToken,
    stats: WriterStats,
}

impl PersistenceWriter {
    pub fn new(
        input: mpsc::Receiver<PersistRequest>,
        storage: Arc<dyn StorageBackend>,
        retry: RetryPolicy,
        retention: Option<Duration>,
        cancel: CancellationToken,
    ) -> Self {
        if let Some(retention) = retention {
            debug!("retention cleanup enabled: {:?}", retention);
        }

        Self {
            input,
            storage,
            retry,
            retention,
            cancel,
            stats: WriterStats::default(),
        }
    }

    #[instrument(skip(self), name = "persistence_writer")]
    pub async fn run(mut self) -> PipelineResult<()> {
        debug!("starting persistence writer");

        let has_retention = self.retention.is_some();
        let mut cleanup_interval = time::interval(CLEANUP_INTERVAL);
        cleanup_interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

        let mut draining = false;

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled(), if !draining => {
                    debug!("shutdown requested, draining write queue");
                    draining = true;
                }

                request = self.input.recv() => {
                    match request {
                        Some(request) => self.write(request).await,
                        None if self.cancel.is_cancelled() => break,
                        None => {
                            return Err(PipelineError::ChannelClosed { component: "persistence writer" });
                        }
                    }
                }

                _ = cleanup_interval.tick(), if has_retention && !draining => {
                    self.run_cleanup().await;
                }
            }
        }

        debug!(
            "persistence writer stopped (written: {}, failed: {}, deleted: {})",
            self.stats.written, self.stats.failed, self.stats.deleted
        );
        Ok(())
    }

    async fn write(&mut self, request: PersistRequest) {
        trace!("persisting record for {}", request.target());

        let storage = &self.storage;
        let stored = match &request {
            PersistRequest::Outcome(outcome) => {
                store_with_retry(self.retry, "outcome", || storage.store_outcome(outcome)).await
            }
            PersistRequest::Window(window) => {
                store_with_retry(self.retry, "window", || storage.store_window(window)).await
            }
        };

        if stored {
            self.stats.written += 1;
        } else {
            self.stats.failed += 1;
        }
    }

    async fn run_cleanup(&mut self) {
        let Some(retention) = self.retention else {
            return;
        };
        let Ok(retention) = chrono::Duration::from_std(retention) else {
            warn!("retention period {:?} out of range, skipping cleanup", retention);
            return;
        };

        let cutoff = Utc::now() - retention;
        match self.storage.cleanup_before(cutoff).await {
            Ok(deleted) => {
                self.stats.deleted += deleted as u64;
                info!("retention cleanup removed {deleted} records older than {cutoff}");
            }
            Err(e) => error!("retention cleanup failed: {e}"),
        }
    }
}

/// Run a storage write with bounded retries
///
/// Returns `false` once every attempt failed. The failure is logged here, the
/// caller only counts it.
pub async fn store_with_retry<F, Fut>(policy: RetryPolicy, what: &str, mut op: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StorageResult<()>>,
{
    let attempts = policy.max_attempts.max(1);

    for attempt in 1..=attempts {
        match op().await {
            Ok(()) => return true,
            Err(e) if attempt < attempts => {
                warn!("failed to store {what} (attempt {attempt}/{attempts}): {e}");
                time::sleep(policy.backoff * attempt).await;
            }
            Err(e) => {
                error!("giving up on {what} after {attempts} attempts: {e}");
            }
        }
    }

    false
}
