//! LogProcessorActor - Aggregates outcomes into time windows
//!
//! ## Windows
//!
//! Windows are fixed, wall-clock aligned buckets counted from the pipeline
//! origin: `[origin + k*window, origin + (k+1)*window)`. One window per target
//! is open at a time. A window is flushed as complete when
//!
//! - an outcome for the same target falls into a later window, or
//! - the flush timer sees that the window's end has passed.
//!
//! A flushed window is final. An outcome stamped inside an already flushed
//! window (it was still queued at the boundary, or the clock stepped back)
//! is counted in the next window instead.
//!
//! On shutdown every open window is flushed with `partial = true`.
//!
//! Flushed windows go to the dashboard feed and, together with every raw
//! outcome, to the persistence writer. Persistence is fire-and-forget: a full
//! write queue drops the record with a warning.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

use crate::error::{PipelineError, PipelineResult};

use super::messages::{AggregateWindow, DashboardUpdate, ProbeOutcome};
use super::writer::PersistRequest;

/// Bucketing of outcomes into per-target windows
///
/// Pure state, driven by explicit timestamps.
#[derive(Debug)]
pub struct WindowAggregator {
    origin: DateTime<Utc>,
    window: Duration,
    open: HashMap<String, AggregateWindow>,

    /// End of the last flushed window per target
    closed_until: HashMap<String, DateTime<Utc>>,
}

impl WindowAggregator {
    pub fn new(origin: DateTime<Utc>, window: Duration) -> Self {
        Self {
            origin,
            window,
            open: HashMap::new(),
            closed_until: HashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn window_millis(&self) -> i64 {
        i64::try_from(self.window.as_millis()).unwrap_or(i64::MAX).max(1)
    }

    /// Start of the window containing `timestamp`
    pub fn window_start_for(&self, timestamp: DateTime<Utc>) -> DateTime<Utc> {
        let window = self.window_millis();
        let elapsed = (timestamp - self.origin).num_milliseconds();
        let index = elapsed.div_euclid(window);

        self.origin + chrono::Duration::milliseconds(index.saturating_mul(window))
    }

    /// Fold an outcome into its target's open window
    ///
    /// Returns the previously open window when the outcome belongs to a later
    /// one. An outcome older than the open window is counted in the open
    /// window; one older than the last flushed window opens the window right
    /// after it.
    pub fn record(&mut self, outcome: &ProbeOutcome) -> Option<AggregateWindow> {
        let mut start = self.window_start_for(outcome.timestamp);
        if let Some(closed_until) = self.closed_until.get(&outcome.target) {
            start = start.max(*closed_until);
        }

        let rolled_over = self
            .open
            .get(&outcome.target)
            .is_some_and(|current| start > current.window_start);
        let flushed = if rolled_over {
            self.open.remove(&outcome.target).map(|window| self.close(window))
        } else {
            None
        };

        let window = self.window;
        self.open
            .entry(outcome.target.clone())
            .or_insert_with(|| AggregateWindow::open(&outcome.target, start, window))
            .record(outcome);

        flushed
    }

    /// Remove and return every window whose end is at or before `now`
    pub fn flush_due(&mut self, now: DateTime<Utc>) -> Vec<AggregateWindow> {
        let due: Vec<String> = self
            .open
            .iter()
            .filter(|(_, window)| window.window_end() <= now)
            .map(|(target, _)| target.clone())
            .collect();

        let mut flushed = Vec::with_capacity(due.len());
        for target in due {
            if let Some(window) = self.open.remove(&target) {
                flushed.push(self.close(window));
            }
        }
        flushed.sort_by(|a, b| a.target.cmp(&b.target));
        flushed
    }

    /// Remove every open window, marked as partial
    pub fn flush_all_partial(&mut self) -> Vec<AggregateWindow> {
        let open: Vec<AggregateWindow> = self.open.drain().map(|(_, window)| window).collect();
        let mut flushed: Vec<AggregateWindow> = open
            .into_iter()
            .map(|mut window| {
                window.partial = true;
                self.close(window)
            })
            .collect();
        flushed.sort_by(|a, b| a.target.cmp(&b.target));
        flushed
    }

    fn close(&mut self, window: AggregateWindow) -> AggregateWindow {
        self.closed_until
            .insert(window.target.clone(), window.window_end());
        window
    }

    pub fn open_windows(&self) -> usize {
        self.open.len()
    }

    /// Time from `now` until the next window boundary
    pub fn until_next_boundary(&self, now: DateTime<Utc>) -> Duration {
        let next = self.window_start_for(now)
            + chrono::Duration::from_std(self.window).unwrap_or(chrono::Duration::zero());
        (next - now).to_std().unwrap_or(self.window)
    }
}

/// Actor that owns the window aggregator
pub struct LogProcessorActor {
    aggregator: WindowAggregator,

    /// Log queue fed by the fan-out stage
    input: mpsc::Receiver<ProbeOutcome>,

    persist_tx: mpsc::Sender<PersistRequest>,
    dashboard_tx: mpsc::Sender<DashboardUpdate>,
    cancel: CancellationToken,

    processed: u64,
    dropped_writes: u64,
}

impl LogProcessorActor {
    pub fn new(
        aggregator: WindowAggregator,
        input: mpsc::Receiver<ProbeOutcome>,
        persist_tx: mpsc::Sender<PersistRequest>,
        dashboard_tx: mpsc::Sender<DashboardUpdate>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            aggregator,
            input,
            persist_tx,
            dashboard_tx,
            cancel,
            processed: 0,
            dropped_writes: 0,
        }
    }

    /// Run the actor's main loop
    ///
    /// After cancellation the queue is drained until the fan-out stage closes
    /// it. A queue closed before cancellation is fatal.
    #[instrument(skip(self), name = "log_processor")]
    pub async fn run(mut self) -> PipelineResult<()> {
        debug!(
            "starting log processor with {:?} windows",
            self.aggregator.window()
        );

        let window = self.aggregator.window();
        let first_boundary = self.aggregator.until_next_boundary(Utc::now());
        let mut flush_timer = time::interval_at(Instant::now() + first_boundary, window);
        flush_timer.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

        let mut draining = false;

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled(), if !draining => {
                    debug!("shutdown requested, draining log queue");
                    draining = true;
                }

                _ = flush_timer.tick() => {
                    // outcomes queued before the boundary go in first
                    for _ in 0..self.input.len() {
                        match self.input.try_recv() {
                            Ok(outcome) => self.handle_outcome(outcome).await,
                            Err(_) => break,
                        }
                    }
                    for window in self.aggregator.flush_due(Utc::now()) {
                        self.publish(window).await;
                    }
                }

                outcome = self.input.recv() => {
                    match outcome {
                        Some(outcome) => self.handle_outcome(outcome).await,
                        None if self.cancel.is_cancelled() => break,
                        None => {
                            return Err(PipelineError::ChannelClosed { component: "log processor" });
                        }
                    }
                }
            }
        }

        let remaining = self.aggregator.flush_all_partial();
        debug!("flushing {} partial windows", remaining.len());
        for window in remaining {
            self.publish_final(window).await;
        }

        debug!(
            "log processor stopped (processed: {}, dropped writes: {})",
            self.processed, self.dropped_writes
        );
        Ok(())
    }

    async fn handle_outcome(&mut self, outcome: ProbeOutcome) {
        trace!("processing outcome for {}", outcome.target);
        self.processed += 1;

        let flushed = self.aggregator.record(&outcome);
        self.enqueue_write(PersistRequest::Outcome(outcome));

        if let Some(window) = flushed {
            self.publish(window).await;
        }
    }

    /// Hand a completed window to the dashboard and the writer
    async fn publish(&mut self, window: AggregateWindow) {
        trace!(
            "window {} for {} complete ({} outcomes)",
            window.window_start,
            window.target,
            window.total()
        );

        self.enqueue_write(PersistRequest::Window(window.clone()));
        self.push_dashboard(window).await;
    }

    /// Like `publish`, but waits for room in the write queue
    async fn publish_final(&mut self, window: AggregateWindow) {
        if self
            .persist_tx
            .send(PersistRequest::Window(window.clone()))
            .await
            .is_err()
        {
            warn!("persistence writer gone, partial window for {} not stored", window.target);
        }
        self.push_dashboard(window).await;
    }

    fn enqueue_write(&mut self, request: PersistRequest) {
        match self.persist_tx.try_send(request) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped_writes += 1;
                warn!(
                    "write queue full, dropping record ({} dropped so far)",
                    self.dropped_writes
                );
            }
            Err(TrySendError::Closed(_)) => {
                self.dropped_writes += 1;
                warn!("persistence writer gone, dropping record");
            }
        }
    }

    async fn push_dashboard(&self, window: AggregateWindow) {
        if self
            .dashboard_tx
            .send(DashboardUpdate::Aggregate(window))
            .await
            .is_err()
        {
            warn!("dashboard feed closed, window dropped");
        }
    }
}
