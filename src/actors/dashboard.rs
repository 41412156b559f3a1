//! DashboardActor - Latest-state view of every target
//!
//! Consumes aggregate windows from the log processor and alert events from
//! the alert actor. Readers get a consistent copy through
//! [`DashboardHandle::snapshot`]; status and staleness are computed at
//! snapshot time, so a target that stops reporting turns `unknown` without
//! any further update.
//!
//! Completed windows are also kept for a bounded history, so dashboard views
//! can roll up a timeframe longer than one window through
//! [`DashboardHandle::summarize`].

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace};

use crate::config::Target;
use crate::error::{PipelineError, PipelineResult};

use super::messages::{
    AggregateWindow, DashboardCommand, DashboardSnapshot, DashboardUpdate, Severity, TargetStatus,
    TargetView, TimeframeSummary, ViewSnapshot,
};

#[derive(Debug, Clone)]
struct TargetEntry {
    view: TargetView,

    /// Completed windows, oldest first
    history: VecDeque<AggregateWindow>,

    /// No update within this horizon makes the target stale
    stale_after: chrono::Duration,
}

/// Latest-state table, driven by explicit timestamps
#[derive(Debug)]
pub struct DashboardState {
    targets: HashMap<String, TargetEntry>,

    /// How far behind the newest window history is kept
    history_span: chrono::Duration,
}

impl DashboardState {
    /// Pre-register every target so it shows up before its first update
    ///
    /// The staleness horizon is `stale_after_intervals` times the larger of
    /// the check interval and the aggregation window.
    pub fn new(targets: &[Target], window: Duration, stale_after_intervals: u32) -> Self {
        let targets = targets
            .iter()
            .map(|target| {
                let horizon = target.check_interval.max(window) * stale_after_intervals.max(1);
                let entry = TargetEntry {
                    view: TargetView {
                        url: target.url.clone(),
                        status: TargetStatus::Unknown,
                        last_aggregate: None,
                        last_alert: None,
                        last_update: None,
                    },
                    history: VecDeque::new(),
                    stale_after: chrono::Duration::from_std(horizon)
                        .unwrap_or(chrono::Duration::MAX),
                };
                (target.url.clone(), entry)
            })
            .collect();

        Self {
            targets,
            history_span: chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX),
        }
    }

    /// Keep completed windows for `span` (at least one window)
    pub fn with_history(mut self, span: Duration) -> Self {
        let span = chrono::Duration::from_std(span).unwrap_or(chrono::Duration::MAX);
        self.history_span = self.history_span.max(span);
        self
    }

    pub fn apply(&mut self, update: DashboardUpdate, received_at: DateTime<Utc>) {
        let target = match &update {
            DashboardUpdate::Aggregate(window) => &window.target,
            DashboardUpdate::Alert(event) => &event.target,
        };

        let history_span = self.history_span;
        let Some(entry) = self.targets.get_mut(target) else {
            trace!("update for unknown target {target}, ignoring");
            return;
        };

        match update {
            DashboardUpdate::Aggregate(window) => {
                let horizon = window
                    .window_end()
                    .checked_sub_signed(history_span)
                    .unwrap_or(DateTime::<Utc>::MIN_UTC);
                entry.history.push_back(window.clone());
                while entry
                    .history
                    .front()
                    .is_some_and(|oldest| oldest.window_end() <= horizon)
                {
                    entry.history.pop_front();
                }
                entry.view.last_aggregate = Some(window);
            }
            DashboardUpdate::Alert(event) => entry.view.last_alert = Some(event),
        }
        entry.view.last_update = Some(received_at);
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> DashboardSnapshot {
        self.targets
            .iter()
            .map(|(url, entry)| {
                let mut view = entry.view.clone();
                view.status = Self::status(entry, now);
                (url.clone(), view)
            })
            .collect()
    }

    /// Roll up the windows of every target that overlap `[now - timeframe, now]`
    pub fn summarize(&self, timeframe: Duration, now: DateTime<Utc>) -> ViewSnapshot {
        let cutoff = chrono::Duration::from_std(timeframe)
            .ok()
            .and_then(|timeframe| now.checked_sub_signed(timeframe))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        self.targets
            .iter()
            .map(|(url, entry)| {
                let covered: Vec<&AggregateWindow> = entry
                    .history
                    .iter()
                    .filter(|window| window.window_end() > cutoff)
                    .collect();

                let success_count: u64 = covered.iter().map(|w| w.success_count).sum();
                let failure_count: u64 = covered.iter().map(|w| w.failure_count).sum();
                let total = success_count + failure_count;
                let latency_nanos: u128 = covered
                    .iter()
                    .map(|w| w.avg_latency.as_nanos() * u128::from(w.total()))
                    .sum();
                let avg_latency = if total > 0 {
                    Duration::from_nanos(u64::try_from(latency_nanos / u128::from(total)).unwrap_or(u64::MAX))
                } else {
                    Duration::ZERO
                };

                let summary = TimeframeSummary {
                    url: url.clone(),
                    status: Self::status(entry, now),
                    timeframe,
                    windows: covered.len(),
                    success_count,
                    failure_count,
                    avg_latency,
                    last_alert: entry.view.last_alert.clone(),
                };
                (url.clone(), summary)
            })
            .collect()
    }

    fn status(entry: &TargetEntry, now: DateTime<Utc>) -> TargetStatus {
        let view = &entry.view;

        let Some(last_update) = view.last_update else {
            return TargetStatus::Unknown;
        };
        if now - last_update > entry.stale_after {
            return TargetStatus::Unknown;
        }

        let alerting = view
            .last_alert
            .as_ref()
            .is_some_and(|event| event.severity == Severity::Critical);
        if alerting {
            return TargetStatus::Alerting;
        }

        match &view.last_aggregate {
            Some(window) if window.failure_count > 0 => TargetStatus::Degraded,
            Some(_) => TargetStatus::Up,
            // only a warning or resolved event so far
            None => TargetStatus::Unknown,
        }
    }
}

pub struct DashboardActor {
    state: DashboardState,
    updates: mpsc::Receiver<DashboardUpdate>,
    command_rx: mpsc::Receiver<DashboardCommand>,
    cancel: CancellationToken,
}

impl DashboardActor {
    pub fn new(
        state: DashboardState,
        updates: mpsc::Receiver<DashboardUpdate>,
        command_rx: mpsc::Receiver<DashboardCommand>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            state,
            updates,
            command_rx,
            cancel,
        }
    }

    /// Run the actor's main loop
    ///
    /// Ends once both producers have closed the update feed after
    /// cancellation.
    #[instrument(skip(self), name = "dashboard")]
    pub async fn run(mut self) -> PipelineResult<()> {
        debug!("starting dashboard actor");

        let mut draining = false;

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled(), if !draining => {
                    debug!("shutdown requested, draining dashboard feed");
                    draining = true;
                }

                update = self.updates.recv() => {
                    match update {
                        Some(update) => self.state.apply(update, Utc::now()),
                        None if self.cancel.is_cancelled() => break,
                        None => return Err(PipelineError::ChannelClosed { component: "dashboard" }),
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        DashboardCommand::Snapshot { respond_to } => {
                            let _ = respond_to.send(self.state.snapshot(Utc::now()));
                        }
                        DashboardCommand::Summarize { timeframe, respond_to } => {
                            let _ = respond_to.send(self.state.summarize(timeframe, Utc::now()));
                        }
                    }
                }
            }
        }

        debug!("dashboard actor stopped");
        Ok(())
    }
}

/// Handle for reading the dashboard
#[derive(Clone)]
pub struct DashboardHandle {
    sender: mpsc::Sender<DashboardCommand>,
}

impl DashboardHandle {
    pub fn new(sender: mpsc::Sender<DashboardCommand>) -> Self {
        Self { sender }
    }

    /// Consistent copy of all target views, `None` once the actor stopped
    pub async fn snapshot(&self) -> Option<DashboardSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(DashboardCommand::Snapshot { respond_to: tx })
            .await
            .ok()?;

        rx.await.ok()
    }

    /// Every target rolled up over the last `timeframe`, `None` once the
    /// actor stopped
    pub async fn summarize(&self, timeframe: Duration) -> Option<ViewSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(DashboardCommand::Summarize {
                timeframe,
                respond_to: tx,
            })
            .await
            .ok()?;

        rx.await.ok()
    }
}
