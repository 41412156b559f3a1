//! Message types for actor communication
//!
//! This module defines every value that travels between actors.
//!
//! ## Design Principles
//!
//! 1. **Events**: Immutable records (`ProbeOutcome`, `AggregateWindow`, `AlertEvent`)
//!    produced by exactly one actor and consumed downstream
//! 2. **Commands**: Request/response messages sent to a specific actor via mpsc
//! 3. **Immutability**: Events are cloned, never mutated after creation

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// Result of a single probe against a target
///
/// Exactly one outcome is produced per probe attempt. Timeouts and transport
/// errors are failed outcomes, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    /// URL of the probed target
    pub target: String,

    /// When the probe was started
    ///
    /// The constructors stamp the current time; `HttpProber` overwrites it
    /// with the time the request was issued.
    pub timestamp: DateTime<Utc>,

    /// Whether the target answered with a 2xx status
    pub success: bool,

    /// HTTP status code, if a response was received
    pub status_code: Option<u16>,

    /// Time until the response (or the failure) was observed
    pub latency: Duration,

    /// Transport-level failure description
    pub error_detail: Option<String>,
}

impl ProbeOutcome {
    pub fn succeeded(target: impl Into<String>, status_code: u16, latency: Duration) -> Self {
        Self {
            target: target.into(),
            timestamp: Utc::now(),
            success: true,
            status_code: Some(status_code),
            latency,
            error_detail: None,
        }
    }

    pub fn unexpected_status(target: impl Into<String>, status_code: u16, latency: Duration) -> Self {
        Self {
            target: target.into(),
            timestamp: Utc::now(),
            success: false,
            status_code: Some(status_code),
            latency,
            error_detail: None,
        }
    }

    pub fn transport_failure(
        target: impl Into<String>,
        latency: Duration,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            target: target.into(),
            timestamp: Utc::now(),
            success: false,
            status_code: None,
            latency,
            error_detail: Some(detail.into()),
        }
    }

    /// Human readable reason used in alert messages
    pub fn failure_reason(&self) -> String {
        match (&self.error_detail, self.status_code) {
            (Some(detail), _) => detail.clone(),
            (None, Some(code)) => format!("unexpected status code {code}"),
            (None, None) => "probe failed".to_string(),
        }
    }
}

/// Time-bucketed summary of outcomes for one target
///
/// Owned by the log processor while open. Once flushed it is handed out as a
/// read-only snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateWindow {
    pub target: String,
    pub window_start: DateTime<Utc>,
    pub window_duration: Duration,
    pub success_count: u64,
    pub failure_count: u64,
    pub avg_latency: Duration,

    /// Set when the window was flushed before its end (shutdown)
    pub partial: bool,
}

impl AggregateWindow {
    pub fn open(target: impl Into<String>, window_start: DateTime<Utc>, window_duration: Duration) -> Self {
        Self {
            target: target.into(),
            window_start,
            window_duration,
            success_count: 0,
            failure_count: 0,
            avg_latency: Duration::ZERO,
            partial: false,
        }
    }

    pub fn total(&self) -> u64 {
        self.success_count + self.failure_count
    }

    pub fn window_end(&self) -> DateTime<Utc> {
        self.window_start
            + chrono::Duration::from_std(self.window_duration).unwrap_or(chrono::Duration::zero())
    }

    /// Availability in percent, `None` for an empty window
    pub fn availability(&self) -> Option<f64> {
        let total = self.total();
        (total > 0).then(|| self.success_count as f64 * 100.0 / total as f64)
    }

    /// Fold one outcome into the counters and the running latency average
    pub(crate) fn record(&mut self, outcome: &ProbeOutcome) {
        if outcome.success {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }

        let n = self.total() as u128;
        let avg = self.avg_latency.as_nanos();
        let next = (avg * (n - 1) + outcome.latency.as_nanos()) / n;
        self.avg_latency = Duration::from_nanos(next.min(u64::MAX as u128) as u64);
    }
}

/// Severity of an alert event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
    Resolved,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Severity::Warning => "warning",
            Severity::Critical => "critical",
            Severity::Resolved => "resolved",
        };
        f.write_str(text)
    }
}

/// Notification of an alert state transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub target: String,
    pub severity: Severity,
    pub triggered_at: DateTime<Utc>,
    pub reason: String,
}

/// Per-target alert memory, as exposed to queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertState {
    pub target: String,
    pub consecutive_failures: usize,
    pub currently_alerting: bool,
    pub last_alert_time: Option<DateTime<Utc>>,
}

/// Update pushed into the dashboard feed
#[derive(Debug, Clone)]
pub enum DashboardUpdate {
    Aggregate(AggregateWindow),
    Alert(AlertEvent),
}

/// Commands that can be sent to the AlertActor
#[derive(Debug)]
pub enum AlertCommand {
    /// Get the current alert state for a target
    GetState {
        target: String,
        respond_to: oneshot::Sender<Option<AlertState>>,
    },
}

/// Health of a target as seen by the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetStatus {
    /// Last window had no failures
    Up,

    /// Last window had failures, no alert is active
    Degraded,

    /// A critical alert is active
    Alerting,

    /// No data within the staleness horizon
    Unknown,
}

/// Latest state of a single target in the dashboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetView {
    pub url: String,
    pub status: TargetStatus,
    pub last_aggregate: Option<AggregateWindow>,
    pub last_alert: Option<AlertEvent>,
    pub last_update: Option<DateTime<Utc>>,
}

pub type DashboardSnapshot = BTreeMap<String, TargetView>;

/// Completed windows of one target rolled up over a timeframe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeframeSummary {
    pub url: String,
    pub status: TargetStatus,
    pub timeframe: Duration,

    /// Number of windows overlapping the timeframe
    pub windows: usize,
    pub success_count: u64,
    pub failure_count: u64,

    /// Average over every outcome in the covered windows
    pub avg_latency: Duration,
    pub last_alert: Option<AlertEvent>,
}

impl TimeframeSummary {
    pub fn total(&self) -> u64 {
        self.success_count + self.failure_count
    }

    /// Availability in percent, `None` without any outcome
    pub fn availability(&self) -> Option<f64> {
        let total = self.total();
        (total > 0).then(|| self.success_count as f64 * 100.0 / total as f64)
    }
}

pub type ViewSnapshot = BTreeMap<String, TimeframeSummary>;

/// Commands that can be sent to the DashboardActor
#[derive(Debug)]
pub enum DashboardCommand {
    Snapshot {
        respond_to: oneshot::Sender<DashboardSnapshot>,
    },
    Summarize {
        timeframe: Duration,
        respond_to: oneshot::Sender<ViewSnapshot>,
    },
}
