//! API response types
//!
//! Timestamps are RFC 3339 strings and latencies are milliseconds, so the
//! JSON stays independent of the internal representation.

use serde::{Deserialize, Serialize};

use crate::actors::messages::{AggregateWindow, AlertEvent, Severity, TargetStatus, TargetView};

/// Response for GET /api/v1/health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// "ok", or "degraded" when storage is unhealthy
    pub status: String,
    pub timestamp: String,
    pub storage: StorageHealth,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageHealth {
    pub healthy: bool,
    pub message: String,
}

/// One aggregate window
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WindowSummary {
    pub window_start: String,
    pub window_secs: u64,
    pub success_count: u64,
    pub failure_count: u64,

    /// Percentage of successful probes, absent for an empty window
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability: Option<f64>,

    pub avg_latency_ms: f64,
    pub partial: bool,
}

impl From<&AggregateWindow> for WindowSummary {
    fn from(window: &AggregateWindow) -> Self {
        Self {
            window_start: window.window_start.to_rfc3339(),
            window_secs: window.window_duration.as_secs(),
            success_count: window.success_count,
            failure_count: window.failure_count,
            availability: window.availability(),
            avg_latency_ms: window.avg_latency.as_secs_f64() * 1000.0,
            partial: window.partial,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertSummary {
    pub severity: Severity,
    pub triggered_at: String,
    pub reason: String,
}

impl From<&AlertEvent> for AlertSummary {
    fn from(event: &AlertEvent) -> Self {
        Self {
            severity: event.severity,
            triggered_at: event.triggered_at.to_rfc3339(),
            reason: event.reason.clone(),
        }
    }
}

/// Latest state of one target
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TargetSummary {
    pub url: String,
    pub status: TargetStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_window: Option<WindowSummary>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_alert: Option<AlertSummary>,
}

impl From<&TargetView> for TargetSummary {
    fn from(view: &TargetView) -> Self {
        Self {
            url: view.url.clone(),
            status: view.status,
            last_update: view.last_update.map(|t| t.to_rfc3339()),
            last_window: view.last_aggregate.as_ref().map(WindowSummary::from),
            last_alert: view.last_alert.as_ref().map(AlertSummary::from),
        }
    }
}

/// Response for GET /api/v1/snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotResponse {
    pub targets: Vec<TargetSummary>,
    pub count: usize,
}

/// Response for GET /api/v1/windows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowsResponse {
    pub url: String,
    pub count: usize,
    pub windows: Vec<WindowSummary>,
}
