//! In-memory storage backend (no persistence)
//!
//! Keeps a bounded history of outcomes and windows per target. Useful for
//! tests and for deployments that only need the live dashboard.
//!
//! ## Limitations
//!
//! - **No persistence**: All data lost on restart
//! - **Limited capacity**: Oldest entries are evicted per target

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::actors::messages::{AggregateWindow, ProbeOutcome};

use super::backend::{HealthStatus, StorageBackend};
use super::error::StorageResult;

/// Maximum outcomes to keep in memory per target
const MAX_OUTCOMES_PER_TARGET: usize = 1000;

/// Maximum windows to keep in memory per target
const MAX_WINDOWS_PER_TARGET: usize = 500;

#[derive(Debug, Default)]
struct TargetHistory {
    outcomes: VecDeque<ProbeOutcome>,
    windows: VecDeque<AggregateWindow>,
}

/// In-memory storage backend
#[derive(Debug, Default)]
pub struct MemoryBackend {
    history: RwLock<HashMap<String, TargetHistory>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn store_outcome(&self, outcome: &ProbeOutcome) -> StorageResult<()> {
        let mut history = self.history.write().await;
        let entry = history.entry(outcome.target.clone()).or_default();

        entry.outcomes.push_back(outcome.clone());
        if entry.outcomes.len() > MAX_OUTCOMES_PER_TARGET {
            entry.outcomes.pop_front();
        }

        Ok(())
    }

    async fn store_window(&self, window: &AggregateWindow) -> StorageResult<()> {
        let mut history = self.history.write().await;
        let entry = history.entry(window.target.clone()).or_default();

        // a partial window may be flushed again later with the same start
        if let Some(existing) = entry
            .windows
            .iter_mut()
            .find(|w| w.window_start == window.window_start)
        {
            *existing = window.clone();
            return Ok(());
        }

        entry.windows.push_back(window.clone());
        if entry.windows.len() > MAX_WINDOWS_PER_TARGET {
            entry.windows.pop_front();
        }

        Ok(())
    }

    async fn query_windows(&self, target: &str, limit: usize) -> StorageResult<Vec<AggregateWindow>> {
        debug!("querying latest {limit} windows for {target}");

        let history = self.history.read().await;
        Ok(history
            .get(target)
            .map(|h| h.windows.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn query_latest_outcomes(&self, target: &str, limit: usize) -> StorageResult<Vec<ProbeOutcome>> {
        debug!("querying latest {limit} outcomes for {target}");

        let history = self.history.read().await;
        Ok(history
            .get(target)
            .map(|h| h.outcomes.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn cleanup_before(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        let mut history = self.history.write().await;
        let mut deleted = 0;

        for entry in history.values_mut() {
            let outcomes = entry.outcomes.len();
            entry.outcomes.retain(|o| o.timestamp >= before);
            let windows = entry.windows.len();
            entry.windows.retain(|w| w.window_start >= before);

            deleted += outcomes - entry.outcomes.len() + windows - entry.windows.len();
        }

        Ok(deleted)
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let history = self.history.read().await;
        let outcomes: usize = history.values().map(|h| h.outcomes.len()).sum();

        Ok(HealthStatus {
            healthy: true,
            message: "In-memory storage operational".to_string(),
            metadata: HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                ("targets".to_string(), history.len().to_string()),
                ("outcomes".to_string(), outcomes.to_string()),
            ]),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory backend (no-op)");
        Ok(())
    }
}
