//! Storage backend trait definition
//!
//! This module defines the core `StorageBackend` trait that all
//! storage implementations must implement.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::actors::messages::{AggregateWindow, ProbeOutcome};

use super::error::StorageResult;

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: HashMap<String, String>,
}

/// Trait for persistence backends
///
/// Writes are fire-and-forget from the pipeline's perspective: the log
/// processor retries failed writes a bounded number of times and then drops
/// them, so implementations should fail fast instead of blocking.
///
/// Implementations must be `Send + Sync` as they are shared between the log
/// processor and the API.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Persist a single probe outcome
    async fn store_outcome(&self, outcome: &ProbeOutcome) -> StorageResult<()>;

    /// Persist a flushed aggregate window
    ///
    /// Storing the same window twice (same target and start) replaces it.
    async fn store_window(&self, window: &AggregateWindow) -> StorageResult<()>;

    /// Most recent windows of a target, newest first
    async fn query_windows(&self, target: &str, limit: usize) -> StorageResult<Vec<AggregateWindow>>;

    /// Most recent outcomes of a target, newest first
    async fn query_latest_outcomes(&self, target: &str, limit: usize) -> StorageResult<Vec<ProbeOutcome>>;

    /// Delete outcomes and windows older than the given timestamp
    ///
    /// Returns the number of deleted records.
    async fn cleanup_before(&self, before: DateTime<Utc>) -> StorageResult<usize>;

    /// Check backend health
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Close the backend and release resources
    async fn close(&self) -> StorageResult<()>;
}

/// Backend that accepts and discards every write
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBackend;

#[async_trait]
impl StorageBackend for NullBackend {
    async fn store_outcome(&self, _outcome: &ProbeOutcome) -> StorageResult<()> {
        Ok(())
    }

    async fn store_window(&self, _window: &AggregateWindow) -> StorageResult<()> {
        Ok(())
    }

    async fn query_windows(&self, _target: &str, _limit: usize) -> StorageResult<Vec<AggregateWindow>> {
        Ok(vec![])
    }

    async fn query_latest_outcomes(&self, _target: &str, _limit: usize) -> StorageResult<Vec<ProbeOutcome>> {
        Ok(vec![])
    }

    async fn cleanup_before(&self, _before: DateTime<Utc>) -> StorageResult<usize> {
        Ok(0)
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        Ok(HealthStatus {
            healthy: true,
            message: "Persistence disabled".to_string(),
            metadata: HashMap::from([("backend".to_string(), "none".to_string())]),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}
