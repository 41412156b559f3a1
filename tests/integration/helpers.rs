//! Shared fakes for integration tests

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use site_monitoring::{
    actors::messages::{AggregateWindow, AlertEvent, ProbeOutcome, Severity},
    alerts::Notifier,
    config::{AlertPolicy, PipelineSettings, RetryPolicy, Target},
    probe::Prober,
    storage::{HealthStatus, StorageBackend, StorageError, StorageResult},
};
use tokio::sync::Mutex;

/// Prober answering from a per-target script
///
/// `true` is a 200, `false` a 503. Once a script runs out the target stays
/// up. Every call is counted.
pub struct ScriptedProber {
    scripts: std::sync::Mutex<HashMap<String, Vec<bool>>>,
    latency: Duration,
    calls: AtomicUsize,
}

impl ScriptedProber {
    pub fn new() -> Self {
        Self {
            scripts: std::sync::Mutex::new(HashMap::new()),
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_script(self, url: &str, script: &[bool]) -> Self {
        // reversed so the next answer can be popped
        let reversed = script.iter().rev().copied().collect();
        self.scripts.lock().unwrap().insert(url.to_string(), reversed);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_answer(&self, url: &str) -> bool {
        self.scripts
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(Vec::pop)
            .unwrap_or(true)
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, target: &Target) -> ProbeOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let up = self.next_answer(&target.url);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if up {
            ProbeOutcome::succeeded(&target.url, 200, self.latency)
        } else {
            ProbeOutcome::unexpected_status(&target.url, 503, self.latency)
        }
    }
}

/// Notifier that keeps every delivered event
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<AlertEvent>>,
}

impl RecordingNotifier {
    pub async fn events(&self) -> Vec<AlertEvent> {
        self.events.lock().await.clone()
    }

    pub async fn severities(&self) -> Vec<Severity> {
        self.events.lock().await.iter().map(|e| e.severity).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: &AlertEvent) -> anyhow::Result<()> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

/// Notifier whose transport is always down
#[derive(Default)]
pub struct FailingNotifier {
    pub attempts: AtomicUsize,
}

#[async_trait]
impl Notifier for FailingNotifier {
    async fn notify(&self, _event: &AlertEvent) -> anyhow::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("webhook unreachable")
    }
}

/// Storage backend that rejects every write
#[derive(Default)]
pub struct FailingBackend {
    pub attempts: AtomicUsize,
}

impl FailingBackend {
    fn fail(&self) -> StorageError {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        StorageError::Unavailable("disk full".to_string())
    }
}

#[async_trait]
impl StorageBackend for FailingBackend {
    async fn store_outcome(&self, _outcome: &ProbeOutcome) -> StorageResult<()> {
        Err(self.fail())
    }

    async fn store_window(&self, _window: &AggregateWindow) -> StorageResult<()> {
        Err(self.fail())
    }

    async fn query_windows(&self, _target: &str, _limit: usize) -> StorageResult<Vec<AggregateWindow>> {
        Err(self.fail())
    }

    async fn query_latest_outcomes(&self, _target: &str, _limit: usize) -> StorageResult<Vec<ProbeOutcome>> {
        Err(self.fail())
    }

    async fn cleanup_before(&self, _before: DateTime<Utc>) -> StorageResult<usize> {
        Err(self.fail())
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        Ok(HealthStatus {
            healthy: false,
            message: "disk full".to_string(),
            metadata: HashMap::new(),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}

pub fn target(url: &str, interval_ms: u64, threshold: usize) -> Target {
    Target::new(url, Duration::from_millis(interval_ms)).with_policy(AlertPolicy {
        failure_threshold: threshold,
        ..AlertPolicy::default()
    })
}

pub fn settings() -> PipelineSettings {
    PipelineSettings {
        retry: RetryPolicy {
            max_attempts: 2,
            backoff: Duration::from_millis(10),
        },
        ..PipelineSettings::default()
    }
}

pub fn shared<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
