//! Persistence of a running pipeline into SQLite
//!
//! Outcomes and windows written by the log processor must survive a restart,
//! and every stored outcome must be counted in exactly one stored window.

use std::sync::Arc;
use std::time::Duration;

use site_monitoring::{
    Pipeline,
    config::PipelineSettings,
    storage::{StorageBackend, sqlite::SqliteBackend},
};
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

use crate::helpers::*;

const URL: &str = "http://site.test/health";

#[tokio::test]
async fn test_pipeline_history_survives_restart() {
    let temp_dir = tempdir().unwrap();
    let db_path = temp_dir.path().join("monitor.db");

    let backend = Arc::new(SqliteBackend::new(&db_path).await.unwrap());
    let prober = shared(ScriptedProber::new().with_script(URL, &[true, false, true]));

    let supervisor = Pipeline::new(
        vec![target(URL, 50, 3)],
        PipelineSettings {
            retention: Some(Duration::from_secs(86_400)),
            ..settings()
        },
        prober.clone(),
        backend,
        shared(RecordingNotifier::default()),
    )
    .start(CancellationToken::new())
    .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    supervisor.shutdown().await.unwrap();

    // reopen the same file
    let reopened = SqliteBackend::new(&db_path).await.unwrap();

    let outcomes = reopened.query_latest_outcomes(URL, 1000).await.unwrap();
    assert!(!outcomes.is_empty());
    assert!(outcomes.len() <= prober.calls());
    assert_eq!(outcomes.iter().filter(|o| !o.success).count(), 1);

    let windows = reopened.query_windows(URL, 1000).await.unwrap();
    let windowed: u64 = windows.iter().map(|w| w.total()).sum();
    assert_eq!(windowed, outcomes.len() as u64);
    assert!(windows[0].partial);

    let health = reopened.health_check().await.unwrap();
    assert!(health.healthy);
}

#[tokio::test]
async fn test_unknown_target_has_no_history() {
    let temp_dir = tempdir().unwrap();
    let backend = SqliteBackend::new(temp_dir.path().join("empty.db")).await.unwrap();

    assert!(backend.query_windows("http://nowhere.test", 10).await.unwrap().is_empty());
    assert!(backend.query_latest_outcomes("http://nowhere.test", 10).await.unwrap().is_empty());
}
