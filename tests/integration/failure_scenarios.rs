//! Failure tests for the pipeline
//!
//! Persistence and notification failures must never stop monitoring.

use std::sync::atomic::Ordering;
use std::time::Duration;

use assert_matches::assert_matches;
use site_monitoring::{
    Pipeline,
    actors::messages::{Severity, TargetStatus},
};
use tokio_util::sync::CancellationToken;

use crate::helpers::*;

const URL: &str = "http://site.test/health";

#[tokio::test(start_paused = true)]
async fn test_persistence_failure_does_not_stop_monitoring() {
    let prober = shared(ScriptedProber::new().with_script(URL, &[false, false, true]));
    let notifier = shared(RecordingNotifier::default());
    let storage = shared(FailingBackend::default());

    let supervisor = Pipeline::new(
        vec![target(URL, 100, 2)],
        settings(),
        prober.clone(),
        storage.clone(),
        notifier.clone(),
    )
    .start(CancellationToken::new())
    .unwrap();

    tokio::time::sleep(Duration::from_millis(550)).await;

    // alerting keeps working while every write fails
    assert_eq!(notifier.severities().await, vec![Severity::Critical, Severity::Resolved]);
    assert_eq!(prober.calls(), 6);

    let snapshot = supervisor.dashboard().snapshot().await.unwrap();
    assert_eq!(snapshot[URL].last_alert.as_ref().unwrap().severity, Severity::Resolved);

    assert_matches!(supervisor.shutdown().await, Ok(()));

    // 6 outcomes and 1 partial window, 2 attempts each
    assert_eq!(storage.attempts.load(Ordering::SeqCst), 14);
}

#[tokio::test(start_paused = true)]
async fn test_notifier_failure_does_not_stop_monitoring() {
    let prober = shared(ScriptedProber::new().with_script(URL, &[false, true, false]));
    let notifier = shared(FailingNotifier::default());

    let supervisor = Pipeline::new(
        vec![target(URL, 100, 1)],
        settings(),
        prober.clone(),
        shared(FailingBackend::default()),
        notifier.clone(),
    )
    .start(CancellationToken::new())
    .unwrap();

    tokio::time::sleep(Duration::from_millis(250)).await;

    // critical, resolved, critical: each attempted once
    assert_eq!(notifier.attempts.load(Ordering::SeqCst), 3);

    let state = supervisor.alerts().get_state(URL).await.unwrap();
    assert!(state.currently_alerting);

    let snapshot = supervisor.dashboard().snapshot().await.unwrap();
    assert_eq!(snapshot[URL].status, TargetStatus::Alerting);

    assert_matches!(supervisor.shutdown().await, Ok(()));
}
