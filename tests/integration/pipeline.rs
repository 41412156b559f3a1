//! End-to-end behavior of the supervised pipeline with scripted probes

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use site_monitoring::{
    Pipeline, PipelineError,
    actors::messages::{Severity, TargetStatus},
    storage::{MemoryBackend, StorageBackend},
};
use tokio_util::sync::CancellationToken;

use crate::helpers::*;

const URL: &str = "http://site.test/health";

async fn stored_totals(storage: &MemoryBackend, url: &str) -> (usize, u64) {
    let outcomes = storage.query_latest_outcomes(url, 1000).await.unwrap().len();
    let windowed = storage
        .query_windows(url, 1000)
        .await
        .unwrap()
        .iter()
        .map(|w| w.total())
        .sum();
    (outcomes, windowed)
}

#[tokio::test(start_paused = true)]
async fn test_three_failures_raise_critical_then_success_resolves() {
    // probes at 0, 100, 200 fail, the one at 300 succeeds
    let prober = shared(ScriptedProber::new().with_script(URL, &[false, false, false, true]));
    let notifier = shared(RecordingNotifier::default());
    let storage = shared(MemoryBackend::new());

    let supervisor = Pipeline::new(
        vec![target(URL, 100, 3)],
        settings(),
        prober.clone(),
        storage.clone(),
        notifier.clone(),
    )
    .start(CancellationToken::new())
    .unwrap();

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(notifier.severities().await, vec![Severity::Critical]);

    let state = supervisor.alerts().get_state(URL).await.unwrap();
    assert!(state.currently_alerting);
    assert_eq!(state.consecutive_failures, 3);

    let snapshot = supervisor.dashboard().snapshot().await.unwrap();
    assert_eq!(snapshot[URL].status, TargetStatus::Alerting);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(notifier.severities().await, vec![Severity::Critical, Severity::Resolved]);

    let state = supervisor.alerts().get_state(URL).await.unwrap();
    assert!(!state.currently_alerting);
    assert_eq!(state.consecutive_failures, 0);
    assert!(state.last_alert_time.is_some());

    let events = notifier.events().await;
    assert!(events[0].reason.contains("unexpected status code 503"));
    assert!(events[0].triggered_at <= events[1].triggered_at);

    assert_matches!(supervisor.shutdown().await, Ok(()));
}

#[tokio::test(start_paused = true)]
async fn test_every_outcome_is_logged_and_windowed_once() {
    let prober = shared(ScriptedProber::new().with_script(URL, &[true, false, true, false, true]));
    let storage = shared(MemoryBackend::new());

    let supervisor = Pipeline::new(
        vec![target(URL, 100, 3), target("http://other.test", 100, 3)],
        settings(),
        prober.clone(),
        storage.clone(),
        shared(RecordingNotifier::default()),
    )
    .start(CancellationToken::new())
    .unwrap();

    tokio::time::sleep(Duration::from_millis(450)).await;
    assert_matches!(supervisor.shutdown().await, Ok(()));

    let (outcomes, windowed) = stored_totals(&storage, URL).await;
    assert_eq!(outcomes, 5);
    assert_eq!(windowed, 5);

    let (outcomes, windowed) = stored_totals(&storage, "http://other.test").await;
    assert_eq!(outcomes, 5);
    assert_eq!(windowed, 5);

    // the open window was cut short by the shutdown
    let windows = storage.query_windows(URL, 10).await.unwrap();
    assert!(windows[0].partial);
    assert_eq!(windows[0].failure_count, 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_stops_probing() {
    let prober = shared(ScriptedProber::new());

    let supervisor = Pipeline::new(
        vec![target(URL, 100, 3)],
        settings(),
        prober.clone(),
        shared(MemoryBackend::new()),
        shared(RecordingNotifier::default()),
    )
    .start(CancellationToken::new())
    .unwrap();

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_matches!(supervisor.shutdown().await, Ok(()));

    let calls = prober.calls();
    assert_eq!(calls, 3);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(prober.calls(), calls, "no probes after shutdown");
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_probe_is_discarded_on_shutdown() {
    let prober = shared(ScriptedProber::new().with_latency(Duration::from_secs(5)));
    let storage = shared(MemoryBackend::new());

    let supervisor = Pipeline::new(
        vec![target(URL, 100, 3)],
        settings(),
        prober.clone(),
        storage.clone(),
        shared(RecordingNotifier::default()),
    )
    .start(CancellationToken::new())
    .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(prober.calls(), 1);

    let started = tokio::time::Instant::now();
    assert_matches!(supervisor.shutdown().await, Ok(()));
    assert!(started.elapsed() < Duration::from_secs(5));

    assert!(storage.query_latest_outcomes(URL, 10).await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_external_token_cancels_pipeline() {
    let cancel = CancellationToken::new();

    let supervisor = Pipeline::new(
        vec![target(URL, 100, 3)],
        settings(),
        shared(ScriptedProber::new()),
        shared(MemoryBackend::new()),
        shared(RecordingNotifier::default()),
    )
    .start(cancel.clone())
    .unwrap();

    let waiter = tokio::spawn(supervisor.wait());
    tokio::time::sleep(Duration::from_millis(150)).await;
    cancel.cancel();

    assert_matches!(waiter.await.unwrap(), Ok(()));
}

#[tokio::test(start_paused = true)]
async fn test_fatal_component_error_stops_everything() {
    let prober = shared(ScriptedProber::new());
    let cancel = CancellationToken::new();

    let mut supervisor = Pipeline::new(
        vec![target(URL, 100, 3)],
        settings(),
        prober.clone(),
        shared(MemoryBackend::new()),
        shared(RecordingNotifier::default()),
    )
    .start(cancel.clone())
    .unwrap();

    supervisor.spawn_component("exporter", async {
        tokio::time::sleep(Duration::from_millis(150)).await;
        Err::<(), _>(PipelineError::ChannelClosed { component: "exporter" })
    });
    let dashboard = supervisor.dashboard();

    assert_matches!(
        supervisor.wait().await,
        Err(PipelineError::ChannelClosed { component: "exporter" })
    );
    assert!(cancel.is_cancelled());

    // every actor has stopped
    let calls = prober.calls();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(prober.calls(), calls);
    assert!(dashboard.snapshot().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_targets_are_independent() {
    let flaky = "http://flaky.test";
    let prober = shared(
        ScriptedProber::new()
            .with_script(flaky, &[false, false, false, false])
            .with_script(URL, &[true, true, true, true]),
    );
    let notifier = shared(RecordingNotifier::default());

    let supervisor = Pipeline::new(
        vec![target(URL, 100, 3), target(flaky, 100, 2)],
        settings(),
        prober,
        shared(MemoryBackend::new()),
        notifier.clone(),
    )
    .start(CancellationToken::new())
    .unwrap();

    tokio::time::sleep(Duration::from_millis(350)).await;

    let events = notifier.events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].target, flaky);
    assert_eq!(events[0].severity, Severity::Critical);

    let healthy = supervisor.alerts().get_state(URL).await.unwrap();
    assert!(!healthy.currently_alerting);

    assert_matches!(supervisor.shutdown().await, Ok(()));
}

#[tokio::test(start_paused = true)]
async fn test_suppressed_notification_still_reaches_dashboard() {
    let prober = shared(ScriptedProber::new().with_script(URL, &[false, true, false]));
    let notifier = shared(RecordingNotifier::default());

    let mut flapping = target(URL, 100, 1);
    flapping.policy.min_alert_interval = Some(Duration::from_secs(3600));

    let supervisor = Pipeline::new(
        vec![flapping],
        settings(),
        prober,
        shared(MemoryBackend::new()),
        notifier.clone(),
    )
    .start(CancellationToken::new())
    .unwrap();

    tokio::time::sleep(Duration::from_millis(250)).await;

    // critical, resolved, then a re-trigger inside the interval
    assert_eq!(notifier.severities().await, vec![Severity::Critical, Severity::Resolved]);

    let snapshot = supervisor.dashboard().snapshot().await.unwrap();
    let last_alert = snapshot[URL].last_alert.as_ref().unwrap();
    assert_eq!(last_alert.severity, Severity::Critical);
    assert_eq!(snapshot[URL].status, TargetStatus::Alerting);

    assert_matches!(supervisor.shutdown().await, Ok(()));
}

#[tokio::test]
async fn test_pipeline_runs_without_targets_is_rejected() {
    let result = Pipeline::new(
        vec![],
        settings(),
        shared(ScriptedProber::new()),
        Arc::new(MemoryBackend::new()),
        shared(RecordingNotifier::default()),
    )
    .start(CancellationToken::new());

    assert_matches!(result, Err(PipelineError::Config(_)));
}
