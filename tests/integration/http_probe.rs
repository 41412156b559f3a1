//! Probing real HTTP endpoints served by wiremock

use std::time::Duration;

use chrono::Utc;

use site_monitoring::{
    Pipeline,
    config::{HttpMethod, Target},
    probe::{HttpProber, Prober},
    storage::MemoryBackend,
};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

async fn server_answering(status: u16) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(path("/health"))
        .respond_with(ResponseTemplate::new(status))
        .mount(&server)
        .await;
    server
}

fn health_target(server: &MockServer) -> Target {
    Target::new(format!("{}/health", server.uri()), Duration::from_secs(1))
}

#[tokio::test]
async fn test_ok_response_is_success() {
    let server = server_answering(200).await;
    let target = health_target(&server);

    let outcome = HttpProber::new().unwrap().probe(&target).await;

    assert!(outcome.success);
    assert_eq!(outcome.status_code, Some(200));
    assert_eq!(outcome.error_detail, None);
    assert_eq!(outcome.target, target.url);
}

#[tokio::test]
async fn test_server_error_is_failure_with_status() {
    let server = server_answering(500).await;

    let outcome = HttpProber::new().unwrap().probe(&health_target(&server)).await;

    assert!(!outcome.success);
    assert_eq!(outcome.status_code, Some(500));
    assert!(outcome.failure_reason().contains("500"));
}

#[tokio::test]
async fn test_slow_response_times_out() {
    let server = MockServer::start().await;
    Mock::given(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;
    let target = health_target(&server).with_timeout(Duration::from_millis(200));

    let outcome = HttpProber::new().unwrap().probe(&target).await;

    assert!(!outcome.success);
    assert_eq!(outcome.status_code, None);
    assert!(outcome.error_detail.unwrap().contains("timed out"));
    assert!(outcome.latency < Duration::from_secs(2));
}

#[tokio::test]
async fn test_outcome_is_stamped_when_request_starts() {
    let server = MockServer::start().await;
    Mock::given(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;
    let target = health_target(&server);

    let before = Utc::now();
    let outcome = HttpProber::new().unwrap().probe(&target).await;
    let after = Utc::now();

    assert!(outcome.success);
    assert!(outcome.timestamp >= before);
    assert!(outcome.timestamp < before + chrono::Duration::milliseconds(250));
    assert!(after - outcome.timestamp >= chrono::Duration::milliseconds(500));
}

#[tokio::test]
async fn test_head_method_is_used_when_configured() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let mut target = health_target(&server);
    target.method = HttpMethod::Head;

    let outcome = HttpProber::new().unwrap().probe(&target).await;

    assert!(outcome.success);
    assert_eq!(outcome.status_code, Some(204));
    server.verify().await;
}

#[tokio::test]
async fn test_failing_site_raises_alert_end_to_end() {
    let server = server_answering(503).await;
    let url = format!("{}/health", server.uri());
    let notifier = shared(RecordingNotifier::default());

    let supervisor = Pipeline::new(
        vec![target(&url, 50, 2)],
        settings(),
        shared(HttpProber::new().unwrap()),
        shared(MemoryBackend::new()),
        notifier.clone(),
    )
    .start(CancellationToken::new())
    .unwrap();

    let mut alerting = false;
    for _ in 0..40 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        if let Some(state) = supervisor.alerts().get_state(&url).await {
            if state.currently_alerting {
                alerting = true;
                break;
            }
        }
    }
    assert!(alerting, "target never reached critical");

    let events = notifier.events().await;
    assert_eq!(events[0].target, url);
    assert!(events[0].reason.contains("503"));

    supervisor.shutdown().await.unwrap();
}
