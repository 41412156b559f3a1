//! REST API served against a running pipeline

use std::net::SocketAddr;
use std::time::Duration;

use axum::http::StatusCode;
use serde_json::Value;
use site_monitoring::{
    Pipeline, Supervisor,
    api::{ApiState, SnapshotResponse, WindowsResponse, router, serve},
    storage::MemoryBackend,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::helpers::*;

const URL: &str = "http://site.test/health";

async fn spawn_test_api() -> (Supervisor, SocketAddr) {
    let cancel = CancellationToken::new();
    let mut supervisor = Pipeline::new(
        vec![target(URL, 50, 3)],
        settings(),
        shared(ScriptedProber::new().with_script(URL, &[false])),
        shared(MemoryBackend::new()),
        shared(RecordingNotifier::default()),
    )
    .start(cancel.clone())
    .unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(ApiState::new(supervisor.dashboard(), supervisor.storage()), true);

    supervisor.spawn_component("api", async move {
        serve(listener, app, cancel)
            .await
            .map_err(|e| site_monitoring::PipelineError::service("api", e))
    });

    (supervisor, addr)
}

#[tokio::test]
async fn test_health_endpoint() {
    let (supervisor, addr) = spawn_test_api().await;

    let response = reqwest::get(format!("http://{addr}/api/v1/health")).await.unwrap();
    assert_eq!(response.status().as_u16(), StatusCode::OK.as_u16());

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["storage"]["healthy"], true);

    supervisor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_snapshot_lists_every_target() {
    let (supervisor, addr) = spawn_test_api().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let body: SnapshotResponse = reqwest::get(format!("http://{addr}/api/v1/snapshot"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body.count, 1);
    assert_eq!(body.targets[0].url, URL);

    supervisor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_windows_of_known_target() {
    let (supervisor, addr) = spawn_test_api().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("http://{addr}/api/v1/windows"))
        .query(&[("url", URL), ("limit", "5")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), StatusCode::OK.as_u16());

    // the first window is still open, nothing is stored yet
    let body: WindowsResponse = response.json().await.unwrap();
    assert_eq!(body.url, URL);
    assert_eq!(body.count, body.windows.len());

    supervisor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_windows_of_unknown_target_is_not_found() {
    let (supervisor, addr) = spawn_test_api().await;

    let response = reqwest::Client::new()
        .get(format!("http://{addr}/api/v1/windows"))
        .query(&[("url", "http://nowhere.test")])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), StatusCode::NOT_FOUND.as_u16());
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("nowhere.test"));

    supervisor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_windows_rejects_bad_limit() {
    let (supervisor, addr) = spawn_test_api().await;

    let response = reqwest::Client::new()
        .get(format!("http://{addr}/api/v1/windows"))
        .query(&[("url", URL), ("limit", "0")])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), StatusCode::BAD_REQUEST.as_u16());

    supervisor.shutdown().await.unwrap();
}
