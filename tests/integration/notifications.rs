//! Delivery of alert events to webhook and Discord endpoints

use chrono::Utc;
use serde_json::Value;
use site_monitoring::{
    actors::messages::{AlertEvent, Severity},
    alerts::{AlertManager, Notifier},
    config::{Alert, Discord, Webhook},
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn critical_event() -> AlertEvent {
    AlertEvent {
        target: "https://example.com".to_string(),
        severity: Severity::Critical,
        triggered_at: Utc::now(),
        reason: "3 consecutive failed probes: unexpected status code 503".to_string(),
    }
}

async fn server_answering(status: u16) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(status))
        .mount(&server)
        .await;
    server
}

async fn posted_body(server: &MockServer) -> Value {
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    serde_json::from_slice(&requests[0].body).unwrap()
}

#[tokio::test]
async fn test_webhook_receives_json_payload() {
    let server = server_answering(200).await;
    let manager = AlertManager::new(Alert::Webhook(Webhook {
        url: format!("{}/hook", server.uri()),
    }))
    .unwrap();

    manager.notify(&critical_event()).await.unwrap();

    let body = posted_body(&server).await;
    assert_eq!(body["severity"], "critical");
    assert_eq!(body["target"], "https://example.com");
    assert!(body["reason"].as_str().unwrap().contains("503"));
    assert!(body["message"].as_str().unwrap().contains("https://example.com"));
}

#[tokio::test]
async fn test_discord_receives_embed() {
    let server = server_answering(204).await;
    let manager = AlertManager::new(Alert::Discord(Discord {
        url: format!("{}/hook", server.uri()),
        user_id: Some("1234".to_string()),
    }))
    .unwrap();

    manager.notify(&critical_event()).await.unwrap();

    let body = posted_body(&server).await;
    assert!(body["content"].as_str().unwrap().contains("<@1234>"));
    assert_eq!(body["embeds"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_rejected_delivery_is_error() {
    let server = server_answering(500).await;
    let manager = AlertManager::new(Alert::Webhook(Webhook {
        url: format!("{}/hook", server.uri()),
    }))
    .unwrap();

    let result = manager.notify(&critical_event()).await;

    assert!(result.is_err());
}
