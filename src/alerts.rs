//! Alert delivery
//!
//! The alert actor hands every event that passes the rate limit to a
//! [`Notifier`]. Delivery failures are returned to the actor, which logs them
//! and moves on.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{error, info, instrument, warn};

use crate::actors::messages::{AlertEvent, Severity};
use crate::config::{Alert, Webhook};
use crate::discord::DiscordManager;

/// Timeout for a single notification request
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &AlertEvent) -> anyhow::Result<()>;
}

/// Writes events to the log only
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &AlertEvent) -> anyhow::Result<()> {
        match event.severity {
            Severity::Critical => error!("ALERT {}: {}", event.target, event.reason),
            Severity::Warning => warn!("WARNING {}: {}", event.target, event.reason),
            Severity::Resolved => info!("RESOLVED {}: {}", event.target, event.reason),
        }
        Ok(())
    }
}

/// Sends events to the configured Discord or webhook endpoint
#[derive(Debug, Clone)]
pub struct AlertManager {
    client: Client,
    transport: Alert,
    discord_manager: DiscordManager,
}

impl AlertManager {
    pub fn new(transport: Alert) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(NOTIFY_TIMEOUT).build()?;

        Ok(Self {
            discord_manager: DiscordManager::new(client.clone()),
            client,
            transport,
        })
    }

    fn format_message(event: &AlertEvent) -> String {
        match event.severity {
            Severity::Critical => format!(
                "🔴 **Site Down**: `{}` is failing ({})",
                event.target, event.reason
            ),
            Severity::Warning => format!(
                "⚠️ **Site Unstable**: `{}` ({})",
                event.target, event.reason
            ),
            Severity::Resolved => format!("✅ **Site Recovered**: `{}` is back UP", event.target),
        }
    }

    #[instrument(skip(self, webhook, event))]
    async fn send_webhook_alert(&self, webhook: &Webhook, event: &AlertEvent) -> anyhow::Result<()> {
        let payload = json!({
            "message": Self::format_message(event),
            "target": event.target,
            "severity": event.severity,
            "reason": event.reason,
            "timestamp": event.triggered_at.to_rfc3339(),
        });

        let response = self.client.post(&webhook.url).json(&payload).send().await?;

        if !response.status().is_success() {
            anyhow::bail!("Webhook alert failed with status: {}", response.status());
        }

        info!("Successfully sent webhook alert");
        Ok(())
    }
}

#[async_trait]
impl Notifier for AlertManager {
    async fn notify(&self, event: &AlertEvent) -> anyhow::Result<()> {
        match &self.transport {
            Alert::Discord(discord) => {
                let message = self.discord_manager.build_alert_message(discord, event);
                self.discord_manager.send_message(discord, &message).await
            }
            Alert::Webhook(webhook) => self.send_webhook_alert(webhook, event).await,
        }
    }
}

/// Build the notifier for the configured transport
///
/// Without a transport, events are only logged.
pub fn build_notifier(transport: Option<&Alert>) -> anyhow::Result<Arc<dyn Notifier>> {
    match transport {
        Some(transport) => Ok(Arc::new(AlertManager::new(transport.clone())?)),
        None => Ok(Arc::new(LogNotifier)),
    }
}
