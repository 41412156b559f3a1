use reqwest::Client;
use serde::Serialize;
use tracing::{info, instrument};

use crate::actors::messages::{AlertEvent, Severity};
use crate::config::Discord;

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Default)]
pub struct MessageBuilder {
    content: Option<String>,
    embeds: Vec<Embed>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, content: impl ToString) -> Self {
        self.content = Some(content.to_string());
        self
    }

    pub fn add_embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }

    pub fn build(self) -> Message {
        Message {
            content: self.content,
            embeds: self.embeds,
        }
    }
}

const RED: u32 = 15158332;
const ORANGE: u32 = 15105570;
const GREEN: u32 = 3066993;

#[derive(Debug, Clone)]
pub struct DiscordManager {
    client: Client,
}

impl DiscordManager {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn build_alert_embed(&self, event: &AlertEvent) -> Embed {
        let (title, description, color) = match event.severity {
            Severity::Critical => (
                "🔴 Site Down",
                format!("**{}** is failing its health checks!", event.target),
                RED,
            ),
            Severity::Warning => (
                "⚠️ Site Unstable",
                format!("**{}** failed several health checks in a row", event.target),
                ORANGE,
            ),
            Severity::Resolved => (
                "✅ Site Recovered",
                format!("**{}** is answering again", event.target),
                GREEN,
            ),
        };

        Embed {
            title: Some(title.to_string()),
            description: Some(description),
            color: Some(color),
            fields: vec![
                EmbedField {
                    name: "Reason".to_string(),
                    value: event.reason.clone(),
                    inline: false,
                },
                EmbedField {
                    name: "Severity".to_string(),
                    value: event.severity.to_string(),
                    inline: true,
                },
            ],
            footer: Some(EmbedFooter {
                text: format!("Target: {}", event.target),
            }),
            timestamp: Some(event.triggered_at.to_rfc3339()),
        }
    }

    pub fn build_alert_message(&self, discord: &Discord, event: &AlertEvent) -> Message {
        let mut message_builder = MessageBuilder::new().add_embed(self.build_alert_embed(event));

        if let Some(user_id) = &discord.user_id {
            let emoji = match event.severity {
                Severity::Critical => "🔴",
                Severity::Warning => "⚠️",
                Severity::Resolved => "✅",
            };
            message_builder = message_builder.content(format!("{emoji} `{}` <@{user_id}>", event.target));
        }

        message_builder.build()
    }

    #[instrument(skip(self, discord, message))]
    pub async fn send_message(&self, discord: &Discord, message: &Message) -> anyhow::Result<()> {
        let response = self.client.post(&discord.url).json(message).send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Discord message failed with status {status}: {error_text}");
        }

        info!("Successfully sent Discord message");
        Ok(())
    }
}
