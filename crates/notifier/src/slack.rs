//! Slack `chat.postMessage` client.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use herald_common::config::AppConfig;
use herald_common::error::RemoteError;
use herald_common::http::{build_http_client, decode_response};

use crate::ChatNotifier;

/// Posts form-encoded messages to the Slack Web API.
pub struct SlackClient {
    http: reqwest::Client,
    post_url: String,
    token: String,
    username: Option<String>,
    icon_url: Option<String>,
}

impl SlackClient {
    pub fn new(http: reqwest::Client, post_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http,
            post_url: post_url.into(),
            token: token.into(),
            username: None,
            icon_url: None,
        }
    }

    /// Display name and icon shown on posted messages.
    #[must_use]
    pub fn with_identity(mut self, username: Option<String>, icon_url: Option<String>) -> Self {
        self.username = username;
        self.icon_url = icon_url;
        self
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, RemoteError> {
        let http = build_http_client(config.http_timeout(), false)?;
        Ok(
            Self::new(http, config.slack_post_url.clone(), config.slack_api_token.clone())
                .with_identity(config.slack_username.clone(), config.slack_icon_url.clone()),
        )
    }

    fn form<'a>(&'a self, channel: &'a str, text: &'a str) -> Vec<(&'static str, &'a str)> {
        let mut fields = vec![
            ("token", self.token.as_str()),
            ("channel", channel),
            ("text", text),
        ];
        if let Some(username) = &self.username {
            fields.push(("username", username.as_str()));
        }
        if let Some(icon_url) = &self.icon_url {
            fields.push(("icon_url", icon_url.as_str()));
        }
        fields
    }
}

#[async_trait]
impl ChatNotifier for SlackClient {
    async fn send(&self, channel: &str, text: &str) -> Result<(), RemoteError> {
        debug!(channel, chars = text.len(), "Posting message");

        let response = self
            .http
            .post(&self.post_url)
            .form(&self.form(channel, text))
            .send()
            .await
            .map_err(|e| RemoteError::transport("send_message", e))?;

        let envelope: SlackEnvelope = decode_response("send_message", response).await?;

        if !envelope.ok {
            let code = envelope.error.unwrap_or_else(|| "unknown_error".to_string());
            warn!(channel, error = %code, "Slack rejected message");
            return Err(RemoteError::Api {
                operation: "send_message",
                code,
            });
        }

        if let Some(warning) = envelope.warning {
            warn!(channel, warning = %warning, "Slack accepted message with a warning");
        }

        debug!(channel, "Message posted");
        Ok(())
    }
}

// =============================================================================
// Slack API types
// =============================================================================

/// Every Slack Web API response is wrapped in this envelope.
#[derive(Debug, Deserialize)]
struct SlackEnvelope {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    warning: Option<String>,
}
