//! Telegram Bot API transport.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;

use scanwatch_common::config::NotifierConfig;

use super::render::ChartArtifact;
use super::{Destination, NotifyError};

/// Delivers an artifact with a caption to a destination.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn send_artifact(
        &self,
        destination: &Destination,
        artifact: &ChartArtifact,
        caption: &str,
    ) -> Result<(), NotifyError>;
}

/// Bot API envelope; only the status fields matter here.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Sends chart images through the Bot API.
///
/// Transport errors never carry the request URL, which embeds the bot token.
pub struct TelegramTransport {
    api_base: String,
    client: reqwest::Client,
}

impl TelegramTransport {
    pub fn new(config: &NotifierConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn api_url(&self, token: &str, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, token)
    }
}

#[async_trait]
impl MessageTransport for TelegramTransport {
    async fn send_artifact(
        &self,
        destination: &Destination,
        artifact: &ChartArtifact,
        caption: &str,
    ) -> Result<(), NotifyError> {
        let bytes = artifact.read().await?;
        let part = Part::bytes(bytes)
            .file_name(artifact.file_name().to_string())
            .mime_str(artifact.mime())
            .map_err(|e| NotifyError::Render(e.to_string()))?;

        let form = Form::new()
            .text("chat_id", destination.chat_id().to_string())
            .text("caption", caption.to_string())
            .part("photo", part);

        let resp = self
            .client
            .post(self.api_url(destination.bot_token(), "sendPhoto"))
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        let parsed: Option<ApiResponse> = serde_json::from_str(&body).ok();

        if !status.is_success() {
            return Err(NotifyError::Rejected {
                status: Some(status.as_u16()),
                description: parsed
                    .and_then(|r| r.description)
                    .unwrap_or_else(|| body.chars().take(200).collect()),
            });
        }

        match parsed {
            Some(ApiResponse { ok: true, .. }) => Ok(()),
            Some(ApiResponse { description, .. }) => Err(NotifyError::Rejected {
                status: None,
                description: description.unwrap_or_else(|| "ok=false".to_string()),
            }),
            None => Err(NotifyError::Transport(
                "sendPhoto returned a non-JSON body".to_string(),
            )),
        }
    }
}

fn transport_error(e: reqwest::Error) -> NotifyError {
    let timed_out = e.is_timeout();
    let e = e.without_url();
    if timed_out {
        NotifyError::Transport(format!("request timed out: {}", e))
    } else {
        NotifyError::Transport(e.to_string())
    }
}
