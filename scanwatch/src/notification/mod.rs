//! Per-symbol notifications.
//!
//! A notification renders a chart artifact for the symbol and delivers it
//! with a caption. The artifact is released on every exit path. Failures are
//! logged with symbol and chat context and returned as an outcome; nothing
//! propagates to the caller and nothing is retried.

pub mod render;
pub mod telegram;

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use tracing::{error, info};

pub use render::{ChartArtifact, ChartRenderer, PlaceholderChartRenderer};
pub use telegram::{MessageTransport, TelegramTransport};

/// Where a notification goes.
#[derive(Clone, PartialEq, Eq)]
pub struct Destination {
    bot_token: String,
    chat_id: String,
}

impl Destination {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        }
    }

    pub fn bot_token(&self) -> &str {
        &self.bot_token
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }
}

impl fmt::Debug for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Destination")
            .field("bot_token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

/// Notification failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NotifyError {
    #[error("render failed: {0}")]
    Render(String),

    #[error("delivery failed: {0}")]
    Transport(String),

    #[error("delivery rejected{}: {description}", status_suffix(.status))]
    Rejected {
        status: Option<u16>,
        description: String,
    },
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

/// Result of one notify call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    Delivered,
    Failed(NotifyError),
}

impl NotifyOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// Delivers one symbol to one destination.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, destination: &Destination, symbol: &str) -> NotifyOutcome;
}

/// Renders a chart and hands it to a transport.
pub struct ChartNotifier<R, T> {
    renderer: R,
    transport: T,
    caption_prefix: String,
}

impl<R: ChartRenderer, T: MessageTransport> ChartNotifier<R, T> {
    pub fn new(renderer: R, transport: T, caption_prefix: impl Into<String>) -> Self {
        Self {
            renderer,
            transport,
            caption_prefix: caption_prefix.into(),
        }
    }

    pub fn caption(&self, symbol: &str) -> String {
        format!("{}: {}", self.caption_prefix, symbol)
    }

    async fn render_and_send(&self, destination: &Destination, symbol: &str) -> Result<(), NotifyError> {
        let artifact = self.renderer.render(symbol)?;
        let caption = self.caption(symbol);
        self.transport
            .send_artifact(destination, &artifact, &caption)
            .await
    }
}

#[async_trait]
impl<R: ChartRenderer, T: MessageTransport> Notifier for ChartNotifier<R, T> {
    async fn notify(&self, destination: &Destination, symbol: &str) -> NotifyOutcome {
        match self.render_and_send(destination, symbol).await {
            Ok(()) => {
                info!(symbol = %symbol, chat_id = %destination.chat_id(), "Sent notification");
                NotifyOutcome::Delivered
            }
            Err(e) => {
                error!(
                    symbol = %symbol,
                    chat_id = %destination.chat_id(),
                    error = %e,
                    "Error sending notification"
                );
                NotifyOutcome::Failed(e)
            }
        }
    }
}
