//! Chat platform adapters.
//!
//! Each platform implements [`ChatPlatformAdapter`]; the dispatcher only
//! ever sees the neutral [`InboundCommand`](crate::command::InboundCommand)
//! and [`PlatformResponse`] types.

pub mod slack;
pub mod teams;

use async_trait::async_trait;
use axum::http::HeaderMap;

use crate::command::{InboundCommand, ParseError};
use crate::security::VerifyError;

/// Who can see a response. Everything defaults to ephemeral; only the
/// thanks celebration and give-completion notices go to the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Ephemeral,
    InChannel,
}

/// A platform-neutral response; adapters render it to the wire format.
#[derive(Debug, Clone)]
pub struct PlatformResponse {
    pub text: String,
    pub blocks: Option<serde_json::Value>,
    pub visibility: Visibility,
}

impl PlatformResponse {
    pub fn ephemeral(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            blocks: None,
            visibility: Visibility::Ephemeral,
        }
    }

    pub fn in_channel(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            blocks: None,
            visibility: Visibility::InChannel,
        }
    }

    pub fn with_blocks(mut self, blocks: serde_json::Value) -> Self {
        self.blocks = Some(blocks);
        self
    }
}

/// One concrete variant per chat platform.
pub trait ChatPlatformAdapter: Send + Sync {
    fn platform_id(&self) -> &'static str;

    /// Verify an inbound delivery against the exact raw body bytes. Must run
    /// before any parsing or decoding.
    fn verify_signature(&self, headers: &HeaderMap, body: &[u8]) -> Result<(), VerifyError>;

    /// Decode the wire payload into a neutral command.
    fn parse_inbound(&self, body: &[u8]) -> Result<InboundCommand, ParseError>;

    /// Render a neutral response into the platform's wire format.
    fn format_response(&self, response: &PlatformResponse) -> serde_json::Value;
}

/// Best-effort outbound side messages: recipient DMs, channel posts and
/// interactive forms. Callers treat failures as logged-but-ignored; a side
/// message must never fail the originating command.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_user(&self, user_id: &str, text: &str) -> anyhow::Result<()>;

    async fn post_to_channel(
        &self,
        channel_id: &str,
        response: &PlatformResponse,
    ) -> anyhow::Result<()>;

    /// Open the interactive give form for the given trigger. Errors tell the
    /// dispatcher to fall back to the inline form.
    async fn open_give_form(&self, trigger_id: &str) -> anyhow::Result<()>;

    /// Deliver a deferred ephemeral follow-up through the platform's
    /// response-callback mechanism.
    async fn respond_ephemeral(&self, callback_url: &str, text: &str) -> anyhow::Result<()>;
}

/// Notifier used in mock mode: logs and drops every side message.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify_user(&self, user_id: &str, _text: &str) -> anyhow::Result<()> {
        tracing::debug!(user = user_id, "mock mode: dropping user notification");
        Ok(())
    }

    async fn post_to_channel(
        &self,
        channel_id: &str,
        _response: &PlatformResponse,
    ) -> anyhow::Result<()> {
        tracing::debug!(channel = channel_id, "mock mode: dropping channel post");
        Ok(())
    }

    async fn open_give_form(&self, _trigger_id: &str) -> anyhow::Result<()> {
        anyhow::bail!("no chat API credentials; use the inline form")
    }

    async fn respond_ephemeral(&self, _callback_url: &str, _text: &str) -> anyhow::Result<()> {
        tracing::debug!("mock mode: dropping callback follow-up");
        Ok(())
    }
}
