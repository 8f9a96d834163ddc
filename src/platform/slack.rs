//! Slack adapter: slash-command payloads, interactive submissions, Block Kit
//! rendering and the Web API client used for side messages.
//!
//! Slash commands arrive form-encoded; the raw bytes are verified against
//! `X-Slack-Signature` / `X-Slack-Request-Timestamp` before any decoding.

use async_trait::async_trait;
use axum::http::HeaderMap;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::command::{self, GiveSubmission, InboundCommand, ParseError, Platform, RawCommand};
use crate::config::SlackConfig;
use crate::insights::HelpContent;
use crate::platform::{ChatPlatformAdapter, Notifier, PlatformResponse, Visibility};
use crate::security::{self, VerifyError};

pub const SIGNATURE_HEADER: &str = "x-slack-signature";
pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";

/// Callback id of the give modal; interactive submissions are matched on it.
pub const GIVE_MODAL_CALLBACK_ID: &str = "give_recognition_modal";

/// One slash-command delivery, as Slack form-encodes it.
#[derive(Debug, Deserialize)]
pub struct SlashPayload {
    pub command: String,
    #[serde(default)]
    pub text: String,
    pub user_id: String,
    pub channel_id: String,
    #[serde(default)]
    pub response_url: Option<String>,
    #[serde(default)]
    pub trigger_id: Option<String>,
}

pub struct SlackAdapter {
    config: SlackConfig,
}

impl SlackAdapter {
    pub fn new(config: SlackConfig) -> Self {
        Self { config }
    }
}

impl ChatPlatformAdapter for SlackAdapter {
    fn platform_id(&self) -> &'static str {
        Platform::Slack.as_str()
    }

    fn verify_signature(&self, headers: &HeaderMap, body: &[u8]) -> Result<(), VerifyError> {
        if !self.config.verification_enabled() {
            info!("slack signature verification bypassed: no real signing secret configured");
            return Ok(());
        }

        let timestamp = headers.get(TIMESTAMP_HEADER).and_then(|v| v.to_str().ok());
        let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());

        security::verify_signature(
            self.config.signing_secret.as_bytes(),
            timestamp,
            signature,
            body,
        )
        .inspect_err(|e| {
            security::log_security_event(&format!("slack_{e}"), Platform::Slack, None);
        })
    }

    fn parse_inbound(&self, body: &[u8]) -> Result<InboundCommand, ParseError> {
        let payload: SlashPayload = serde_urlencoded::from_bytes(body)
            .map_err(|e| ParseError::MalformedPayload(e.to_string()))?;

        let raw = RawCommand {
            command: Some(payload.command),
            text: payload.text,
            actor_id: payload.user_id,
            channel_id: payload.channel_id,
            response_url: payload.response_url,
            trigger_id: payload.trigger_id,
        };
        command::parse(Platform::Slack, &raw)
    }

    fn format_response(&self, response: &PlatformResponse) -> Value {
        let response_type = match response.visibility {
            Visibility::Ephemeral => "ephemeral",
            Visibility::InChannel => "in_channel",
        };
        let mut body = json!({
            "response_type": response_type,
            "text": response.text,
        });
        if let Some(blocks) = &response.blocks {
            body["blocks"] = blocks.clone();
        }
        body
    }
}

// ── Interactive payloads ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct InteractiveForm {
    payload: String,
}

/// Interactions we act on; everything else is acknowledged and dropped.
#[derive(Debug)]
pub enum Interaction {
    GiveSubmission(GiveSubmission),
    Other,
}

/// Decode an interactive-component delivery (`payload=<json>` form body).
pub fn parse_interaction(body: &[u8]) -> Result<Interaction, ParseError> {
    let form: InteractiveForm = serde_urlencoded::from_bytes(body)
        .map_err(|e| ParseError::MalformedPayload(e.to_string()))?;
    let payload: Value = serde_json::from_str(&form.payload)
        .map_err(|e| ParseError::MalformedPayload(e.to_string()))?;

    let is_give_submission = payload["type"] == "view_submission"
        && payload["view"]["callback_id"] == GIVE_MODAL_CALLBACK_ID;
    if !is_give_submission {
        return Ok(Interaction::Other);
    }

    let values = &payload["view"]["state"]["values"];
    let actor_id = payload["user"]["id"]
        .as_str()
        .ok_or_else(|| ParseError::MalformedPayload("missing user id".to_string()))?
        .to_string();
    let recipient_id = values["recipient_block"]["recipient_select"]["selected_user"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    let points: i64 = values["points_block"]["points_select"]["selected_option"]["value"]
        .as_str()
        .and_then(|v| v.parse().ok())
        .unwrap_or(-1);
    let behavior_tags = values["behavior_block"]["behavior_checkboxes"]["selected_options"]
        .as_array()
        .map(|options| {
            options
                .iter()
                .filter_map(|o| o["value"].as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();
    let message = values["message_block"]["message_input"]["value"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    // The modal has no channel context; completion notices fall back to a DM
    // with the actor when this is empty.
    let channel_id = payload["view"]["private_metadata"]
        .as_str()
        .unwrap_or_default()
        .to_string();

    Ok(Interaction::GiveSubmission(GiveSubmission {
        platform: Platform::Slack,
        actor_id,
        recipient_id,
        points,
        behavior_tags,
        message,
        channel_id,
    }))
}

// ── Block Kit builders ────────────────────────────────────────────────────────

/// Public celebration posted to the channel after a successful thanks.
pub fn thanks_celebration_blocks(actor_id: &str, recipient_id: &str, message: &str) -> Value {
    json!([
        {
            "type": "section",
            "text": {
                "type": "mrkdwn",
                "text": format!("🎉 *<@{actor_id}>* thanked *<@{recipient_id}>*!")
            }
        },
        {
            "type": "section",
            "text": {
                "type": "mrkdwn",
                "text": format!("💝 _\"{message}\"_")
            }
        },
        {
            "type": "context",
            "elements": [
                { "type": "mrkdwn", "text": "✨ Powered by RewardStation & Maslow Insights" }
            ]
        }
    ])
}

/// Help response with optional suggested-action buttons.
pub fn help_blocks(content: &HelpContent) -> Value {
    let mut blocks = vec![json!({
        "type": "section",
        "text": { "type": "mrkdwn", "text": content.response_text }
    })];

    if !content.suggested_actions.is_empty() {
        let elements: Vec<Value> = content
            .suggested_actions
            .iter()
            .map(|action| {
                json!({
                    "type": "button",
                    "text": { "type": "plain_text", "text": action.text },
                    "value": action.command,
                    "action_id": format!(
                        "help_action_{}",
                        action.text.to_lowercase().replace(' ', "_")
                    )
                })
            })
            .collect();
        blocks.push(json!({ "type": "actions", "elements": elements }));
    }

    Value::Array(blocks)
}

fn points_options() -> Value {
    json!([
        { "text": { "type": "plain_text", "text": "50 points - Daily help" }, "value": "50" },
        { "text": { "type": "plain_text", "text": "100 points - Good work" }, "value": "100" },
        { "text": { "type": "plain_text", "text": "150 points - Great effort" }, "value": "150" },
        { "text": { "type": "plain_text", "text": "200 points - Exceptional" }, "value": "200" },
        { "text": { "type": "plain_text", "text": "250 points - Outstanding" }, "value": "250" },
        { "text": { "type": "plain_text", "text": "500 points - Extraordinary" }, "value": "500" }
    ])
}

fn behavior_options() -> Value {
    json!([
        { "text": { "type": "plain_text", "text": "Innovation" }, "value": "innovation" },
        { "text": { "type": "plain_text", "text": "Teamwork" }, "value": "teamwork" },
        { "text": { "type": "plain_text", "text": "Customer Focus" }, "value": "customer_focus" },
        { "text": { "type": "plain_text", "text": "Leadership" }, "value": "leadership" },
        { "text": { "type": "plain_text", "text": "Quality Excellence" }, "value": "quality_excellence" },
        { "text": { "type": "plain_text", "text": "Accountability" }, "value": "accountability" }
    ])
}

/// The give modal opened via `views.open`.
pub fn give_modal_view() -> Value {
    json!({
        "type": "modal",
        "callback_id": GIVE_MODAL_CALLBACK_ID,
        "title": { "type": "plain_text", "text": "Give Recognition" },
        "submit": { "type": "plain_text", "text": "Send Recognition" },
        "close": { "type": "plain_text", "text": "Cancel" },
        "blocks": [
            {
                "type": "input",
                "block_id": "recipient_block",
                "element": {
                    "type": "users_select",
                    "action_id": "recipient_select",
                    "placeholder": { "type": "plain_text", "text": "Select recipient" }
                },
                "label": { "type": "plain_text", "text": "Who are you recognizing?" }
            },
            {
                "type": "input",
                "block_id": "points_block",
                "element": {
                    "type": "static_select",
                    "action_id": "points_select",
                    "placeholder": { "type": "plain_text", "text": "Select point amount" },
                    "options": points_options()
                },
                "label": { "type": "plain_text", "text": "Point amount" }
            },
            {
                "type": "input",
                "block_id": "behavior_block",
                "element": {
                    "type": "checkboxes",
                    "action_id": "behavior_checkboxes",
                    "options": behavior_options()
                },
                "label": { "type": "plain_text", "text": "Behavior attributes" }
            },
            {
                "type": "input",
                "block_id": "message_block",
                "element": {
                    "type": "plain_text_input",
                    "action_id": "message_input",
                    "multiline": true,
                    "placeholder": {
                        "type": "plain_text",
                        "text": "Describe the specific behavior or achievement..."
                    }
                },
                "label": { "type": "plain_text", "text": "Recognition message" }
            }
        ]
    })
}

/// Inline ephemeral fallback shown when the modal cannot be opened.
pub fn give_form_blocks() -> Value {
    json!([
        {
            "type": "section",
            "text": { "type": "mrkdwn", "text": "🎁 *Give Recognition*" }
        },
        {
            "type": "input",
            "block_id": "recipient_block",
            "element": {
                "type": "users_select",
                "action_id": "recipient_select",
                "placeholder": { "type": "plain_text", "text": "Choose a team member" }
            },
            "label": { "type": "plain_text", "text": "Select Recipient" }
        },
        {
            "type": "input",
            "block_id": "points_block",
            "element": {
                "type": "static_select",
                "action_id": "points_select",
                "placeholder": { "type": "plain_text", "text": "Select amount" },
                "options": points_options()
            },
            "label": { "type": "plain_text", "text": "Points to Award" }
        },
        {
            "type": "input",
            "block_id": "message_block",
            "element": {
                "type": "plain_text_input",
                "action_id": "message_input",
                "multiline": true,
                "placeholder": { "type": "plain_text", "text": "Why are you recognizing them?" }
            },
            "label": { "type": "plain_text", "text": "Recognition Message" }
        }
    ])
}

// ── Web API client ────────────────────────────────────────────────────────────

/// Thin client for the Slack Web API calls the gateway makes: channel posts,
/// recipient DMs and modal opens. Only constructed when a real bot token is
/// configured; mock mode uses [`crate::platform::NoopNotifier`].
pub struct SlackWebApi {
    client: reqwest::Client,
    bot_token: String,
}

impl SlackWebApi {
    pub fn new(bot_token: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(5))
                .build()
                .unwrap_or_default(),
            bot_token,
        }
    }

    async fn call(&self, method: &str, body: Value) -> anyhow::Result<()> {
        let url = format!("https://slack.com/api/{method}");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.bot_token)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("slack {method} returned HTTP {}", response.status());
        }
        // Slack reports API-level failure in the body with HTTP 200.
        let body: Value = response.json().await?;
        if body["ok"] != true {
            anyhow::bail!(
                "slack {method} failed: {}",
                body["error"].as_str().unwrap_or("unknown")
            );
        }
        Ok(())
    }

}

#[async_trait]
impl Notifier for SlackWebApi {
    async fn notify_user(&self, user_id: &str, text: &str) -> anyhow::Result<()> {
        self.call("chat.postMessage", json!({ "channel": user_id, "text": text }))
            .await
    }

    async fn post_to_channel(
        &self,
        channel_id: &str,
        response: &PlatformResponse,
    ) -> anyhow::Result<()> {
        let mut body = json!({
            "channel": channel_id,
            "text": response.text,
            "unfurl_links": false,
            "unfurl_media": false,
        });
        if let Some(blocks) = &response.blocks {
            body["blocks"] = blocks.clone();
        }
        self.call("chat.postMessage", body).await
    }

    async fn open_give_form(&self, trigger_id: &str) -> anyhow::Result<()> {
        self.call(
            "views.open",
            json!({ "trigger_id": trigger_id, "view": give_modal_view() }),
        )
        .await
    }

    /// Delayed response through a slash command's `response_url`.
    async fn respond_ephemeral(&self, callback_url: &str, text: &str) -> anyhow::Result<()> {
        let payload = json!({ "response_type": "ephemeral", "text": text });
        let response = self.client.post(callback_url).json(&payload).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("response_url post returned HTTP {}", response.status());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(signing_secret: &str) -> SlackAdapter {
        SlackAdapter::new(SlackConfig {
            signing_secret: signing_secret.to_string(),
            bot_token: "mock-bot-token".to_string(),
        })
    }

    #[test]
    fn test_parse_slash_payload() {
        let body = b"command=%2Fthanks&text=%3C%40U42%3E+%22nice+work%22&user_id=U1&channel_id=C9&trigger_id=123.456";
        let cmd = adapter("mock-signing-secret").parse_inbound(body).unwrap();
        assert_eq!(cmd.verb, crate::command::Verb::Thanks);
        assert_eq!(cmd.actor_id, "U1");
        assert_eq!(cmd.channel_id, "C9");
        assert_eq!(cmd.target_mention.as_deref(), Some("U42"));
        assert_eq!(cmd.free_text, "nice work");
        assert_eq!(cmd.trigger_id.as_deref(), Some("123.456"));
    }

    #[test]
    fn test_mock_secret_bypasses_verification() {
        let headers = HeaderMap::new();
        assert!(adapter("mock-signing-secret")
            .verify_signature(&headers, b"anything")
            .is_ok());
    }

    #[test]
    fn test_real_secret_requires_headers() {
        let headers = HeaderMap::new();
        let result = adapter("real-secret").verify_signature(&headers, b"anything");
        assert_eq!(result, Err(VerifyError::MissingTimestamp));
    }

    #[test]
    fn test_format_response_visibility() {
        let adapter = adapter("mock-signing-secret");
        let body = adapter.format_response(&PlatformResponse::ephemeral("hi"));
        assert_eq!(body["response_type"], "ephemeral");
        let body = adapter.format_response(&PlatformResponse::in_channel("hi"));
        assert_eq!(body["response_type"], "in_channel");
    }

    #[test]
    fn test_parse_give_submission() {
        let view_payload = serde_json::json!({
            "type": "view_submission",
            "user": { "id": "U1" },
            "view": {
                "callback_id": GIVE_MODAL_CALLBACK_ID,
                "private_metadata": "",
                "state": { "values": {
                    "recipient_block": { "recipient_select": { "selected_user": "U42" } },
                    "points_block": { "points_select": { "selected_option": { "value": "100" } } },
                    "behavior_block": { "behavior_checkboxes": { "selected_options": [
                        { "value": "teamwork" }
                    ] } },
                    "message_block": { "message_input": { "value": "great quarter" } }
                } }
            }
        });
        let body = serde_urlencoded::to_string([("payload", view_payload.to_string())]).unwrap();

        match parse_interaction(body.as_bytes()).unwrap() {
            Interaction::GiveSubmission(submission) => {
                assert_eq!(submission.actor_id, "U1");
                assert_eq!(submission.recipient_id, "U42");
                assert_eq!(submission.points, 100);
                assert_eq!(submission.behavior_tags, vec!["teamwork".to_string()]);
                assert_eq!(submission.message, "great quarter");
            }
            other => panic!("expected give submission, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_interaction_ignores_block_actions() {
        let payload = serde_json::json!({ "type": "block_actions", "actions": [] });
        let body = serde_urlencoded::to_string([("payload", payload.to_string())]).unwrap();
        assert!(matches!(
            parse_interaction(body.as_bytes()).unwrap(),
            Interaction::Other
        ));
    }

    #[test]
    fn test_celebration_blocks_reference_both_users() {
        let blocks = thanks_celebration_blocks("U1", "U42", "nice work");
        let rendered = blocks.to_string();
        assert!(rendered.contains("<@U1>"));
        assert!(rendered.contains("<@U42>"));
        assert!(rendered.contains("nice work"));
    }
}
