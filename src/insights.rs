//! Maslow Insights client.
//!
//! The AI collaborator provides contextual help, message enhancement and
//! behavior-tag suggestions. Every call here is best-effort with a bounded
//! budget: on timeout or error the caller gets a local fallback, never an
//! error. Commands must not fail because the AI is down.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tokio::time::timeout;
use tracing::warn;

use crate::config::InsightsConfig;

/// Fixed help text used whenever the AI collaborator is disabled or failing.
pub const FALLBACK_HELP: &str = "*Maslow Insights Help*\n\n\
• `/thanks @user \"message\"` - Quick 25-point appreciation\n\
• `/give` - Opens the recognition form (selectable points)\n\
• `/balance` - Check your point balance\n\
• `/help` - This guidance";

#[derive(Debug, Clone, Deserialize)]
pub struct SuggestedAction {
    pub text: String,
    pub command: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HelpContent {
    pub response_text: String,
    #[serde(default)]
    pub suggested_actions: Vec<SuggestedAction>,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct Enhanced {
    enhanced_content: String,
}

/// Context forwarded with an enhancement request.
#[derive(Debug, Clone, Default)]
pub struct EnhanceContext {
    pub recipient_name: Option<String>,
    pub points: Option<u32>,
    pub behaviors: Vec<String>,
}

pub struct InsightsClient {
    client: reqwest::Client,
    base_url: String,
    enabled: bool,
    call_budget: Duration,
}

impl InsightsClient {
    pub fn new(config: &InsightsConfig) -> Self {
        let call_budget = Duration::from_secs(config.request_timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(call_budget)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            enabled: config.enabled,
            call_budget,
        }
    }

    /// A client that always takes the local fallback paths.
    pub fn disabled() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: String::new(),
            enabled: false,
            call_budget: Duration::from_secs(1),
        }
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Option<T> {
        let url = format!("{}{}", self.base_url, path);
        let fut = async {
            let response = self.client.post(&url).json(&body).send().await.ok()?;
            if !response.status().is_success() {
                return None;
            }
            let envelope: Envelope<T> = response.json().await.ok()?;
            if envelope.success {
                envelope.data
            } else {
                None
            }
        };
        match timeout(self.call_budget, fut).await {
            Ok(data) => data,
            Err(_) => {
                warn!(path, "insights call exceeded its budget");
                None
            }
        }
    }

    /// Contextual help. `None` means the caller should use [`FALLBACK_HELP`].
    pub async fn help(&self, platform: &str, user_id: &str) -> Option<HelpContent> {
        if !self.enabled {
            return None;
        }
        self.post_json(
            "/help",
            json!({
                "type": "help",
                "context": { "user": { "id": user_id, "platform": platform } },
            }),
        )
        .await
    }

    /// Enhance a recognition message. Returns the message to use and whether
    /// it was AI-enhanced; on any failure the original comes back untouched.
    pub async fn enhance_message(&self, message: &str, context: &EnhanceContext) -> (String, bool) {
        if !self.enabled {
            return (message.to_string(), false);
        }

        let enhanced: Option<Enhanced> = self
            .post_json(
                "/enhance-message",
                json!({
                    "message": message,
                    "context": {
                        "recipient_name": context.recipient_name,
                        "points": context.points,
                        "behaviors": context.behaviors,
                    },
                }),
            )
            .await;

        match enhanced {
            Some(e) if !e.enhanced_content.trim().is_empty() => (e.enhanced_content, true),
            _ => {
                warn!("message enhancement unavailable, using original message");
                (message.to_string(), false)
            }
        }
    }

    /// Suggest behavior tags for a message. Falls back to local keyword
    /// matching when the collaborator is disabled or failing.
    pub async fn suggest_behaviors(&self, message: &str) -> Vec<String> {
        if self.enabled {
            if let Some(tags) = self
                .post_json::<Vec<String>>("/suggest-behavior", json!({ "message": message }))
                .await
            {
                if !tags.is_empty() {
                    return tags;
                }
            }
        }
        local_behavior_suggestions(message)
    }
}

/// Keyword-matched behavior suggestions, capped at three.
fn local_behavior_suggestions(message: &str) -> Vec<String> {
    const BEHAVIOR_KEYWORDS: &[(&str, &[&str])] = &[
        ("innovation", &["innovative", "creative", "new idea", "solution"]),
        ("teamwork", &["team", "collaborate", "support", "help"]),
        ("customer focus", &["customer", "client", "user", "service"]),
        ("leadership", &["lead", "mentor", "guide", "direction"]),
        ("quality excellence", &["quality", "excellent", "perfect", "detail"]),
        ("accountability", &["responsible", "ownership", "deliver", "commit"]),
    ];

    let lower = message.to_lowercase();
    let mut suggested: Vec<String> = BEHAVIOR_KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(behavior, _)| behavior.to_string())
        .collect();

    if suggested.is_empty() {
        suggested = vec!["teamwork".to_string(), "quality excellence".to_string()];
    }
    suggested.truncate(3);
    suggested
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_client_passes_message_through() {
        let client = InsightsClient::disabled();
        let (message, enhanced) = client
            .enhance_message("great work", &EnhanceContext::default())
            .await;
        assert_eq!(message, "great work");
        assert!(!enhanced);
    }

    #[tokio::test]
    async fn test_unreachable_collaborator_falls_back_to_original() {
        let client = InsightsClient::new(&InsightsConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            enabled: true,
            request_timeout_secs: 1,
        });
        let (message, enhanced) = client
            .enhance_message("original words", &EnhanceContext::default())
            .await;
        assert_eq!(message, "original words");
        assert!(!enhanced);
    }

    #[tokio::test]
    async fn test_disabled_client_returns_no_help() {
        let client = InsightsClient::disabled();
        assert!(client.help("slack", "U1").await.is_none());
    }

    #[test]
    fn test_local_behavior_keywords() {
        let tags = local_behavior_suggestions("great team collaboration on a creative solution");
        assert!(tags.contains(&"teamwork".to_string()));
        assert!(tags.contains(&"innovation".to_string()));
        assert!(tags.len() <= 3);
    }

    #[test]
    fn test_local_behavior_defaults() {
        let tags = local_behavior_suggestions("xyz");
        assert_eq!(
            tags,
            vec!["teamwork".to_string(), "quality excellence".to_string()]
        );
    }
}
