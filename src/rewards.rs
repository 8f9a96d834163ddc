//! RewardStation upstream client.
//!
//! The real rewards platform is an external collaborator reached over HTTP;
//! [`RewardsApi`] is the seam. [`HttpRewardsApi`] talks to a configured base
//! URL, [`MockRewardsApi`] is the injected in-memory stand-in used in mock
//! mode and in tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::command::Platform;
use crate::config::RewardStationConfig;
use crate::error::GatewayError;

/// Fixed point value awarded by a quick `/thanks`.
pub const THANKS_POINTS: u32 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecognitionKind {
    Thanks,
    Points,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecognitionMetadata {
    pub original_command: String,
    pub ai_enhanced: bool,
    pub timestamp_iso: String,
}

/// Payload handed to the rewards platform. Never mutated after creation;
/// ownership passes to the upstream client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecognitionRequest {
    pub actor_id: String,
    pub recipient_id: String,
    pub kind: RecognitionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points: Option<u32>,
    pub message: String,
    pub behavior_tags: Vec<String>,
    pub source_platform: Platform,
    pub source_channel_id: String,
    pub metadata: RecognitionMetadata,
}

impl RecognitionRequest {
    /// A quick thanks: fixed 25 points, no behavior tags, auto-approved.
    pub fn thanks(
        actor_id: &str,
        recipient_id: &str,
        message: &str,
        platform: Platform,
        channel_id: &str,
        original_command: &str,
    ) -> Self {
        Self {
            actor_id: actor_id.to_string(),
            recipient_id: recipient_id.to_string(),
            kind: RecognitionKind::Thanks,
            points: Some(THANKS_POINTS),
            message: message.to_string(),
            behavior_tags: Vec::new(),
            source_platform: platform,
            source_channel_id: channel_id.to_string(),
            metadata: RecognitionMetadata {
                original_command: original_command.to_string(),
                ai_enhanced: false,
                timestamp_iso: Utc::now().to_rfc3339(),
            },
        }
    }

    /// A points recognition from the interactive give form. `points` must
    /// already have passed [`crate::security::validate_points`].
    #[allow(clippy::too_many_arguments)]
    pub fn points(
        actor_id: &str,
        recipient_id: &str,
        points: u32,
        message: &str,
        behavior_tags: Vec<String>,
        platform: Platform,
        channel_id: &str,
        ai_enhanced: bool,
    ) -> Self {
        Self {
            actor_id: actor_id.to_string(),
            recipient_id: recipient_id.to_string(),
            kind: RecognitionKind::Points,
            points: Some(points),
            message: message.to_string(),
            behavior_tags,
            source_platform: platform,
            source_channel_id: channel_id.to_string(),
            metadata: RecognitionMetadata {
                original_command: "/give (form)".to_string(),
                ai_enhanced,
                timestamp_iso: Utc::now().to_rfc3339(),
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecognitionReceipt {
    pub recognition_id: String,
    pub status: String,
    #[serde(default)]
    pub approval_required: bool,
    #[serde(default)]
    pub approval_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserRecord {
    pub employee_id: String,
    pub email: String,
    pub display_name: String,
    pub platform: String,
    pub platform_user_id: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PointsBalance {
    pub balance: u32,
}

/// Capability surface of the rewards platform.
#[async_trait]
pub trait RewardsApi: Send + Sync {
    async fn lookup_user(
        &self,
        platform: Platform,
        platform_user_id: &str,
    ) -> Result<UserRecord, GatewayError>;

    async fn create_recognition(
        &self,
        request: &RecognitionRequest,
    ) -> Result<RecognitionReceipt, GatewayError>;

    async fn get_balance(&self, employee_id: &str) -> Result<PointsBalance, GatewayError>;
}

// ── HTTP client ───────────────────────────────────────────────────────────────

pub struct HttpRewardsApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRewardsApi {
    pub fn new(config: &RewardStationConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: config.api_base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl RewardsApi for HttpRewardsApi {
    async fn lookup_user(
        &self,
        platform: Platform,
        platform_user_id: &str,
    ) -> Result<UserRecord, GatewayError> {
        let url = format!("{}/users/lookup", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&json!({
                "platform": platform,
                "platform_user_id": platform_user_id,
            }))
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "RewardStation user lookup failed");
                GatewayError::UpstreamUnavailable
            })?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "RewardStation user lookup returned error");
            return Err(GatewayError::UpstreamUnavailable);
        }

        response.json().await.map_err(|e| {
            warn!(error = %e, "RewardStation user lookup response unreadable");
            GatewayError::UpstreamUnavailable
        })
    }

    async fn create_recognition(
        &self,
        request: &RecognitionRequest,
    ) -> Result<RecognitionReceipt, GatewayError> {
        let url = format!("{}/recognitions", self.base_url);
        let response = self.client.post(&url).json(request).send().await.map_err(|e| {
            warn!(error = %e, "RewardStation recognition creation failed");
            GatewayError::UpstreamUnavailable
        })?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "RewardStation recognition creation returned error");
            return Err(GatewayError::UpstreamUnavailable);
        }

        response.json().await.map_err(|e| {
            warn!(error = %e, "RewardStation recognition response unreadable");
            GatewayError::UpstreamUnavailable
        })
    }

    async fn get_balance(&self, employee_id: &str) -> Result<PointsBalance, GatewayError> {
        let url = format!("{}/users/{}/balance", self.base_url, employee_id);
        let response = self.client.get(&url).send().await.map_err(|e| {
            warn!(error = %e, "RewardStation balance lookup failed");
            GatewayError::UpstreamUnavailable
        })?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "RewardStation balance lookup returned error");
            return Err(GatewayError::UpstreamUnavailable);
        }

        response.json().await.map_err(|e| {
            warn!(error = %e, "RewardStation balance response unreadable");
            GatewayError::UpstreamUnavailable
        })
    }
}

// ── In-memory mock ────────────────────────────────────────────────────────────

/// Balance reported for every user in mock mode.
const MOCK_BALANCE: u32 = 2_500;

/// In-memory stand-in for the rewards platform.
///
/// Unknown platform users are auto-provisioned on lookup so demo workspaces
/// work without seeding.
pub struct MockRewardsApi {
    users: Mutex<HashMap<String, UserRecord>>,
    recognitions: Mutex<Vec<(RecognitionRequest, RecognitionReceipt)>>,
}

impl Default for MockRewardsApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRewardsApi {
    pub fn new() -> Self {
        let seed = [
            ("emp_001", "john.doe@example.com", "John Doe", "U1234567890"),
            ("emp_002", "jane.smith@example.com", "Jane Smith", "U1234567891"),
            ("emp_003", "mike.wilson@example.com", "Mike Wilson", "U1234567892"),
            ("emp_004", "sarah.johnson@example.com", "Sarah Johnson", "U1234567893"),
        ];
        let users = seed
            .into_iter()
            .map(|(employee_id, email, name, platform_user_id)| {
                (
                    platform_user_id.to_string(),
                    UserRecord {
                        employee_id: employee_id.to_string(),
                        email: email.to_string(),
                        display_name: name.to_string(),
                        platform: Platform::Slack.as_str().to_string(),
                        platform_user_id: platform_user_id.to_string(),
                    },
                )
            })
            .collect();

        Self {
            users: Mutex::new(users),
            recognitions: Mutex::new(Vec::new()),
        }
    }

    /// All recognitions recorded so far (debugging and tests).
    pub async fn all_recognitions(&self) -> Vec<RecognitionRequest> {
        self.recognitions
            .lock()
            .await
            .iter()
            .map(|(request, _)| request.clone())
            .collect()
    }
}

#[async_trait]
impl RewardsApi for MockRewardsApi {
    async fn lookup_user(
        &self,
        platform: Platform,
        platform_user_id: &str,
    ) -> Result<UserRecord, GatewayError> {
        let mut users = self.users.lock().await;
        if let Some(user) = users.get(platform_user_id) {
            return Ok(user.clone());
        }

        info!(user = platform_user_id, "mock rewards: auto-provisioning user");
        let user = UserRecord {
            employee_id: format!("emp_{platform_user_id}"),
            email: format!("user.{platform_user_id}@example.com"),
            display_name: format!("Mock User {platform_user_id}"),
            platform: platform.as_str().to_string(),
            platform_user_id: platform_user_id.to_string(),
        };
        users.insert(platform_user_id.to_string(), user.clone());
        Ok(user)
    }

    async fn create_recognition(
        &self,
        request: &RecognitionRequest,
    ) -> Result<RecognitionReceipt, GatewayError> {
        let recognition_id = format!("rec_{}", Uuid::new_v4().simple());
        let receipt = match request.kind {
            RecognitionKind::Thanks => RecognitionReceipt {
                recognition_id,
                status: "delivered".to_string(),
                approval_required: false,
                approval_url: None,
            },
            RecognitionKind::Points => RecognitionReceipt {
                approval_url: Some(format!(
                    "https://mock-rewardstation.example.com/approve/{recognition_id}"
                )),
                recognition_id,
                status: "submitted".to_string(),
                approval_required: true,
            },
        };

        self.recognitions
            .lock()
            .await
            .push((request.clone(), receipt.clone()));
        Ok(receipt)
    }

    async fn get_balance(&self, _employee_id: &str) -> Result<PointsBalance, GatewayError> {
        Ok(PointsBalance {
            balance: MOCK_BALANCE,
        })
    }
}
