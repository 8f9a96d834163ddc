//! Workflow orchestration trigger.
//!
//! When an orchestrator is configured, a created recognition is handed off
//! to it for approval/notification tracking. When it is disabled or
//! unreachable the hand-off degrades to a synchronous mock path that
//! completes immediately. Callers dispatch this as a detached task; a
//! failed hand-off never fails the originating command.

use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::WorkflowConfig;
use crate::rewards::RecognitionRequest;

/// Point threshold at which the mock path flags a recognition for approval.
pub const APPROVAL_THRESHOLD: u32 = 250;

#[derive(Debug, Clone)]
pub struct WorkflowOutcome {
    pub workflow_id: String,
    pub status: String,
    pub approval_required: bool,
}

#[derive(Debug, Deserialize)]
struct RemoteWorkflowRun {
    workflow_id: String,
    #[serde(default)]
    approval_required: bool,
}

pub struct WorkflowService {
    client: reqwest::Client,
    base_url: String,
    enabled: bool,
}

impl WorkflowService {
    pub fn new(config: &WorkflowConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            enabled: config.enabled,
        }
    }

    pub fn disabled() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: String::new(),
            enabled: false,
        }
    }

    /// Hand a recognition to the orchestrator, falling back to the
    /// synchronous mock path when it is disabled or unreachable.
    pub async fn start_recognition_workflow(&self, request: &RecognitionRequest) -> WorkflowOutcome {
        if self.enabled {
            match self.run_remote(request).await {
                Ok(outcome) => return outcome,
                Err(e) => {
                    warn!(error = %e, "workflow orchestrator unreachable, using mock workflow");
                }
            }
        }
        self.mock_workflow(request)
    }

    async fn run_remote(&self, request: &RecognitionRequest) -> anyhow::Result<WorkflowOutcome> {
        let url = format!("{}/workflows/recognition-approval/run", self.base_url);
        let response = self.client.post(&url).json(request).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("orchestrator returned HTTP {}", response.status());
        }
        let run: RemoteWorkflowRun = response.json().await?;
        Ok(WorkflowOutcome {
            workflow_id: run.workflow_id,
            status: "started".to_string(),
            approval_required: run.approval_required,
        })
    }

    fn mock_workflow(&self, request: &RecognitionRequest) -> WorkflowOutcome {
        let points = request.points.unwrap_or(0);
        let approval_required = points >= APPROVAL_THRESHOLD;
        info!(
            recipient = %request.recipient_id,
            points,
            approval_required,
            "mock workflow processed recognition"
        );
        WorkflowOutcome {
            workflow_id: format!("mock-wf-{}", Uuid::new_v4().simple()),
            status: "completed".to_string(),
            approval_required,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Platform;

    fn points_request(points: u32) -> RecognitionRequest {
        RecognitionRequest::points(
            "U1",
            "U2",
            points,
            "great work",
            vec![],
            Platform::Slack,
            "C1",
            false,
        )
    }

    #[tokio::test]
    async fn test_mock_workflow_below_threshold() {
        let service = WorkflowService::disabled();
        let outcome = service
            .start_recognition_workflow(&points_request(APPROVAL_THRESHOLD - 1))
            .await;
        assert_eq!(outcome.status, "completed");
        assert!(!outcome.approval_required);
    }

    #[tokio::test]
    async fn test_mock_workflow_at_threshold_requires_approval() {
        let service = WorkflowService::disabled();
        let outcome = service
            .start_recognition_workflow(&points_request(APPROVAL_THRESHOLD))
            .await;
        assert!(outcome.approval_required);
    }

    #[tokio::test]
    async fn test_unreachable_orchestrator_falls_back() {
        let service = WorkflowService::new(&WorkflowConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            enabled: true,
            request_timeout_secs: 1,
        });
        let outcome = service
            .start_recognition_workflow(&points_request(100))
            .await;
        assert_eq!(outcome.status, "completed");
        assert!(outcome.workflow_id.starts_with("mock-wf-"));
    }
}
