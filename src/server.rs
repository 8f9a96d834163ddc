//! HTTP surface of the gateway.
//!
//! Every inbound handler takes the raw body bytes and runs signature
//! verification before any decoding, so the signed bytes are exactly the
//! bytes on the wire. Acknowledgments go back inside the platform's
//! synchronous budget; slower work is detached by the dispatcher.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tracing::warn;

use crate::command::ParseError;
use crate::dispatch::{self, Dispatcher};
use crate::error::GatewayError;
use crate::platform::slack::{self, SlackAdapter};
use crate::platform::teams::TeamsAdapter;
use crate::platform::{ChatPlatformAdapter, Visibility};

#[derive(Clone)]
pub struct AppState {
    pub slack: Arc<SlackAdapter>,
    pub teams: Arc<TeamsAdapter>,
    pub dispatcher: Arc<Dispatcher>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/slack/events", post(slack_events))
        .route("/slack/interactive", post(slack_interactive))
        .route("/teams/messages", post(teams_messages))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "service": "rewardbot" }))
}

#[derive(serde::Deserialize)]
struct UrlVerification {
    #[serde(rename = "type")]
    kind: String,
    challenge: String,
}

async fn slack_events(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    if state.slack.verify_signature(&headers, &body).is_err() {
        // No detail in the response; the reason is in the security log.
        return (
            StatusCode::UNAUTHORIZED,
            GatewayError::Authentication.user_message(),
        )
            .into_response();
    }

    // One-time JSON challenge sent when the endpoint is registered.
    if let Ok(v) = serde_json::from_slice::<UrlVerification>(&body) {
        if v.kind == "url_verification" {
            return (StatusCode::OK, v.challenge).into_response();
        }
    }

    let command = match state.slack.parse_inbound(&body) {
        Ok(command) => command,
        Err(ParseError::MalformedPayload(e)) => {
            warn!(error = %e, "undecodable slack payload");
            return (StatusCode::BAD_REQUEST, "invalid payload").into_response();
        }
        Err(ParseError::UnknownCommand(verb)) => {
            let response = dispatch::unknown_command_response(&verb);
            return Json(state.slack.format_response(&response)).into_response();
        }
        Err(usage) => {
            // Usage errors still acknowledge with HTTP 200; the text goes
            // back ephemerally to the requester only.
            let response = crate::platform::PlatformResponse::ephemeral(usage.user_message());
            return Json(state.slack.format_response(&response)).into_response();
        }
    };

    let response = state.dispatcher.dispatch(&command).await;
    Json(state.slack.format_response(&response)).into_response()
}

async fn slack_interactive(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if state.slack.verify_signature(&headers, &body).is_err() {
        return (
            StatusCode::UNAUTHORIZED,
            GatewayError::Authentication.user_message(),
        )
            .into_response();
    }

    match slack::parse_interaction(&body) {
        Ok(slack::Interaction::GiveSubmission(submission)) => {
            let response = state.dispatcher.handle_give_submission(&submission).await;
            if response.visibility == Visibility::Ephemeral {
                // Validation failed; surface the message on the offending
                // modal block so the user can fix it in place.
                let text = response.text.to_lowercase();
                let block = if text.contains("recipient") {
                    "recipient_block"
                } else if text.contains("points") {
                    "points_block"
                } else {
                    "message_block"
                };
                Json(json!({
                    "response_action": "errors",
                    "errors": { block: response.text }
                }))
                .into_response()
            } else {
                Json(json!({ "response_action": "clear" })).into_response()
            }
        }
        Ok(slack::Interaction::Other) => StatusCode::OK.into_response(),
        Err(e) => {
            warn!(error = %e, "undecodable interactive payload");
            (StatusCode::BAD_REQUEST, "invalid payload").into_response()
        }
    }
}

async fn teams_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if state.teams.verify_signature(&headers, &body).is_err() {
        return (
            StatusCode::UNAUTHORIZED,
            GatewayError::Authentication.user_message(),
        )
            .into_response();
    }

    let command = match state.teams.parse_inbound(&body) {
        Ok(command) => command,
        Err(ParseError::MalformedPayload(e)) => {
            warn!(error = %e, "undecodable teams activity");
            return (StatusCode::BAD_REQUEST, "invalid payload").into_response();
        }
        Err(ParseError::UnknownCommand(verb)) => {
            let response = dispatch::unknown_command_response(&verb);
            return Json(state.teams.format_response(&response)).into_response();
        }
        Err(usage) => {
            let response = crate::platform::PlatformResponse::ephemeral(usage.user_message());
            return Json(state.teams.format_response(&response)).into_response();
        }
    };

    let response = state.dispatcher.dispatch(&command).await;
    Json(state.teams.format_response(&response)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SlackConfig, TeamsConfig};
    use crate::insights::InsightsClient;
    use crate::platform::NoopNotifier;
    use crate::rewards::MockRewardsApi;
    use crate::workflow::WorkflowService;

    fn state_with_secret(signing_secret: &str) -> (AppState, Arc<MockRewardsApi>) {
        let rewards = Arc::new(MockRewardsApi::new());
        let dispatcher = Arc::new(Dispatcher::new(
            rewards.clone(),
            Arc::new(InsightsClient::disabled()),
            Arc::new(WorkflowService::disabled()),
            Arc::new(NoopNotifier),
        ));
        let state = AppState {
            slack: Arc::new(SlackAdapter::new(SlackConfig {
                signing_secret: signing_secret.to_string(),
                bot_token: "mock-bot-token".to_string(),
            })),
            teams: Arc::new(TeamsAdapter::new(TeamsConfig {
                app_id: "mock-app-id".to_string(),
                app_password: "mock-app-password".to_string(),
            })),
            dispatcher,
        };
        (state, rewards)
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_missing_signature_is_unauthorized_and_creates_nothing() {
        let (state, rewards) = state_with_secret("a-real-signing-secret");
        let body = Bytes::from_static(
            b"command=%2Fthanks&text=%3C%40U42%3E+hi&user_id=U1&channel_id=C9",
        );
        let response = slack_events(State(state), HeaderMap::new(), body).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(rewards.all_recognitions().await.is_empty());
    }

    #[tokio::test]
    async fn test_mock_mode_thanks_flows_through() {
        let (state, rewards) = state_with_secret("mock-signing-secret");
        let body = Bytes::from_static(
            b"command=%2Fthanks&text=%3C%40U42%3E+%22nice+work%22&user_id=U1&channel_id=C9",
        );
        let response = slack_events(State(state), HeaderMap::new(), body).await;
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["response_type"], "in_channel");
        assert!(json["text"].as_str().unwrap().contains("U42"));
        assert_eq!(rewards.all_recognitions().await.len(), 1);
    }

    #[tokio::test]
    async fn test_url_verification_challenge_is_echoed() {
        let (state, _) = state_with_secret("mock-signing-secret");
        let body = Bytes::from(
            serde_json::json!({ "type": "url_verification", "challenge": "c0ffee" }).to_string(),
        );
        let response = slack_events(State(state), HeaderMap::new(), body).await;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(std::str::from_utf8(&bytes).unwrap(), "c0ffee");
    }

    #[tokio::test]
    async fn test_unknown_command_acknowledges_with_guidance() {
        let (state, rewards) = state_with_secret("mock-signing-secret");
        let body =
            Bytes::from_static(b"command=%2Fpromote&text=&user_id=U1&channel_id=C9");
        let response = slack_events(State(state), HeaderMap::new(), body).await;
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["response_type"], "ephemeral");
        assert!(json["text"].as_str().unwrap().contains("promote"));
        assert!(rewards.all_recognitions().await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_recipient_acknowledges_with_usage() {
        let (state, rewards) = state_with_secret("mock-signing-secret");
        let body = Bytes::from_static(b"command=%2Fthanks&text=no+mention&user_id=U1&channel_id=C9");
        let response = slack_events(State(state), HeaderMap::new(), body).await;
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["response_type"], "ephemeral");
        assert!(json["text"].as_str().unwrap().contains("mention"));
        assert!(rewards.all_recognitions().await.is_empty());
    }

    #[tokio::test]
    async fn test_give_submission_clears_modal() {
        let (state, rewards) = state_with_secret("mock-signing-secret");
        let payload = serde_json::json!({
            "type": "view_submission",
            "user": { "id": "U1" },
            "view": {
                "callback_id": slack::GIVE_MODAL_CALLBACK_ID,
                "private_metadata": "",
                "state": { "values": {
                    "recipient_block": { "recipient_select": { "selected_user": "U42" } },
                    "points_block": { "points_select": { "selected_option": { "value": "100" } } },
                    "behavior_block": { "behavior_checkboxes": { "selected_options": [] } },
                    "message_block": { "message_input": { "value": "well done" } }
                } }
            }
        });
        let body = serde_urlencoded::to_string([("payload", payload.to_string())]).unwrap();
        let response =
            slack_interactive(State(state), HeaderMap::new(), Bytes::from(body)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["response_action"], "clear");
        assert_eq!(rewards.all_recognitions().await.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_points_surface_as_modal_errors() {
        let (state, rewards) = state_with_secret("mock-signing-secret");
        let payload = serde_json::json!({
            "type": "view_submission",
            "user": { "id": "U1" },
            "view": {
                "callback_id": slack::GIVE_MODAL_CALLBACK_ID,
                "private_metadata": "",
                "state": { "values": {
                    "recipient_block": { "recipient_select": { "selected_user": "U42" } },
                    "points_block": { "points_select": { "selected_option": { "value": "10001" } } },
                    "behavior_block": { "behavior_checkboxes": { "selected_options": [] } },
                    "message_block": { "message_input": { "value": "well done" } }
                } }
            }
        });
        let body = serde_urlencoded::to_string([("payload", payload.to_string())]).unwrap();
        let response =
            slack_interactive(State(state), HeaderMap::new(), Bytes::from(body)).await;

        let json = body_json(response).await;
        assert_eq!(json["response_action"], "errors");
        assert!(rewards.all_recognitions().await.is_empty());
    }

    #[tokio::test]
    async fn test_teams_thanks_flows_through() {
        let (state, rewards) = state_with_secret("mock-signing-secret");
        let body = Bytes::from(
            serde_json::json!({
                "type": "message",
                "text": "thanks <at>jane</at> great work",
                "from": { "id": "29:abc" },
                "conversation": { "id": "19:channel" },
            })
            .to_string(),
        );
        let response = teams_messages(State(state), HeaderMap::new(), body).await;
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["type"], "message");
        assert!(json["text"].as_str().unwrap().contains("jane"));
        assert_eq!(rewards.all_recognitions().await.len(), 1);
    }
}
