//! Command dispatcher.
//!
//! Routes a parsed [`InboundCommand`] to its verb handler and returns a
//! platform-neutral response. Handlers must answer within the chat
//! platform's synchronous budget: anything slower (recipient DMs, workflow
//! hand-off) runs as a detached task whose failure is logged and ignored,
//! and every AI call degrades to a local fallback.

use std::sync::Arc;
use std::time::Duration;

use futures::future::try_join;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::command::{GiveSubmission, InboundCommand, ParseError, Platform, Verb};
use crate::error::GatewayError;
use crate::insights::{EnhanceContext, InsightsClient, FALLBACK_HELP};
use crate::platform::{slack, Notifier, PlatformResponse};
use crate::rewards::{RecognitionRequest, RewardsApi, THANKS_POINTS};
use crate::security;
use crate::workflow::WorkflowService;

/// Budget for opening the interactive modal before falling back inline.
const MODAL_OPEN_BUDGET: Duration = Duration::from_secs(2);

pub struct Dispatcher {
    rewards: Arc<dyn RewardsApi>,
    insights: Arc<InsightsClient>,
    workflow: Arc<WorkflowService>,
    notifier: Arc<dyn Notifier>,
}

/// Response for a verb nobody recognizes.
pub fn unknown_command_response(verb: &str) -> PlatformResponse {
    PlatformResponse::ephemeral(GatewayError::UnknownCommand(verb.to_string()).user_message())
}

impl Dispatcher {
    pub fn new(
        rewards: Arc<dyn RewardsApi>,
        insights: Arc<InsightsClient>,
        workflow: Arc<WorkflowService>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            rewards,
            insights,
            workflow,
            notifier,
        }
    }

    pub async fn dispatch(&self, command: &InboundCommand) -> PlatformResponse {
        info!(
            platform = command.platform.as_str(),
            verb = command.verb.as_str(),
            user = %security::mask_id(&command.actor_id),
            "dispatching command"
        );

        match command.verb {
            Verb::Help => self.handle_help(command).await,
            Verb::Thanks => self.handle_thanks(command).await,
            Verb::Give => self.handle_give(command).await,
            Verb::Balance => self.handle_balance(command).await,
        }
    }

    /// Help is always answerable: the AI collaborator is consulted
    /// best-effort, and any failure lands on the fixed text.
    async fn handle_help(&self, command: &InboundCommand) -> PlatformResponse {
        match self
            .insights
            .help(command.platform.as_str(), &command.actor_id)
            .await
        {
            Some(content) => {
                let mut response = PlatformResponse::ephemeral(content.response_text.clone());
                if command.platform == Platform::Slack {
                    response = response.with_blocks(slack::help_blocks(&content));
                }
                response
            }
            None => PlatformResponse::ephemeral(FALLBACK_HELP),
        }
    }

    async fn handle_thanks(&self, command: &InboundCommand) -> PlatformResponse {
        let Some(recipient_id) = command.target_mention.clone() else {
            return PlatformResponse::ephemeral(ParseError::MissingRecipient.user_message());
        };
        let message = security::sanitize_message(&command.free_text, security::MAX_MESSAGE_LEN);
        if message.is_empty() {
            return PlatformResponse::ephemeral(ParseError::MissingMessage.user_message());
        }

        // Both parties must resolve upstream before anything is created.
        let recipient_record = match try_join(
            self.rewards.lookup_user(command.platform, &command.actor_id),
            self.rewards.lookup_user(command.platform, &recipient_id),
        )
        .await
        {
            Ok((_, recipient)) => recipient,
            Err(e) => {
                warn!("thanks aborted: user lookup failed");
                return PlatformResponse::ephemeral(e.user_message());
            }
        };

        let original_command = format!("/thanks @{recipient_id}");
        let request = RecognitionRequest::thanks(
            &command.actor_id,
            &recipient_id,
            &message,
            command.platform,
            &command.channel_id,
            &original_command,
        );

        match self.rewards.create_recognition(&request).await {
            Ok(receipt) => {
                security::log_recognition(
                    command.platform,
                    &command.actor_id,
                    &recipient_id,
                    request.points,
                    false,
                    message.len(),
                );
                info!(recognition = %receipt.recognition_id, "thanks recognition created");

                // Best-effort recipient DM; a failure here (DMs disabled,
                // token missing) must not surface to the requester.
                let notifier = self.notifier.clone();
                let actor_id = command.actor_id.clone();
                let dm_recipient = recipient_id.clone();
                let dm_name = recipient_record.display_name.clone();
                let dm_message = message.clone();
                tokio::spawn(async move {
                    let text = format!(
                        "🎉 {dm_name}, you received thanks from <@{actor_id}>!\n\n💝 _\"{dm_message}\"_\n\n✨ Keep up the great work!"
                    );
                    if let Err(e) = notifier.notify_user(&dm_recipient, &text).await {
                        warn!(error = %e, "could not notify thanks recipient");
                    }
                });

                // Deferred ephemeral confirmation to the requester, through
                // the platform's callback mechanism when one was provided.
                if let Some(callback_url) = command.response_callback_url.clone() {
                    let notifier = self.notifier.clone();
                    let confirmation = format!("✅ Thanks sent to <@{recipient_id}>! 🎉");
                    tokio::spawn(async move {
                        if let Err(e) =
                            notifier.respond_ephemeral(&callback_url, &confirmation).await
                        {
                            warn!(error = %e, "could not deliver thanks confirmation");
                        }
                    });
                }

                let celebration = format!(
                    "🎉 <@{}> thanked <@{recipient_id}> with {THANKS_POINTS} points!\n💬 \"{message}\"",
                    command.actor_id
                );
                let mut response = PlatformResponse::in_channel(celebration);
                if command.platform == Platform::Slack {
                    response = response.with_blocks(slack::thanks_celebration_blocks(
                        &command.actor_id,
                        &recipient_id,
                        &message,
                    ));
                }
                response
            }
            Err(e) => {
                error!("thanks recognition creation failed");
                PlatformResponse::ephemeral(e.user_message())
            }
        }
    }

    /// `/give` never completes in one round trip: it opens the modal when
    /// possible and otherwise answers with the inline form.
    async fn handle_give(&self, command: &InboundCommand) -> PlatformResponse {
        if let Some(trigger_id) = &command.trigger_id {
            match timeout(MODAL_OPEN_BUDGET, self.notifier.open_give_form(trigger_id)).await {
                Ok(Ok(())) => {
                    return PlatformResponse::ephemeral("Opening the recognition form…");
                }
                Ok(Err(e)) => info!(error = %e, "modal open failed, using inline form"),
                Err(_) => warn!("modal open exceeded its budget, using inline form"),
            }
        }

        let mut response =
            PlatformResponse::ephemeral("🎁 *Give Recognition*: fill in the form below.");
        if command.platform == Platform::Slack {
            response = response.with_blocks(slack::give_form_blocks());
        }
        response
    }

    async fn handle_balance(&self, command: &InboundCommand) -> PlatformResponse {
        let user = match self
            .rewards
            .lookup_user(command.platform, &command.actor_id)
            .await
        {
            Ok(user) => user,
            Err(e) => return PlatformResponse::ephemeral(e.user_message()),
        };

        match self.rewards.get_balance(&user.employee_id).await {
            Ok(balance) => PlatformResponse::ephemeral(format!(
                "💰 Your current balance: *{} points*\n\n💡 Keep giving recognition to earn more!",
                balance.balance
            )),
            Err(e) => PlatformResponse::ephemeral(e.user_message()),
        }
    }

    /// Handle a submitted give form. Validation happens here, before
    /// anything reaches the upstream client.
    pub async fn handle_give_submission(&self, submission: &GiveSubmission) -> PlatformResponse {
        let Some(recipient_id) = security::sanitize_user_mention(&submission.recipient_id) else {
            return PlatformResponse::ephemeral(
                GatewayError::Validation { field: "recipient" }.user_message(),
            );
        };
        let Some(points) = security::validate_points(submission.points) else {
            return PlatformResponse::ephemeral(format!(
                "Points must be a whole number between 0 and {}.",
                security::MAX_POINTS
            ));
        };
        let message = security::sanitize_message(&submission.message, security::MAX_MESSAGE_LEN);
        if message.is_empty() {
            return PlatformResponse::ephemeral(
                GatewayError::Validation {
                    field: "recognition message",
                }
                .user_message(),
            );
        }

        if let Err(e) = try_join(
            self.rewards.lookup_user(submission.platform, &submission.actor_id),
            self.rewards.lookup_user(submission.platform, &recipient_id),
        )
        .await
        {
            warn!("give aborted: user lookup failed");
            return PlatformResponse::ephemeral(e.user_message());
        }

        // Best-effort enhancement: on timeout or error the original message
        // goes through unchanged.
        let context = EnhanceContext {
            recipient_name: Some(recipient_id.clone()),
            points: Some(points),
            behaviors: submission.behavior_tags.clone(),
        };
        let (message, ai_enhanced) = self.insights.enhance_message(&message, &context).await;

        let behavior_tags = if submission.behavior_tags.is_empty() {
            self.insights.suggest_behaviors(&message).await
        } else {
            submission.behavior_tags.clone()
        };

        let request = RecognitionRequest::points(
            &submission.actor_id,
            &recipient_id,
            points,
            &message,
            behavior_tags,
            submission.platform,
            &submission.channel_id,
            ai_enhanced,
        );

        match self.rewards.create_recognition(&request).await {
            Ok(receipt) => {
                security::log_recognition(
                    submission.platform,
                    &submission.actor_id,
                    &recipient_id,
                    request.points,
                    ai_enhanced,
                    message.len(),
                );

                // Detached workflow hand-off; orchestration must not block
                // or fail the acknowledgment.
                let workflow = self.workflow.clone();
                let handed_off = request.clone();
                tokio::spawn(async move {
                    let outcome = workflow.start_recognition_workflow(&handed_off).await;
                    info!(
                        workflow = %outcome.workflow_id,
                        status = %outcome.status,
                        "workflow hand-off complete"
                    );
                });

                let status_line = if receipt.approval_required {
                    "⏳ Pending approval"
                } else {
                    "🎉 Delivered"
                };
                let notice = PlatformResponse::in_channel(format!(
                    "🌟 <@{}> recognized <@{recipient_id}> with {points} points!\n💬 \"{message}\"\n{status_line}",
                    submission.actor_id
                ));

                // Modal submissions have no synchronous response surface, so
                // the public notice goes out through the notifier. Without a
                // channel context it lands as a DM to the actor.
                let target = if submission.channel_id.is_empty() {
                    submission.actor_id.clone()
                } else {
                    submission.channel_id.clone()
                };
                let notifier = self.notifier.clone();
                let outgoing = notice.clone();
                tokio::spawn(async move {
                    if let Err(e) = notifier.post_to_channel(&target, &outgoing).await {
                        warn!(error = %e, "could not announce give completion");
                    }
                });

                notice
            }
            Err(e) => {
                error!("give recognition creation failed");
                PlatformResponse::ephemeral(e.user_message())
            }
        }
    }
}
