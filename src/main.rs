mod command;
mod config;
mod dispatch;
mod error;
mod insights;
mod platform;
mod rewards;
mod security;
mod server;
mod workflow;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::insights::InsightsClient;
use crate::platform::slack::{SlackAdapter, SlackWebApi};
use crate::platform::teams::TeamsAdapter;
use crate::platform::{NoopNotifier, Notifier};
use crate::rewards::{HttpRewardsApi, MockRewardsApi, RewardsApi};
use crate::server::AppState;
use crate::workflow::WorkflowService;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,rewardbot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!(
        "  Slack verification: {}",
        if config.slack.verification_enabled() {
            "enabled"
        } else {
            "MOCK (bypassed)"
        }
    );
    info!(
        "  RewardStation: {}",
        if config.rewardstation.enable_mock {
            "in-memory mock"
        } else {
            config.rewardstation.api_base.as_str()
        }
    );
    info!(
        "  Maslow Insights: {}",
        if config.insights.enabled {
            config.insights.base_url.as_str()
        } else {
            "local fallbacks"
        }
    );
    info!(
        "  Workflow orchestration: {}",
        if config.workflow.enabled {
            config.workflow.base_url.as_str()
        } else {
            "mock"
        }
    );

    let rewards: Arc<dyn RewardsApi> = if config.rewardstation.enable_mock {
        Arc::new(MockRewardsApi::new())
    } else {
        Arc::new(HttpRewardsApi::new(&config.rewardstation))
    };

    let notifier: Arc<dyn Notifier> = if config.slack.has_real_bot_token() {
        Arc::new(SlackWebApi::new(config.slack.bot_token.clone()))
    } else {
        Arc::new(NoopNotifier)
    };

    let dispatcher = Arc::new(Dispatcher::new(
        rewards,
        Arc::new(InsightsClient::new(&config.insights)),
        Arc::new(WorkflowService::new(&config.workflow)),
        notifier,
    ));

    let state = AppState {
        slack: Arc::new(SlackAdapter::new(config.slack.clone())),
        teams: Arc::new(TeamsAdapter::new(config.teams.clone())),
        dispatcher,
    };

    let app = server::router(state);
    let addr = format!("0.0.0.0:{}", config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("rewardbot listening on {addr}");
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
