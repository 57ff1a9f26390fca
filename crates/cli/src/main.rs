//! Everclaw daemon: webhook ingest + heartbeat scheduler.
//!
//! Configuration comes entirely from the environment (see
//! `everclaw-config`). The daemon wires the provider, the channel
//! handlers, and the runtime, registers webhooks, spawns the heartbeat
//! cron, and serves ingest until killed.

use everclaw_channels::{SlackChannel, SlackConfig, TelegramChannel, TelegramConfig};
use everclaw_config::Config;
use everclaw_core::channel::ChannelRegistry;
use everclaw_durable::{CancelSignal, CronSchedule, RunContext};
use everclaw_runtime::{ingest, Runtime};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    info!(?config, "Everclaw starting");

    let provider = everclaw_providers::provider_from_config(&config)?;

    let mut channels = ChannelRegistry::new();
    if let Some(token) = &config.telegram_bot_token {
        channels.register(Arc::new(TelegramChannel::new(TelegramConfig {
            bot_token: token.clone(),
            webhook_url: None,
        })));
    }
    if let Some(token) = &config.slack_bot_token {
        channels.register(Arc::new(SlackChannel::new(SlackConfig {
            bot_token: token.clone(),
        })));
    }
    if channels.is_empty() {
        warn!("No channel tokens configured — ingest will reject all webhooks");
    }

    let rt = Arc::new(Runtime::new(config, provider, channels));

    if let Err(e) = rt.channels.setup_all().await {
        warn!(error = %e, "Channel setup failed (continuing)");
    }

    // Heartbeat cron: each firing is its own durable run
    let schedule = CronSchedule::parse(&rt.config.heartbeat_cron)
        .map_err(|e| format!("HEARTBEAT_CRON: {e}"))?;
    info!(cron = %rt.config.heartbeat_cron, "Heartbeat scheduled");
    let rt_hb = rt.clone();
    let _heartbeat_task = schedule.spawn(move || {
        let rt = rt_hb.clone();
        async move {
            let run_id = format!("heartbeat-{}", chrono::Utc::now().timestamp());
            let ctx = RunContext::new(&rt.steps_dir, &run_id, CancelSignal::none())?;
            rt.heartbeat.tick(&ctx).await.map(|_| ())
        }
    });

    ingest::serve(rt).await?;
    Ok(())
}
