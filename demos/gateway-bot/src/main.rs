//! Example bot running a single gateway session.
//!
//! Run with: GATEWAY_TOKEN=... GATEWAY_APPLICATION_ID=... cargo run -p gateway-bot -- --publish
//! See `--help` for the remaining settings.

mod commands;
mod settings;

use std::sync::Arc;

use clap::Parser;

use gateway_core::{SharedCache, UsageStats};
use gateway_rest::{CommandDeclaration, RequestPool, Responder, RestClient, RestConfig};
use gateway_session::{SessionClient, SessionConfig, run_session};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::{Banner, Help, SHIFT_ID, Shift};
use crate::settings::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let settings = Settings::parse();
    let shard = settings.shard()?;

    let rest = RestClient::new(RestConfig::new(
        settings.application_id.clone(),
        settings.token.clone(),
    ))?;
    let responder = Responder::new(rest.clone(), RequestPool::default());
    let cache = SharedCache::new(settings.cache_capacity);
    let stats = Arc::new(UsageStats::new());

    let mut session_config = SessionConfig::new(settings.token.clone());
    if let Some((id, total)) = shard {
        session_config = session_config.with_shard(id, total);
    }
    let mut client = SessionClient::new(session_config, rest).with_stats(Arc::clone(&stats));

    client
        .register(
            CommandDeclaration::slash("help", "How to use this bot"),
            Arc::new(Help {
                responder: responder.clone(),
            }),
            settings.publish,
        )
        .await;
    client
        .register(
            CommandDeclaration::slash("banner", "Post a rotating banner").with_option(json!({
                "type": 3,
                "name": "text",
                "description": "Banner text",
                "required": true
            })),
            Arc::new(Banner {
                responder: responder.clone(),
                template: Banner::template(),
            }),
            settings.publish,
        )
        .await;
    client
        .register(
            CommandDeclaration::component(SHIFT_ID),
            Arc::new(Shift { responder, cache }),
            settings.publish,
        )
        .await;
    tracing::info!(commands = client.registry().len(), "Commands registered");

    let stats_cancel = CancellationToken::new();
    let drain = Arc::clone(&stats).spawn_daily_drain(stats_cancel.clone());

    let shutdown = client.shutdown_token();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for interrupt: {e}");
            return;
        }
        tracing::info!("Interrupt received, shutting down");
        shutdown.cancel();
    });

    let result = run_session(&client).await;

    stats_cancel.cancel();
    if let Err(e) = drain.await {
        tracing::warn!("Usage drain task failed: {e}");
    }
    let report = stats.drain();
    if !report.is_empty() {
        tracing::info!(total = report.total(), "Usage since last drain: {report}");
    }

    result?;
    Ok(())
}
