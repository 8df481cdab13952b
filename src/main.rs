use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

mod api;
mod bot;
mod config;
mod engine;
mod models;
mod notify;
mod persistence;
mod probe;
mod reducer;
mod stats;
mod store;
mod telegram;
mod utils;

use crate::bot::CommandHandler;
use crate::config::MonitorConfig;
use crate::engine::Monitor;
use crate::notify::{LogNotifier, Notifier};
use crate::persistence::SnapshotFile;
use crate::store::{HealthStore, RetentionPolicy, SharedStore};
use crate::telegram::TelegramClient;

const BOT_TOKEN_ENV: &str = "PORTWATCH_BOT_TOKEN";
const CONFIG_ENV: &str = "PORTWATCH_CONFIG";

fn load_config() -> Result<MonitorConfig> {
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_ENV).ok())
        .unwrap_or_else(|| "config.json".to_string());
    let config_content = std::fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read {}", config_path))?;
    let mut config: MonitorConfig = serde_json::from_str(&config_content)
        .with_context(|| format!("Failed to parse {}", config_path))?;

    if let Ok(token) = std::env::var(BOT_TOKEN_ENV) {
        config.telegram.get_or_insert_with(Default::default).bot_token = token;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Arc::new(load_config()?);
    utils::init_logging(config.log_dir.as_deref())?;

    let snapshots = SnapshotFile::new(config.snapshot_path.clone());
    let snapshot = snapshots.load().await;
    let policy = RetentionPolicy {
        max_count: config.retention_max_count,
        max_age: config.retention(),
    };
    let store: SharedStore = Arc::new(RwLock::new(HealthStore::restore(
        config.endpoints.clone(),
        policy,
        snapshot,
    )));
    info!(endpoints = config.endpoints.len(), snapshot = %snapshots.path().display(), "state restored");

    let telegram = match config.telegram.as_ref().filter(|t| !t.bot_token.is_empty()) {
        Some(t) => Some((TelegramClient::new(&t.bot_token).context("Failed to build Telegram client")?, t.chat_id)),
        None => {
            warn!("no Telegram bot token configured, alerts go to the log only");
            None
        }
    };

    let (notifier, alert_chat) = match &telegram {
        Some((client, chat_id)) => (Arc::new(client.clone()) as Arc<dyn Notifier>, *chat_id),
        None => (Arc::new(LogNotifier) as Arc<dyn Notifier>, 0),
    };

    if let Some(port) = config.api_port {
        let state = api::ApiState { config: config.clone(), store: store.clone() };
        tokio::spawn(async move {
            if let Err(e) = api::start_server(port, state).await {
                error!(port, error = %e, "HTTP API stopped");
            }
        });
    }

    if let Some((client, operator)) = telegram {
        let handler = Arc::new(CommandHandler::new(config.clone(), store.clone()));
        tokio::spawn(bot::run_polling(client, handler, operator));
    }

    let monitor = Arc::new(Monitor::new(config.clone(), store, snapshots, notifier, alert_chat));
    tokio::spawn(async move {
        if let Err(e) = monitor.run().await {
            error!("Monitor engine failed: {}", e);
        }
    });

    signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping portwatch");

    Ok(())
}
