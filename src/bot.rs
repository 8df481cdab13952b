use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::{Endpoint, MonitorConfig};
use crate::models::{format_response_time, CurrentStatus, Observation};
use crate::notify::{ChatId, Notifier};
use crate::reducer::{reduce, step_strip, to_csv};
use crate::stats::{format_availability, stats};
use crate::store::SharedStore;
use crate::telegram::{InlineButton, TelegramClient};
use crate::utils::{latest_log_file, tail};

const GRAPH_RANGES: &[&str] = &["1h", "6h", "12h", "24h"];
const MAX_GRAPH_DAYS: i64 = 7;
const LOG_TAIL_LINES: usize = 30;
const MAX_MESSAGE_CHARS: usize = 4000;

const REJECTED: &str = "Access denied. This is a private bot.";
const UNEXPECTED_ERROR: &str = "Unexpected error while handling a command, check the logs!";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Status,
    Stats,
    Graph(Option<String>),
    Log,
    Other,
}

impl Command {
    pub fn parse(text: &str) -> Self {
        let mut parts = text.split_whitespace();
        let Some(head) = parts.next() else {
            return Command::Other;
        };
        // "/status@my_bot" in group chats.
        let name = head.split('@').next().unwrap_or(head);
        match name {
            "/start" => Command::Start,
            "/help" => Command::Help,
            "/status" => Command::Status,
            "/stats" => Command::Stats,
            "/graph" => Command::Graph(parts.next().map(str::to_string)),
            "/log" => Command::Log,
            _ => Command::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Export {
    pub file_name: String,
    pub caption: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Text(String),
    Keyboard { text: String, buttons: Vec<InlineButton> },
    Graph { text: String, exports: Vec<Export> },
}

/// Parses "90m", "6h", "2d". Bare numbers are hours.
pub fn parse_range(s: &str) -> Option<Duration> {
    let s = s.trim().to_ascii_lowercase();
    let (digits, unit) = match s.char_indices().find(|(_, c)| !c.is_ascii_digit()) {
        Some((i, _)) => s.split_at(i),
        None => (s.as_str(), "h"),
    };
    let n: i64 = digits.parse().ok().filter(|n| *n > 0)?;
    let range = match unit {
        "m" | "min" => Duration::try_minutes(n)?,
        "h" => Duration::try_hours(n)?,
        "d" => Duration::try_days(n)?,
        _ => return None,
    };
    (range <= Duration::days(MAX_GRAPH_DAYS)).then_some(range)
}

pub struct CommandHandler {
    config: Arc<MonitorConfig>,
    store: SharedStore,
    allowed: HashSet<ChatId>,
    log_dir: Option<PathBuf>,
}

impl CommandHandler {
    pub fn new(config: Arc<MonitorConfig>, store: SharedStore) -> Self {
        let allowed = config
            .telegram
            .as_ref()
            .map(|t| t.allowed_users.iter().copied().collect())
            .unwrap_or_default();
        let log_dir = config.log_dir.clone();
        Self { config, store, allowed, log_dir }
    }

    pub fn is_allowed(&self, chat: ChatId) -> bool {
        self.allowed.contains(&chat)
    }

    pub async fn handle_text(&self, chat: ChatId, text: &str) -> Result<Reply> {
        let command = Command::parse(text);
        if !self.is_allowed(chat) {
            debug!(chat, ?command, "rejected command from unknown chat");
            return Ok(Reply::Text(match command {
                Command::Start => format!("{}\n\nYour ID: {}", REJECTED, chat),
                _ => REJECTED.to_string(),
            }));
        }

        match command {
            Command::Start => Ok(Reply::Text("Hi! I'm online and watching your servers.".into())),
            Command::Help => Ok(Reply::Text(help_text())),
            Command::Status => Ok(Reply::Text(self.status_report().await)),
            Command::Stats => Ok(Reply::Text(self.stats_report().await)),
            Command::Graph(None) => Ok(graph_keyboard()),
            Command::Graph(Some(range)) => Ok(self.graph_reply(&range).await),
            Command::Log => self.log_reply().await,
            Command::Other => Ok(Reply::Text("I only handle commands, see /help".into())),
        }
    }

    pub async fn handle_callback(&self, chat: ChatId, data: &str) -> Result<Reply> {
        if !self.is_allowed(chat) {
            return Ok(Reply::Text(REJECTED.to_string()));
        }
        match data.strip_prefix("graph:") {
            Some(range) => Ok(self.graph_reply(range).await),
            None => Ok(Reply::Text(format!("Unknown action: {}", data))),
        }
    }

    async fn statuses(&self) -> Vec<(Endpoint, CurrentStatus)> {
        let store = self.store.read().await;
        store
            .endpoints()
            .iter()
            .map(|e| (e.clone(), store.current_status(&e.address).unwrap_or_default()))
            .collect()
    }

    async fn histories(&self, since: chrono::DateTime<Utc>) -> Vec<(Endpoint, Vec<Observation>)> {
        let store = self.store.read().await;
        store
            .endpoints()
            .iter()
            .map(|e| (e.clone(), store.series_in_window(&e.address, since)))
            .collect()
    }

    pub async fn status_report(&self) -> String {
        let mut message = String::from("Current server status:\n\n");
        for (endpoint, status) in self.statuses().await {
            let state = if status.available { "✅ Available" } else { "❌ Unavailable" };
            message.push_str(&format!(
                "{} ({}): {} ({})\n",
                endpoint.name,
                endpoint.address,
                state,
                format_response_time(status.response_time_ms)
            ));
        }
        message
    }

    pub async fn stats_report(&self) -> String {
        let window = Duration::hours(24);
        let now = Utc::now();
        let mut message = String::from("Availability over the last 24 hours:\n\n");
        for (endpoint, series) in self.histories(now - window).await {
            let s = stats(&series, window, now);
            message.push_str(&format!(
                "{} ({}): {}\nChecks: {}, ok: {}, failed: {}\n\n",
                endpoint.name,
                endpoint.address,
                format_availability(s.availability_pct),
                s.total,
                s.successful,
                s.failed
            ));
        }
        message
    }

    async fn graph_reply(&self, range: &str) -> Reply {
        let now = Utc::now();
        let Some((window, since)) =
            parse_range(range).and_then(|w| now.checked_sub_signed(w).map(|since| (w, since)))
        else {
            return Reply::Text(format!(
                "Unknown range '{}'. Try one of: {} (at most {} days)",
                range,
                GRAPH_RANGES.join(", "),
                MAX_GRAPH_DAYS
            ));
        };

        let mut text = format!("Availability for the last {}:\n", range);
        let mut exports = Vec::new();
        for (endpoint, series) in self.histories(since).await {
            let points = reduce(&series, window, self.config.graph_points, now);
            text.push_str(&format!("\n{} ({})\n{}\n", endpoint.name, endpoint.address, step_strip(&points)));
            exports.push(Export {
                file_name: format!("{}-{}.csv", endpoint.name, range),
                caption: format!("{} ({}), last {}", endpoint.name, endpoint.address, range),
                body: to_csv(&points),
            });
        }
        Reply::Graph { text, exports }
    }

    async fn log_reply(&self) -> Result<Reply> {
        let Some(dir) = &self.log_dir else {
            return Ok(Reply::Text("File logging is not enabled.".into()));
        };
        let Some(path) = latest_log_file(dir)
            .await
            .with_context(|| format!("Failed to list log directory {}", dir.display()))?
        else {
            return Ok(Reply::Text("No log files yet.".into()));
        };
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let body = tail(&content, LOG_TAIL_LINES, MAX_MESSAGE_CHARS);
        Ok(Reply::Text(if body.is_empty() { "Log is empty.".into() } else { body }))
    }
}

fn help_text() -> String {
    [
        "/status - current availability of every server",
        "/stats - checks and availability for the last 24 hours",
        "/graph [range] - availability graph, e.g. /graph 6h",
        "/log - latest log lines",
        "/help - this message",
    ]
    .join("\n")
}

fn graph_keyboard() -> Reply {
    Reply::Keyboard {
        text: "Choose a time range:".into(),
        buttons: GRAPH_RANGES
            .iter()
            .map(|r| InlineButton { text: r.to_string(), callback_data: format!("graph:{}", r) })
            .collect(),
    }
}

async fn deliver(client: &TelegramClient, chat: ChatId, reply: Reply) -> Result<()> {
    match reply {
        Reply::Text(text) => client.send_text(chat, &text, false).await?,
        Reply::Keyboard { text, buttons } => client.send_keyboard(chat, &text, &buttons).await?,
        Reply::Graph { text, exports } => {
            client.send_text(chat, &text, false).await?;
            for export in exports {
                client
                    .send_document(chat, &export.file_name, export.body.into_bytes(), &export.caption)
                    .await?;
            }
        }
    }
    Ok(())
}

/// A failure while handling one update is reported to the operator and the
/// update is dropped.
pub async fn run_polling(client: TelegramClient, handler: Arc<CommandHandler>, operator: ChatId) {
    info!(allowed = handler.allowed.len(), "telegram command polling started");
    let mut offset = 0;

    loop {
        let updates = match client.get_updates(offset).await {
            Ok(updates) => updates,
            Err(e) => {
                warn!(error = %e, "getUpdates failed, retrying");
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                continue;
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);

            let outcome = if let Some(message) = update.message {
                let chat = message.chat.id;
                let text = message.text.unwrap_or_default();
                match handler.handle_text(chat, &text).await {
                    Ok(reply) => deliver(&client, chat, reply).await,
                    Err(e) => Err(e),
                }
            } else if let Some(callback) = update.callback_query {
                if let Err(e) = client.answer_callback(&callback.id).await {
                    debug!(error = %e, "answerCallbackQuery failed");
                }
                match (callback.message, callback.data) {
                    (Some(message), Some(data)) => {
                        let chat = message.chat.id;
                        match handler.handle_callback(chat, &data).await {
                            Ok(reply) => deliver(&client, chat, reply).await,
                            Err(e) => Err(e),
                        }
                    }
                    _ => Ok(()),
                }
            } else {
                Ok(())
            };

            if let Err(e) = outcome {
                error!(update_id = update.update_id, error = %e, "command handling failed");
                if let Err(e) = client.send_text(operator, UNEXPECTED_ERROR, false).await {
                    warn!(error = %e, "failed to notify operator");
                }
            }
        }
    }
}
