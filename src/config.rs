use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("no endpoints configured")]
    NoEndpoints,
    #[error("endpoint #{0} has an empty name or address")]
    BlankEndpoint(usize),
    #[error("endpoint address {0} is configured more than once")]
    DuplicateAddress(String),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("{0} must not exceed {1}")]
    TooLarge(&'static str, u64),
}

const MAX_RETENTION_HOURS: u64 = 24 * 365 * 10;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MonitorConfig {
    pub endpoints: Vec<Endpoint>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
    /// Seconds between the end of one cycle and the start of the next.
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,
    #[serde(default = "default_retention_max_count")]
    pub retention_max_count: usize,
    #[serde(default = "default_graph_points")]
    pub graph_points: usize,
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    #[serde(default)]
    pub api_port: Option<u16>,
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
}

/// A monitored target. The address is its identity.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub name: String,
    pub address: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    /// Operator chat: transition alerts and unexpected errors go here.
    pub chat_id: i64,
    #[serde(default)]
    pub allowed_users: Vec<i64>,
}

fn default_port() -> u16 { 443 }
fn default_timeout() -> u64 { 5000 }
fn default_max_attempts() -> u32 { 1 }
fn default_retry_delay() -> u64 { 1000 }
fn default_check_interval() -> u64 { 60 }
fn default_retention_hours() -> u64 { 24 }
fn default_retention_max_count() -> usize { 10_000 }
fn default_graph_points() -> usize { 60 }
fn default_snapshot_path() -> PathBuf { PathBuf::from("data/state.json") }

impl MonitorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoints.is_empty() {
            return Err(ConfigError::NoEndpoints);
        }
        let mut seen = HashSet::new();
        for (i, endpoint) in self.endpoints.iter().enumerate() {
            if endpoint.name.trim().is_empty() || endpoint.address.trim().is_empty() {
                return Err(ConfigError::BlankEndpoint(i));
            }
            if !seen.insert(endpoint.address.as_str()) {
                return Err(ConfigError::DuplicateAddress(endpoint.address.clone()));
            }
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Zero("max_attempts"));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::Zero("timeout_ms"));
        }
        if self.check_interval == 0 {
            return Err(ConfigError::Zero("check_interval"));
        }
        if self.retention_max_count == 0 {
            return Err(ConfigError::Zero("retention_max_count"));
        }
        if self.retention_hours > MAX_RETENTION_HOURS {
            return Err(ConfigError::TooLarge("retention_hours", MAX_RETENTION_HOURS));
        }
        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::hours(self.retention_hours.min(MAX_RETENTION_HOURS) as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> MonitorConfig {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let config = parse(r#"{"endpoints": [{"name": "edge", "address": "10.0.0.1"}]}"#);
        assert_eq!(config.port, 443);
        assert_eq!(config.check_interval, 60);
        assert_eq!(config.retention_hours, 24);
        assert_eq!(config.retention_max_count, 10_000);
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.graph_points, 60);
        assert!(config.telegram.is_none());
        assert!(config.api_port.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn telegram_section_parses() {
        let config = parse(
            r#"{
                "endpoints": [{"name": "edge", "address": "10.0.0.1"}],
                "telegram": {"bot_token": "t", "chat_id": -100, "allowed_users": [1, 2]}
            }"#,
        );
        let telegram = config.telegram.unwrap();
        assert_eq!(telegram.chat_id, -100);
        assert_eq!(telegram.allowed_users, vec![1, 2]);
    }

    #[test]
    fn rejects_empty_endpoint_list() {
        let config = parse(r#"{"endpoints": []}"#);
        assert_eq!(config.validate(), Err(ConfigError::NoEndpoints));
    }

    #[test]
    fn rejects_duplicate_addresses() {
        let config = parse(
            r#"{"endpoints": [
                {"name": "a", "address": "10.0.0.1"},
                {"name": "b", "address": "10.0.0.1"}
            ]}"#,
        );
        assert_eq!(
            config.validate(),
            Err(ConfigError::DuplicateAddress("10.0.0.1".into()))
        );
    }

    #[test]
    fn rejects_zero_attempts() {
        let config = parse(
            r#"{"endpoints": [{"name": "a", "address": "h"}], "max_attempts": 0}"#,
        );
        assert_eq!(config.validate(), Err(ConfigError::Zero("max_attempts")));
    }

    #[test]
    fn rejects_blank_name() {
        let config = parse(r#"{"endpoints": [{"name": " ", "address": "h"}]}"#);
        assert_eq!(config.validate(), Err(ConfigError::BlankEndpoint(0)));
    }

    #[test]
    fn rejects_oversized_retention() {
        let config = parse(
            r#"{"endpoints": [{"name": "a", "address": "h"}], "retention_hours": 18446744073709551615}"#,
        );
        assert_eq!(
            config.validate(),
            Err(ConfigError::TooLarge("retention_hours", MAX_RETENTION_HOURS))
        );
        assert_eq!(config.retention(), chrono::Duration::hours(MAX_RETENTION_HOURS as i64));

        let config = parse(
            r#"{"endpoints": [{"name": "a", "address": "h"}], "retention_hours": 8760}"#,
        );
        assert_eq!(config.validate(), Ok(()));
    }
}
