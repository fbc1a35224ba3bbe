//! Server configuration.
//!
//! Loading flow:
//! 1. Start with [`ServerConfig::default()`]
//! 2. If a JSON config file is given and exists, deep-merge its values over the defaults
//! 3. Apply `RELAY_*` environment variable overrides (highest priority)

use std::path::Path;
use std::time::Duration;

use relay_core::DEFAULT_PORT;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration for the harness server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind. `0` picks a free port.
    pub port: u16,
    /// Outbound frames buffered per connection before new ones are dropped.
    pub max_send_queue: usize,
    /// Seconds between WebSocket pings.
    pub heartbeat_interval_secs: u64,
    /// Seconds to wait for in-flight requests before sockets are dropped.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: DEFAULT_PORT,
            max_send_queue: 256,
            heartbeat_interval_secs: 30,
            shutdown_timeout_secs: 5,
        }
    }
}

impl ServerConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Load config from an optional JSON file, then apply env overrides.
///
/// A missing file yields defaults. A file with invalid JSON is an error.
pub fn load_config(path: Option<&Path>) -> Result<ServerConfig, ConfigError> {
    let defaults = serde_json::to_value(ServerConfig::default())?;

    let merged = match path {
        Some(path) if path.exists() => {
            debug!(?path, "loading config from file");
            let content = std::fs::read_to_string(path)?;
            let user: Value = serde_json::from_str(&content)?;
            deep_merge(defaults, user)
        }
        Some(path) => {
            debug!(?path, "config file not found, using defaults");
            defaults
        }
        None => defaults,
    };

    let mut config: ServerConfig = serde_json::from_value(merged)?;
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Recursive merge: objects merge per key, everything else is replaced.
/// Nulls in `source` keep the `target` value.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

pub fn apply_env_overrides(config: &mut ServerConfig) {
    apply_overrides(config, |key| std::env::var(key).ok());
}

/// Apply overrides read through `lookup`. Values that fail to parse or are out
/// of range are ignored.
pub fn apply_overrides(config: &mut ServerConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = read_string(&lookup, "RELAY_HOST") {
        config.host = v;
    }
    if let Some(v) = read_u64(&lookup, "RELAY_PORT", 0, u64::from(u16::MAX)) {
        config.port = u16::try_from(v).unwrap_or(config.port);
    }
    if let Some(v) = read_u64(&lookup, "RELAY_MAX_SEND_QUEUE", 1, 1_000_000) {
        config.max_send_queue = usize::try_from(v).unwrap_or(config.max_send_queue);
    }
    if let Some(v) = read_u64(&lookup, "RELAY_HEARTBEAT_INTERVAL", 1, 3600) {
        config.heartbeat_interval_secs = v;
    }
    if let Some(v) = read_u64(&lookup, "RELAY_SHUTDOWN_TIMEOUT", 0, 600) {
        config.shutdown_timeout_secs = v;
    }
}

fn read_string(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn read_u64(lookup: &impl Fn(&str) -> Option<String>, key: &str, min: u64, max: u64) -> Option<u64> {
    read_string(lookup, key)?
        .parse::<u64>()
        .ok()
        .filter(|v| (min..=max).contains(v))
}
