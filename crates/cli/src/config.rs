// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Client configuration management.
//!
//! Configuration is stored in `consult.toml` inside the state directory,
//! next to the pending message database. Every field has a default, so a
//! file only needs the gateway URL and the sender identity.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use consult_core::SenderRole;

use crate::error::{Error, Result};

const STATE_DIR_NAME: &str = "consult";
pub(crate) const CONFIG_FILE_NAME: &str = "consult.toml";
const DB_FILE_NAME: &str = "pending.db";

/// Client configuration stored in `consult.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub connectivity: ConnectivityConfig,
}

/// Remote chat gateway settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Base URL of the REST API (e.g. `https://example.supabase.co/rest/v1`).
    #[serde(default = "default_gateway_url")]
    pub url: String,
    /// Project API key, sent as the `apikey` header.
    #[serde(default)]
    pub api_key: String,
    /// Table holding consultation messages.
    #[serde(default = "default_table")]
    pub table: String,
    /// Upper bound for a single gateway request.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Send the client id with each row so the gateway can echo it back.
    /// Only for tables that have a `client_id` column.
    #[serde(default)]
    pub send_client_id: bool,
    /// `sender_type` written for reporters.
    #[serde(default = "default_reporter_type")]
    pub reporter_type: String,
    /// `sender_type` written for specialists.
    #[serde(default = "default_specialist_type")]
    pub specialist_type: String,
}

fn default_gateway_url() -> String {
    "https://example.supabase.co/rest/v1".to_string()
}

fn default_table() -> String {
    "consultation_messages".to_string()
}

fn default_request_timeout_ms() -> u64 {
    15_000
}

fn default_reporter_type() -> String {
    "farmer".to_string()
}

fn default_specialist_type() -> String {
    "vet".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            url: default_gateway_url(),
            api_key: String::new(),
            table: default_table(),
            request_timeout_ms: default_request_timeout_ms(),
            send_client_id: false,
            reporter_type: default_reporter_type(),
            specialist_type: default_specialist_type(),
        }
    }
}

impl GatewayConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Who this device sends as.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default)]
    pub sender_id: String,
    #[serde(default = "default_sender_role")]
    pub sender_role: SenderRole,
}

fn default_sender_role() -> SenderRole {
    SenderRole::Reporter
}

impl Default for IdentityConfig {
    fn default() -> Self {
        IdentityConfig {
            sender_id: String::new(),
            sender_role: default_sender_role(),
        }
    }
}

/// Polling, retry and dedup settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Poll loop period (default: 10).
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Periodic flush period (default: 30).
    #[serde(default = "default_retry_interval_secs")]
    pub retry_interval_secs: u64,
    /// Backoff after the first failure (default: 5).
    #[serde(default = "default_backoff_initial_secs")]
    pub backoff_initial_secs: u64,
    /// Backoff ceiling (default: 300).
    #[serde(default = "default_backoff_max_secs")]
    pub backoff_max_secs: u64,
    /// Attempts before an entry is parked. 0 = unlimited.
    #[serde(default)]
    pub max_attempts: u32,
    /// How far a gateway timestamp may drift from the local creation time
    /// and still identify the same message (default: 120).
    #[serde(default = "default_dedup_tolerance_secs")]
    pub dedup_tolerance_secs: u64,
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_retry_interval_secs() -> u64 {
    30
}

fn default_backoff_initial_secs() -> u64 {
    5
}

fn default_backoff_max_secs() -> u64 {
    300
}

fn default_dedup_tolerance_secs() -> u64 {
    120
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            poll_interval_secs: default_poll_interval_secs(),
            retry_interval_secs: default_retry_interval_secs(),
            backoff_initial_secs: default_backoff_initial_secs(),
            backoff_max_secs: default_backoff_max_secs(),
            max_attempts: 0,
            dedup_tolerance_secs: default_dedup_tolerance_secs(),
        }
    }
}

/// Reachability probing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectivityConfig {
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// `host:port` to probe. Defaults to the gateway host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_addr: Option<String>,
}

fn default_probe_interval_secs() -> u64 {
    5
}

fn default_probe_timeout_ms() -> u64 {
    3_000
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        ConnectivityConfig {
            probe_interval_secs: default_probe_interval_secs(),
            probe_timeout_ms: default_probe_timeout_ms(),
            probe_addr: None,
        }
    }
}

impl Config {
    /// Creates a config for the given gateway and identity.
    pub fn new(url: &str, sender_id: &str, sender_role: SenderRole) -> Result<Self> {
        let config = Config {
            gateway: GatewayConfig {
                url: url.trim_end_matches('/').to_string(),
                ..GatewayConfig::default()
            },
            identity: IdentityConfig {
                sender_id: sender_id.to_string(),
                sender_role,
            },
            ..Config::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from the given state directory.
    pub fn load(state_dir: &Path) -> Result<Self> {
        let config_path = state_dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Err(Error::NotInitialized);
        }
        let content = fs::read_to_string(&config_path)
            .map_err(|e| Error::Config(format!("failed to read config: {}", e)))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Saves configuration to the given state directory.
    pub fn save(&self, state_dir: &Path) -> Result<()> {
        let config_path = state_dir.join(CONFIG_FILE_NAME);
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("failed to serialize config: {}", e)))?;
        fs::write(&config_path, content)?;
        Ok(())
    }

    /// Rejects zero intervals and an unusable gateway URL.
    pub fn validate(&self) -> Result<()> {
        let url = reqwest::Url::parse(&self.gateway.url)
            .map_err(|e| Error::Config(format!("invalid gateway url '{}': {}", self.gateway.url, e)))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(Error::Config(format!(
                "invalid gateway url '{}': must be http:// or https:// with a host",
                self.gateway.url
            )));
        }
        if self.gateway.table.trim().is_empty() {
            return Err(Error::Config("gateway.table cannot be empty".to_string()));
        }
        let reporter = self.gateway.reporter_type.trim();
        let specialist = self.gateway.specialist_type.trim();
        if reporter.is_empty() || specialist.is_empty() {
            return Err(Error::Config(
                "gateway.reporter_type and gateway.specialist_type cannot be empty".to_string(),
            ));
        }
        if reporter.eq_ignore_ascii_case(specialist) {
            return Err(Error::Config(format!(
                "gateway.reporter_type and gateway.specialist_type are both '{}'",
                reporter
            )));
        }

        let intervals = [
            ("gateway.request_timeout_ms", self.gateway.request_timeout_ms),
            ("sync.poll_interval_secs", self.sync.poll_interval_secs),
            ("sync.retry_interval_secs", self.sync.retry_interval_secs),
            ("sync.backoff_initial_secs", self.sync.backoff_initial_secs),
            ("sync.backoff_max_secs", self.sync.backoff_max_secs),
            ("connectivity.probe_interval_secs", self.connectivity.probe_interval_secs),
            ("connectivity.probe_timeout_ms", self.connectivity.probe_timeout_ms),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, value)| *value == 0) {
            return Err(Error::Config(format!("{} must be greater than zero", name)));
        }
        if self.sync.backoff_max_secs < self.sync.backoff_initial_secs {
            return Err(Error::Config(
                "sync.backoff_max_secs must not be below sync.backoff_initial_secs".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the `host:port` the connectivity probe should dial.
    pub fn probe_addr(&self) -> Option<String> {
        if let Some(addr) = &self.connectivity.probe_addr {
            return Some(addr.clone());
        }
        let url = reqwest::Url::parse(&self.gateway.url).ok()?;
        let host = url.host_str()?;
        let port = url.port_or_known_default()?;
        Some(format!("{}:{}", host, port))
    }
}

/// Default state directory: `$XDG_STATE_HOME/consult`, falling back to the
/// local data directory on platforms without a state dir.
pub fn default_state_dir() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(STATE_DIR_NAME)
}

/// Path of the pending message database inside a state directory.
pub fn get_db_path(state_dir: &Path) -> PathBuf {
    state_dir.join(DB_FILE_NAME)
}

/// Initialize a new state directory with the given configuration.
pub fn init_state_dir(state_dir: &Path, config: &Config) -> Result<PathBuf> {
    let config_path = state_dir.join(CONFIG_FILE_NAME);
    if config_path.exists() {
        return Err(Error::AlreadyInitialized(config_path.display().to_string()));
    }
    fs::create_dir_all(state_dir)?;
    config.save(state_dir)?;
    Ok(config_path)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
