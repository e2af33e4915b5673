use config::{Config, ConfigError, File};
use serde::Deserialize;
use std::env;
use std::path::Path;

use crate::fallback_batch::MAX_BATCH_ADDRESSES;

#[derive(Debug, Deserialize, Clone)]
pub struct Rpc {
    #[serde(default = "default_rpc_host")]
    pub host: String,
    #[serde(default = "default_rpc_port")]
    pub port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    /// Full endpoint URL; when set it wins over host/port
    #[serde(default)]
    pub url: Option<String>,
    /// scantxoutset walks the whole UTXO set, so this is generous
    #[serde(default = "default_rpc_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_rpc_host() -> String {
    "127.0.0.1".to_string()
}
fn default_rpc_port() -> u16 {
    8332
}
fn default_rpc_timeout_seconds() -> u64 {
    120
}

impl Rpc {
    pub fn endpoint(&self) -> String {
        match &self.url {
            Some(url) if !url.trim().is_empty() => url.trim().to_string(),
            _ => format!("http://{}:{}", self.host, self.port),
        }
    }
}

impl Default for Rpc {
    fn default() -> Self {
        Self {
            host: default_rpc_host(),
            port: default_rpc_port(),
            user: String::new(),
            password: String::new(),
            url: None,
            timeout_seconds: default_rpc_timeout_seconds(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Fallback {
    /// Use the public explorers when the node cannot answer
    #[serde(default = "default_true")]
    pub allow_fallback: bool,
    #[serde(default = "default_batch_chunk_size")]
    pub batch_chunk_size: usize,
    #[serde(default = "default_batch_base_url")]
    pub batch_base_url: String,
    #[serde(default = "default_batch_separator")]
    pub batch_separator: String,
    #[serde(default = "default_batch_timeout_seconds")]
    pub batch_timeout_seconds: u64,
    #[serde(default = "default_single_base_url")]
    pub single_base_url: String,
    #[serde(default = "default_single_timeout_seconds")]
    pub single_timeout_seconds: u64,
    /// Per-client request budget towards each public service
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
    /// In-flight requests per fallback tier (1 = strictly sequential)
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
}

fn default_true() -> bool {
    true
}
fn default_batch_chunk_size() -> usize {
    MAX_BATCH_ADDRESSES
}
fn default_batch_base_url() -> String {
    "https://blockchain.info".to_string()
}
fn default_batch_separator() -> String {
    ",".to_string()
}
fn default_batch_timeout_seconds() -> u64 {
    15
}
fn default_single_base_url() -> String {
    "https://api.blockcypher.com/v1/btc/main".to_string()
}
fn default_single_timeout_seconds() -> u64 {
    10
}
fn default_requests_per_second() -> u32 {
    3
}
fn default_max_concurrent_requests() -> usize {
    1
}

impl Fallback {
    /// Chunk size actually used: never 0, never above what the batch service accepts.
    pub fn effective_chunk_size(&self) -> usize {
        self.batch_chunk_size.clamp(1, MAX_BATCH_ADDRESSES)
    }
}

impl Default for Fallback {
    fn default() -> Self {
        Self {
            allow_fallback: default_true(),
            batch_chunk_size: default_batch_chunk_size(),
            batch_base_url: default_batch_base_url(),
            batch_separator: default_batch_separator(),
            batch_timeout_seconds: default_batch_timeout_seconds(),
            single_base_url: default_single_base_url(),
            single_timeout_seconds: default_single_timeout_seconds(),
            requests_per_second: default_requests_per_second(),
            max_concurrent_requests: default_max_concurrent_requests(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Refresh {
    /// Addresses per refresh pass (hard-capped at 50)
    #[serde(default = "default_refresh_batch_limit")]
    pub batch_limit: usize,
    #[serde(default = "default_refresh_interval_seconds")]
    pub interval_seconds: u64,
}

fn default_refresh_batch_limit() -> usize {
    50
}
fn default_refresh_interval_seconds() -> u64 {
    600
}

impl Default for Refresh {
    fn default() -> Self {
        Self {
            batch_limit: default_refresh_batch_limit(),
            interval_seconds: default_refresh_interval_seconds(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Database {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: usize,
}

fn default_max_connections() -> u32 {
    5
}
fn default_connect_attempts() -> usize {
    10
}

impl Default for Database {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
            connect_attempts: default_connect_attempts(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// JSON lines output (only with the `observability` feature)
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Metrics {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen_addr")]
    pub listen_addr: String,
}

fn default_metrics_listen_addr() -> String {
    "0.0.0.0:9100".to_string()
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: default_metrics_listen_addr(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub rpc: Rpc,
    #[serde(default)]
    pub fallback: Fallback,
    #[serde(default)]
    pub refresh: Refresh,
    #[serde(default)]
    pub database: Database,
    #[serde(default)]
    pub log: LogSettings,
    #[serde(default)]
    pub metrics: Metrics,
}

impl Settings {
    /// Loads `Config.toml` from the working directory (optional) plus environment overrides.
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("Config").required(false))
            .build()?;

        let mut settings: Self = s.try_deserialize()?;
        settings.apply_env_overrides();
        Ok(settings)
    }

    /// Loads a specific configuration file; the file must exist.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()?;

        let mut settings: Self = s.try_deserialize()?;
        settings.apply_env_overrides();
        Ok(settings)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(url) = non_empty_env("MONITOR_RPC_URL") {
            self.rpc.url = Some(url);
        }
        if let Some(user) = non_empty_env("MONITOR_RPC_USER") {
            self.rpc.user = user;
        }
        if let Some(password) = non_empty_env("MONITOR_RPC_PASSWORD") {
            self.rpc.password = password;
        }
        if let Some(raw) = non_empty_env("MONITOR_ALLOW_FALLBACK") {
            match parse_bool(&raw) {
                Some(allow) => self.fallback.allow_fallback = allow,
                None => log::warn!("Ignoring MONITOR_ALLOW_FALLBACK={raw}: expected true/false"),
            }
        }
        if let Some(db_url) = non_empty_env("DATABASE_URL") {
            self.database.url = Some(db_url);
        }
    }

    /// Refresh batch size actually used.
    pub fn effective_refresh_limit(&self) -> usize {
        self.refresh.batch_limit.min(MAX_BATCH_ADDRESSES)
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
