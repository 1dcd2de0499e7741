//! Session configuration

use crate::error::{Result, SdkError};
use crate::model::RecordKind;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Freshness and revalidation settings for one record kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshConfig {
    /// Background revalidation interval; 0 disables polling
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// How long a fetched value is served without going to the network
    #[serde(default = "default_stale_ms")]
    pub stale_ms: u64,

    /// Revalidate stale keys when the app regains focus
    #[serde(default = "default_true")]
    pub revalidate_on_focus: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            stale_ms: default_stale_ms(),
            revalidate_on_focus: true,
        }
    }
}

impl RefreshConfig {
    pub fn poll_interval(&self) -> Option<Duration> {
        (self.poll_interval_ms > 0).then(|| Duration::from_millis(self.poll_interval_ms))
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Records API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token for the records API
    #[serde(default)]
    pub api_key: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Records per collection page
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Refresh settings applied to every kind without an override
    #[serde(default)]
    pub refresh: RefreshConfig,

    /// Per-kind overrides keyed by kind tag (e.g. "production")
    #[serde(default)]
    pub kinds: HashMap<String, RefreshConfig>,
}

fn default_base_url() -> String { "http://localhost:3000/api".to_string() }
fn default_timeout() -> u64 { 30 }
fn default_page_size() -> u32 { 10 }
fn default_poll_interval() -> u64 { 30_000 }
fn default_stale_ms() -> u64 { 5_000 }
fn default_true() -> bool { true }

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            timeout_secs: default_timeout(),
            page_size: default_page_size(),
            refresh: RefreshConfig::default(),
            kinds: HashMap::new(),
        }
    }
}

impl SyncConfig {
    /// Parse a TOML config, rejecting overrides for unknown kinds
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with `BIOCHAR_*` environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("BIOCHAR_API_URL") {
            config.base_url = val;
        }

        if let Ok(val) = std::env::var("BIOCHAR_API_KEY") {
            config.api_key = Some(val);
        }

        if let Ok(val) = std::env::var("BIOCHAR_PAGE_SIZE") {
            if let Ok(size) = val.parse::<u32>() {
                config.page_size = size;
            }
        }

        if let Ok(val) = std::env::var("BIOCHAR_POLL_INTERVAL_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                config.refresh.poll_interval_ms = ms;
            }
        }

        if let Ok(val) = std::env::var("BIOCHAR_STALE_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                config.refresh.stale_ms = ms;
            }
        }

        if let Ok(val) = std::env::var("BIOCHAR_REVALIDATE_ON_FOCUS") {
            if let Ok(enabled) = val.parse::<bool>() {
                config.refresh.revalidate_on_focus = enabled;
            }
        }

        config
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(SdkError::Config("page_size must be at least 1".into()));
        }
        let mut seen = HashSet::new();
        for tag in self.kinds.keys() {
            let kind = RecordKind::from_str(tag)
                .ok_or_else(|| SdkError::Config(format!("unknown record kind '{}'", tag)))?;
            if !seen.insert(kind) {
                return Err(SdkError::Config(format!(
                    "record kind '{}' is configured more than once",
                    kind
                )));
            }
        }
        Ok(())
    }

    /// Effective refresh settings for a kind
    pub fn refresh_for(&self, kind: RecordKind) -> RefreshConfig {
        self.kinds
            .iter()
            .find(|(k, _)| RecordKind::from_str(k) == Some(kind))
            .map(|(_, refresh)| *refresh)
            .unwrap_or(self.refresh)
    }

    /// Builder-style override for one kind
    pub fn with_kind(mut self, kind: RecordKind, refresh: RefreshConfig) -> Self {
        self.kinds.retain(|tag, _| RecordKind::from_str(tag) != Some(kind));
        self.kinds.insert(kind.as_str().to_string(), refresh);
        self
    }
}
