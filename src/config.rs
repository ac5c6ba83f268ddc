//! Global configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// Keyring service name under which the API credential is stored.
pub const KEYRING_SERVICE: &str = "tasksync";

/// REST API connectivity settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ApiConfig {
    /// Base URL of the task/notification REST service.
    pub base_url: String,
    /// Per-request timeout.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

impl ApiConfig {
    /// Request timeout as a [`Duration`].
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// Push channel settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PushConfig {
    /// WebSocket endpoint of the STOMP broker.
    pub endpoint: String,
    /// Destination prefix; the user id is appended as the last path segment.
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
    /// Heartbeat interval in both directions.
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,
    /// How long to wait for `CONNECTED` after the socket opens.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Fixed delay between reconnect attempts.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Carry the bearer credential as a `token` query parameter.
    #[serde(default = "default_true")]
    pub token_in_query: bool,
}

impl PushConfig {
    /// Heartbeat interval as a [`Duration`]; zero disables heartbeats.
    #[must_use]
    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }

    /// Handshake timeout as a [`Duration`].
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Reconnect delay as a [`Duration`].
    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Topic for a given backend user id.
    #[must_use]
    pub fn user_topic(&self, user_id: i64) -> String {
        format!("{}/{user_id}", self.topic_prefix.trim_end_matches('/'))
    }
}

/// Ephemeral notice queue settings.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct NoticeConfig {
    /// Maximum number of notices held at once.
    #[serde(default = "default_notice_limit")]
    pub limit: usize,
    /// Delay between dismissal and physical removal.
    #[serde(default = "default_remove_delay_ms")]
    pub remove_delay_ms: u64,
}

impl NoticeConfig {
    /// Removal delay as a [`Duration`].
    #[must_use]
    pub fn remove_delay(&self) -> Duration {
        Duration::from_millis(self.remove_delay_ms)
    }
}

impl Default for NoticeConfig {
    fn default() -> Self {
        Self {
            limit: default_notice_limit(),
            remove_delay_ms: default_remove_delay_ms(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_request_timeout_seconds() -> u64 {
    30
}

fn default_topic_prefix() -> String {
    "/topic/notifications".into()
}

fn default_heartbeat_ms() -> u64 {
    4000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_reconnect_delay_ms() -> u64 {
    5000
}

fn default_notice_limit() -> usize {
    1
}

fn default_remove_delay_ms() -> u64 {
    1_000_000
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Backend user id; resolved through the API when absent.
    #[serde(default)]
    pub user_id: Option<i64>,
    /// REST API settings.
    pub api: ApiConfig,
    /// Push channel settings.
    pub push: PushConfig,
    /// Notice queue settings.
    #[serde(default)]
    pub notices: NoticeConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let base = self.api.base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(AppError::Config(
                "api.base_url must start with http:// or https://".into(),
            ));
        }

        let endpoint = self.push.endpoint.trim();
        if !(endpoint.starts_with("ws://") || endpoint.starts_with("wss://")) {
            return Err(AppError::Config(
                "push.endpoint must start with ws:// or wss://".into(),
            ));
        }

        if self.push.reconnect_delay_ms == 0 {
            return Err(AppError::Config(
                "push.reconnect_delay_ms must be greater than zero".into(),
            ));
        }

        if self.push.connect_timeout_ms == 0 {
            return Err(AppError::Config(
                "push.connect_timeout_ms must be greater than zero".into(),
            ));
        }

        if self.notices.limit == 0 {
            return Err(AppError::Config(
                "notices.limit must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}

/// Load a single credential from OS keychain with env-var fallback.
///
/// # Errors
///
/// Returns `AppError::Credential` when both sources come up empty.
pub async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Credential(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    match env::var(env_key) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(AppError::Credential(format!(
            "credential {keyring_key} not found in keychain or {env_key} env var"
        ))),
    }
}
