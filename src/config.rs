//! Engine configuration loading, including timing and paging tunables.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::dao::models::UserId;

/// Default location on disk where the launcher looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/engine.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "STARCADE_CONFIG_PATH";

/// Immutable runtime configuration shared across the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long an untouched game draft survives between edits.
    pub draft_ttl: Duration,
    /// How long an untouched winner selection survives between edits.
    pub selection_ttl: Duration,
    /// How long after approval invited players may still accept.
    pub invite_window: Duration,
    /// Pause between two consecutive invite deliveries.
    pub invite_send_interval: Duration,
    /// Participants shown per page in selection panels.
    pub page_size: usize,
    /// Operator chat that receives infrastructure failure reports.
    pub operator: Option<UserId>,
}

impl EngineConfig {
    /// Load the engine configuration from disk, falling back to built-in
    /// defaults when the file is missing or malformed.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawEngineConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(path = %path.display(), "loaded engine configuration");
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            draft_ttl: Duration::from_secs(3600),
            selection_ttl: Duration::from_secs(3600),
            invite_window: Duration::from_secs(600),
            invite_send_interval: Duration::from_secs(1),
            page_size: 4,
            operator: None,
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawEngineConfig {
    #[serde(default = "defaults::draft_ttl_secs")]
    draft_ttl_secs: u64,
    #[serde(default = "defaults::selection_ttl_secs")]
    selection_ttl_secs: u64,
    #[serde(default = "defaults::invite_window_secs")]
    invite_window_secs: u64,
    #[serde(default = "defaults::invite_send_interval_ms")]
    invite_send_interval_ms: u64,
    #[serde(default = "defaults::page_size")]
    page_size: usize,
    #[serde(default)]
    operator: Option<UserId>,
}

impl From<RawEngineConfig> for EngineConfig {
    fn from(value: RawEngineConfig) -> Self {
        Self {
            draft_ttl: Duration::from_secs(value.draft_ttl_secs),
            selection_ttl: Duration::from_secs(value.selection_ttl_secs),
            invite_window: Duration::from_secs(value.invite_window_secs),
            invite_send_interval: Duration::from_millis(value.invite_send_interval_ms),
            page_size: value.page_size.max(1),
            operator: value.operator,
        }
    }
}

mod defaults {
    pub(super) fn draft_ttl_secs() -> u64 {
        3600
    }

    pub(super) fn selection_ttl_secs() -> u64 {
        3600
    }

    pub(super) fn invite_window_secs() -> u64 {
        600
    }

    pub(super) fn invite_send_interval_ms() -> u64 {
        1000
    }

    pub(super) fn page_size() -> usize {
        4
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
