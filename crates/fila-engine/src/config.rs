//! # Engine Configuration
//!
//! Construction-time settings for the synchronization engine. Invalid
//! configuration fails engine construction; nothing here is revisited
//! at runtime.

use serde::{Deserialize, Serialize};
use url::Url;

use fila_core::{QueueError, QueueResult};

// ======== Defaults ========

fn default_poll_interval_secs() -> u64 {
    7
}

// =============================================================================
// Engine Config
// =============================================================================

/// Settings for [`QueueEngine`](crate::QueueEngine) construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Base URL of the remote queue service. `None` selects the local
    /// simulator from the start.
    #[serde(default)]
    pub base_url: Option<String>,

    /// When true, the engine refuses to fall back to the simulator:
    /// a missing `base_url` is a configuration error and auth failures
    /// surface instead of switching backends.
    #[serde(default)]
    pub require_remote: bool,

    /// Seconds between background refresh cycles.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            base_url: None,
            require_remote: false,
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl EngineConfig {
    /// Reads configuration from `FILA_*` environment variables,
    /// falling back to defaults for anything unset.
    pub fn from_env() -> Self {
        let base_url = std::env::var("FILA_BASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty());

        let require_remote = std::env::var("FILA_REQUIRE_REMOTE")
            .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let poll_interval_secs = std::env::var("FILA_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_poll_interval_secs);

        EngineConfig {
            base_url,
            require_remote,
            poll_interval_secs,
        }
    }

    /// Validates the configuration and returns the parsed base URL,
    /// if one is configured.
    pub fn validated_base_url(&self) -> QueueResult<Option<Url>> {
        match &self.base_url {
            Some(raw) => {
                let url = Url::parse(raw).map_err(|e| {
                    QueueError::Configuration(format!("Invalid base_url '{}': {}", raw, e))
                })?;
                Ok(Some(url))
            }
            None if self.require_remote => Err(QueueError::Configuration(
                "require_remote is set but no base_url is configured".to_string(),
            )),
            None => Ok(None),
        }
    }
}
