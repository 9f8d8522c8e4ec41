//! Configuration types for the consolidation hook.
//!
//! The hook never caches configuration: callers load a fresh [`HookConfig`]
//! snapshot for every lifecycle event and pass it in explicitly.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Payload timeout used for scheduled consolidation jobs when none is configured.
pub const DEFAULT_JOB_TIMEOUT_SECS: u64 = 120;

/// Bound on a direct gateway call when none is configured.
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 600;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HookConfig {
    /// Consolidation behaviour.
    pub consolidation: ConsolidationConfig,
    /// Agent gateway connection (direct strategy).
    pub gateway: GatewayConfig,
    /// Cron job store settings (scheduled strategy).
    pub scheduler: SchedulerConfig,
}

/// How a consolidation is handed off for execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStrategy {
    /// Persist a one-shot cron job and wake the scheduler.
    #[default]
    Scheduled,
    /// Call the agent gateway directly, bounded by a timeout.
    Direct,
}

impl DispatchStrategy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Direct => "direct",
        }
    }
}

/// Memory consolidation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidationConfig {
    /// Master switch. Off unless explicitly enabled.
    pub enabled: bool,
    /// Custom prompt template (`{sessionId}`, `{sessionKey}`, `{date}`, `{sessionFile}`).
    pub prompt: Option<String>,
    /// Model override for the consolidation turn.
    pub model: Option<String>,
    /// Thinking level override for the consolidation turn.
    pub thinking: Option<String>,
    /// Timeout override in seconds.
    ///
    /// Becomes the job payload timeout for the scheduled strategy and the
    /// call bound for the direct strategy.
    pub timeout_seconds: Option<u64>,
    /// Which dispatch path this deployment uses.
    pub strategy: DispatchStrategy,
    /// Whether the result is announced back to the user.
    pub deliver: bool,
    /// Agent id embedded in generated subagent session keys.
    pub agent_id: String,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            prompt: None,
            model: None,
            thinking: None,
            timeout_seconds: None,
            strategy: DispatchStrategy::default(),
            deliver: false,
            agent_id: "main".to_owned(),
        }
    }
}

impl ConsolidationConfig {
    /// Timeout written into scheduled job payloads.
    #[must_use]
    pub fn job_timeout_secs(&self) -> u64 {
        self.timeout_seconds.unwrap_or(DEFAULT_JOB_TIMEOUT_SECS)
    }

    /// Returns the custom template when one is set and non-blank.
    #[must_use]
    pub fn custom_prompt(&self) -> Option<&str> {
        self.prompt.as_deref().filter(|p| !p.trim().is_empty())
    }
}

/// Agent gateway connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Gateway base URL.
    pub url: String,
    /// Optional bearer token.
    pub token: Option<String>,
    /// Bound on a direct agent call in seconds.
    pub call_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:18789".to_owned(),
            token: None,
            call_timeout_secs: DEFAULT_CALL_TIMEOUT_SECS,
        }
    }
}

/// Cron job store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Store path override. `None` uses [`crate::paths::cron_store_file`].
    pub store_path: Option<PathBuf>,
    /// How long to wait for the store lock before giving up.
    pub lock_timeout_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            store_path: None,
            lock_timeout_ms: 1_500,
        }
    }
}

impl SchedulerConfig {
    /// Resolved job store path.
    #[must_use]
    pub fn resolved_store_path(&self) -> PathBuf {
        self.store_path
            .clone()
            .unwrap_or_else(crate::paths::cron_store_file)
    }
}

impl HookConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::ConsolidationError::Config(e.to_string()))
    }

    /// Load configuration, treating a missing file as all defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default(path: &std::path::Path) -> crate::error::Result<Self> {
        match Self::from_file(path) {
            Ok(config) => Ok(config),
            Err(crate::error::ConsolidationError::Io(e))
                if e.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::ConsolidationError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Bound applied to a direct gateway call.
    #[must_use]
    pub fn call_timeout(&self) -> std::time::Duration {
        let secs = self
            .consolidation
            .timeout_seconds
            .unwrap_or(self.gateway.call_timeout_secs);
        std::time::Duration::from_secs(secs)
    }
}
