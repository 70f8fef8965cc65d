//! Engine settings loaded from an optional TOML file plus `DRILL__*` env vars.

use std::time::Duration;

use serde::Deserialize;
use storage::retry::RetryPolicy;

/// Top-level settings for assembling the session engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Order fresh tasks by id instead of shuffling them.
    pub deterministic: bool,
    /// Seed for the task store's shuffle. `None` seeds from the OS.
    pub selection_seed: Option<u64>,
    /// `SQLite` URL. `None` keeps everything in memory.
    pub database_url: Option<String>,
    pub retry: RetrySettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            deterministic: false,
            selection_seed: None,
            database_url: None,
            retry: RetrySettings::default(),
        }
    }
}

/// Store resilience knobs, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: usize,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Zero disables jitter.
    pub jitter_ms: u64,
    pub call_timeout_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self::from_policy(&RetryPolicy::default())
    }
}

impl RetrySettings {
    fn from_policy(policy: &RetryPolicy) -> Self {
        let ms = |d: Duration| u64::try_from(d.as_millis()).unwrap_or(u64::MAX);
        Self {
            max_attempts: policy.max_attempts,
            base_backoff_ms: ms(policy.base_backoff),
            max_backoff_ms: ms(policy.max_backoff),
            jitter_ms: policy.jitter_max.map_or(0, ms),
            call_timeout_ms: ms(policy.call_timeout),
        }
    }

    #[must_use]
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_backoff: Duration::from_millis(self.base_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            jitter_max: (self.jitter_ms > 0).then(|| Duration::from_millis(self.jitter_ms)),
            call_timeout: Duration::from_millis(self.call_timeout_ms),
        }
    }
}

impl EngineSettings {
    /// Load settings from `path` (if it exists) and `DRILL__…` environment
    /// variables, e.g. `DRILL__RETRY__MAX_ATTEMPTS=3`.
    ///
    /// # Errors
    ///
    /// Returns `config::ConfigError` if a source cannot be parsed or a value
    /// has the wrong type.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        builder
            .add_source(
                config::Environment::with_prefix("DRILL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
