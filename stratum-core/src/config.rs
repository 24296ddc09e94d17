//! Engine-wide configuration.
//!
//! [`EngineConfig`] holds the handful of tunables the scheduler itself
//! needs (as opposed to per-plan/per-action settings, which live on the
//! plan tree). Loaded in three layers, each overriding the last:
//!
//! 1. [`EngineConfig::default`]
//! 2. an optional TOML file (`EngineConfig::load_file`)
//! 3. environment variables prefixed `STRATUM_`, e.g. `STRATUM_CANCELLATION_GRACE_MS`
//!
//! matching the defaults-then-file-then-env layering this lineage's
//! orchestrator config loader uses for its own YAML configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Timeout applied to an action attempt when the action itself specifies none.
    pub default_action_timeout_ms: u64,

    /// How long a runner waits for in-flight work to settle after cancellation
    /// before giving up and marking it Stopped anyway.
    pub cancellation_grace_ms: u64,

    /// Floor applied to a continuous check's configured `Delay`, so a
    /// misconfigured `0` doesn't spin a tight loop.
    pub continuous_check_min_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_action_timeout_ms: 30_000,
            cancellation_grace_ms: 5_000,
            continuous_check_min_delay_ms: 50,
        }
    }
}

impl EngineConfig {
    pub fn default_action_timeout(&self) -> Duration {
        Duration::from_millis(self.default_action_timeout_ms)
    }

    pub fn cancellation_grace(&self) -> Duration {
        Duration::from_millis(self.cancellation_grace_ms)
    }

    pub fn continuous_check_min_delay(&self) -> Duration {
        Duration::from_millis(self.continuous_check_min_delay_ms)
    }

    /// Layer an optional TOML file over the defaults.
    pub fn load_file(path: impl AsRef<Path>) -> crate::error::Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| crate::error::EngineError::internal(format!("reading config file: {e}")))?;
        toml::from_str(&text).map_err(|e| crate::error::EngineError::internal(format!("parsing config file: {e}")))
    }

    /// Apply `STRATUM_*` environment variable overrides on top of `self`.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_u64("STRATUM_DEFAULT_ACTION_TIMEOUT_MS") {
            self.default_action_timeout_ms = v;
        }
        if let Some(v) = env_u64("STRATUM_CANCELLATION_GRACE_MS") {
            self.cancellation_grace_ms = v;
        }
        if let Some(v) = env_u64("STRATUM_CONTINUOUS_CHECK_MIN_DELAY_MS") {
            self.continuous_check_min_delay_ms = v;
        }
        self
    }

    /// Load defaults, layer an optional file, then environment overrides.
    pub fn load(file: Option<impl AsRef<Path>>) -> crate::error::Result<Self> {
        let base = match file {
            Some(path) => Self::load_file(path)?,
            None => Self::default(),
        };
        Ok(base.with_env_overrides())
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = EngineConfig::default();
        assert!(cfg.default_action_timeout_ms > 0);
        assert!(cfg.cancellation_grace_ms > 0);
    }

    #[test]
    fn env_overrides_apply() {
        std::env::set_var("STRATUM_CANCELLATION_GRACE_MS", "9000");
        let cfg = EngineConfig::default().with_env_overrides();
        assert_eq!(cfg.cancellation_grace_ms, 9000);
        std::env::remove_var("STRATUM_CANCELLATION_GRACE_MS");
    }
}
