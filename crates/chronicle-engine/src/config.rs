//! Engine configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Raised by [`EngineConfig::validate`]/[`EngineConfig::from_env`] when a
/// setting is out of range.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("initial_time_scale must be > 0, got {0}")]
    InvalidTimeScale(f64),
    #[error("checkpoint_interval must be > 0, got {0}")]
    InvalidCheckpointInterval(f64),
    #[error("{var} is set but not a valid number: {value}")]
    InvalidEnvNumber { var: &'static str, value: String },
}

/// Configuration for a [`SimulationEngine`](crate::orchestrator::SimulationEngine) instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// NDJSON event log path.
    pub event_log_path: PathBuf,
    /// Directory holding serialized checkpoints.
    pub checkpoint_dir: PathBuf,
    /// Simulation seconds between automatic checkpoints.
    pub checkpoint_interval: f64,
    /// Whether `emit_event`'s handler dispatch stops on the first handler
    /// error instead of logging and continuing.
    pub fail_fast_handlers: bool,
    /// Time scale the clock starts at once `start()` is called.
    pub initial_time_scale: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_log_path: PathBuf::from("simulation.ndjson"),
            checkpoint_dir: PathBuf::from("checkpoints"),
            checkpoint_interval: 60.0,
            fail_fast_handlers: false,
            initial_time_scale: 1.0,
        }
    }
}

impl EngineConfig {
    /// Reject settings the orchestrator could never honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_time_scale <= 0.0 {
            return Err(ConfigError::InvalidTimeScale(self.initial_time_scale));
        }
        if self.checkpoint_interval <= 0.0 {
            return Err(ConfigError::InvalidCheckpointInterval(self.checkpoint_interval));
        }
        Ok(())
    }

    /// Build from `CHRONICLE_*` environment variables, falling back to
    /// [`Default`] for anything unset. No file-format config parser is
    /// implemented here -- that belongs to an outer CLI/HTTP shell.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("CHRONICLE_EVENT_LOG_PATH") {
            config.event_log_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("CHRONICLE_CHECKPOINT_DIR") {
            config.checkpoint_dir = PathBuf::from(path);
        }
        if let Ok(value) = std::env::var("CHRONICLE_CHECKPOINT_INTERVAL") {
            config.checkpoint_interval =
                value.parse().map_err(|_| ConfigError::InvalidEnvNumber {
                    var: "CHRONICLE_CHECKPOINT_INTERVAL",
                    value: value.clone(),
                })?;
        }
        if let Ok(value) = std::env::var("CHRONICLE_INITIAL_TIME_SCALE") {
            config.initial_time_scale =
                value.parse().map_err(|_| ConfigError::InvalidEnvNumber {
                    var: "CHRONICLE_INITIAL_TIME_SCALE",
                    value: value.clone(),
                })?;
        }
        if let Ok(value) = std::env::var("CHRONICLE_FAIL_FAST_HANDLERS") {
            config.fail_fast_handlers = value == "1" || value.eq_ignore_ascii_case("true");
        }

        config.validate()?;
        Ok(config)
    }
}

/// Install a `tracing` subscriber reading its filter from `RUST_LOG`,
/// falling back to `info` if unset. Call once at process start; a second
/// call is a silent no-op (`tracing_subscriber` already initialized).
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_checkpoint_interval() {
        let config = EngineConfig::default();
        assert!(config.checkpoint_interval > 0.0);
        assert!(!config.fail_fast_handlers);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_non_positive_time_scale() {
        let mut config = EngineConfig::default();
        config.initial_time_scale = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_non_positive_checkpoint_interval() {
        let mut config = EngineConfig::default();
        config.checkpoint_interval = -1.0;
        assert!(config.validate().is_err());
    }
}
