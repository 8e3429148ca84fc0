//! Automation configuration.
//!
//! Loaded via the `config` crate from `SENSORFLOW_*` environment variables;
//! nested keys use `__`, e.g. `SENSORFLOW_ALERT__DEFAULT_COOLDOWN_MINUTES`.

use serde::Deserialize;
use sensorflow_workflow::Cooldown;
use sensorflow_workflow::executor::DEFAULT_MAX_DEPTH;

/// Settings for the publish and telemetry pipelines.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    /// When false, telemetry is not matched or executed.
    pub enabled: bool,

    /// Tracing filter used when `RUST_LOG` is unset.
    pub log_filter: String,

    /// Deepest node below a trigger a run may reach.
    pub max_traversal_depth: usize,

    pub alert: AlertConfig,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_filter: "info".to_string(),
            max_traversal_depth: DEFAULT_MAX_DEPTH,
            alert: AlertConfig::default(),
        }
    }
}

/// Alert node settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AlertConfig {
    /// Cooldown applied to alert nodes that do not set their own.
    #[serde(default = "default_cooldown_minutes")]
    pub default_cooldown_minutes: u32,
}

fn default_cooldown_minutes() -> u32 {
    30
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            default_cooldown_minutes: default_cooldown_minutes(),
        }
    }
}

impl AlertConfig {
    #[must_use]
    pub fn default_cooldown(&self) -> Cooldown {
        Cooldown::minutes(self.default_cooldown_minutes)
    }
}

impl AutomationConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but cannot be parsed.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::load(environment())
    }

    fn load(source: config::Environment) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix("SENSORFLOW")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}
