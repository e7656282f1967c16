//! Session configuration loading from workspace config.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur when loading session configuration.
#[derive(Debug, Error)]
pub enum SessionConfigError {
    /// I/O error reading config file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Configuration validation error.
    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// How the cumulative epoch counter advances after a training call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpochAccounting {
    /// Advance by the epochs the caller asked for, even if training stopped early.
    #[default]
    Requested,
    /// Advance by the epochs the service actually reported.
    Observed,
}

/// Defaults of the optimizer built when `fit` receives no override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerDefaults {
    pub method: String,
    pub clip_grad_min: f64,
    pub clip_grad_max: f64,
    pub lr_policy: String,
    pub step_size: u32,
}

impl Default for OptimizerDefaults {
    fn default() -> Self {
        Self {
            method: "momentum".to_string(),
            clip_grad_min: -1000.0,
            clip_grad_max: 1000.0,
            lr_policy: "step".to_string(),
            step_size: 15,
        }
    }
}

/// Per-session defaults and conventions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Input column used by `fit`/`predict` when none is given.
    pub inputs: String,
    /// Target column used by `fit`/`predict` when none is given.
    pub target: String,
    pub batch_size: u32,
    pub max_epochs: u32,
    /// 0 = silent .. 3 = per-batch history.
    pub log_level: u8,
    pub learning_rate: f64,
    pub optimizer: OptimizerDefaults,
    /// Extension of tables saved by `export_tables`.
    pub table_extension: String,
    /// Extension of the blob written by `export_portable`.
    pub portable_extension: String,
    pub epoch_accounting: EpochAccounting,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inputs: "_image_".to_string(),
            target: "_label_".to_string(),
            batch_size: 1,
            max_epochs: 5,
            log_level: 3,
            learning_rate: 0.01,
            optimizer: OptimizerDefaults::default(),
            table_extension: ".sashdat".to_string(),
            portable_extension: ".astore".to_string(),
            epoch_accounting: EpochAccounting::Requested,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.inputs.trim().is_empty() || self.target.trim().is_empty() {
            return Err("inputs and target must not be empty".to_string());
        }
        if self.batch_size == 0 {
            return Err("batch_size must be >= 1".to_string());
        }
        if self.max_epochs == 0 {
            return Err("max_epochs must be >= 1".to_string());
        }
        if self.log_level > 3 {
            return Err("log_level must be between 0 and 3".to_string());
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err("learning_rate must be > 0".to_string());
        }
        if self.optimizer.clip_grad_min > self.optimizer.clip_grad_max {
            return Err("optimizer.clip_grad_min must not exceed clip_grad_max".to_string());
        }
        if !self.table_extension.starts_with('.') || !self.portable_extension.starts_with('.') {
            return Err("extensions must start with '.'".to_string());
        }
        Ok(())
    }
}

/// Load session configuration from workspace config file.
///
/// Searches for `.castor/config.toml` in the workspace root.
/// If the `[session]` section is missing, returns default configuration.
///
/// # Errors
/// Returns error if config file exists but cannot be read, parsed or validated.
pub fn load_session_config(workspace_root: &Path) -> Result<SessionConfig, SessionConfigError> {
    let config_path = default_config_path(workspace_root);

    if !config_path.exists() {
        return Ok(SessionConfig::default());
    }

    let content = std::fs::read_to_string(&config_path)?;
    let mut toml: toml::Table = toml::from_str(&content)?;

    let Some(section) = toml.remove("session") else {
        return Ok(SessionConfig::default());
    };

    let config = section.try_into::<SessionConfig>()?;
    config
        .validate()
        .map_err(|e| {
            SessionConfigError::Validation(format!("Invalid session configuration: {e}"))
        })?;

    Ok(config)
}

/// Get the default config file path for a workspace.
#[must_use]
pub fn default_config_path(workspace_root: &Path) -> PathBuf {
    workspace_root.join(".castor").join("config.toml")
}
