//! Configuration loading for the cycle rig using Figment.
//!
//! Configuration is loaded from:
//! 1. A TOML file (default: `config/cycle-rig.toml`)
//! 2. Environment variables prefixed with `CYCLERIG_`
//!
//! # Environment Variable Overrides
//!
//! Any value can be overridden with the `CYCLERIG_` prefix and the key path
//! separated by underscores:
//!
//! ```text
//! CYCLERIG_SAMPLER_SAMPLE_RATE_HZ=100
//! CYCLERIG_CONTROLLER_SETTLE_MS=500
//! ```
//!
//! # Example
//!
//! ```no_run
//! use cycle_rig::config::Settings;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::load_from("config/cycle-rig.toml")?;
//!     println!("Sample rate: {} Hz", settings.sampler.sample_rate_hz);
//!     Ok(())
//! }
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration load error: {0}")]
    LoadError(#[from] figment::Error),
    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

/// Top-level configuration for a controller/sampler pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Cycle/trial controller settings
    pub controller: ControllerConfig,
    /// Force-capture sampler settings
    pub sampler: SamplerConfig,
}

/// Cycle/trial controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Name of the actuator whose movement is polled between poses
    pub arm: String,
    /// Name of the pose trigger for the pour/lift position
    pub pour_prep_position: String,
    /// Name of the pose trigger for the rest/lower position
    pub resting_position: String,
    /// Optional name of the force-capture sampler to bracket each set-down
    #[serde(default)]
    pub force_sensor: Option<String>,
    /// Settle wait after each pose trigger, in milliseconds
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// Poll interval while waiting for the actuator to stop, in milliseconds
    #[serde(default = "default_move_poll_ms")]
    pub move_poll_ms: u64,
    /// Upper bound on waiting for the actuator to stop, in milliseconds
    #[serde(default = "default_move_timeout_ms")]
    pub move_timeout_ms: u64,
}

/// Force-capture sampler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Name of the load-cell measurement source
    #[serde(default)]
    pub load_cell: String,
    /// Use the built-in simulated force curve instead of hardware
    #[serde(default)]
    pub use_mock_curve: bool,
    /// Reading key an external load-cell driver reports force under.
    /// Passed through to driver wiring; the built-in mock curve ignores it.
    #[serde(default = "default_force_key")]
    pub force_key: String,
    /// Sampling rate in Hz
    #[serde(default = "default_sample_rate_hz")]
    pub sample_rate_hz: u32,
    /// Rolling buffer capacity in samples
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Readings at or above this value count as physical contact
    #[serde(default = "default_zero_threshold")]
    pub zero_threshold: f64,
    /// Recovery timeout for a capture window, in milliseconds
    #[serde(default = "default_capture_timeout_ms")]
    pub capture_timeout_ms: u64,
}

fn default_settle_ms() -> u64 {
    1000
}

fn default_move_poll_ms() -> u64 {
    50
}

fn default_move_timeout_ms() -> u64 {
    10_000
}

fn default_force_key() -> String {
    "value".to_string()
}

fn default_sample_rate_hz() -> u32 {
    50
}

fn default_buffer_size() -> usize {
    100
}

fn default_zero_threshold() -> f64 {
    5.0
}

fn default_capture_timeout_ms() -> u64 {
    10_000
}

// Matches the serde/file defaults exactly: a default-constructed config is
// what an empty [sampler] table would load to, and fails validation the
// same way (no load cell, no mock curve).
impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            load_cell: String::new(),
            use_mock_curve: false,
            force_key: default_force_key(),
            sample_rate_hz: default_sample_rate_hz(),
            buffer_size: default_buffer_size(),
            zero_threshold: default_zero_threshold(),
            capture_timeout_ms: default_capture_timeout_ms(),
        }
    }
}

impl Settings {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config/cycle-rig.toml")
    }

    /// Load configuration from a specific file path, merged with
    /// `CYCLERIG_`-prefixed environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be loaded or fails
    /// validation.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings: Self = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("CYCLERIG_").split("_"))
            .extract()
            .map_err(ConfigError::LoadError)?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration after loading.
    ///
    /// Checks:
    /// - Required hardware references are present
    /// - `load_cell` is set unless the mock curve is selected
    /// - Rates, capacities, and timeouts are non-zero
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` with a descriptive message naming the
    /// offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.controller.validate()?;
        self.sampler.validate()?;
        Ok(())
    }
}

impl ControllerConfig {
    /// Validate the controller section (see [`Settings::validate`]).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.arm.is_empty() {
            return Err(ConfigError::ValidationError(
                "controller: 'arm' is required".to_string(),
            ));
        }
        if self.pour_prep_position.is_empty() {
            return Err(ConfigError::ValidationError(
                "controller: 'pour_prep_position' is required".to_string(),
            ));
        }
        if self.resting_position.is_empty() {
            return Err(ConfigError::ValidationError(
                "controller: 'resting_position' is required".to_string(),
            ));
        }
        if self.move_poll_ms == 0 {
            return Err(ConfigError::ValidationError(
                "controller: 'move_poll_ms' must be > 0".to_string(),
            ));
        }
        if self.move_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "controller: 'move_timeout_ms' must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl SamplerConfig {
    /// Validate the sampler section (see [`Settings::validate`]).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.load_cell.is_empty() && !self.use_mock_curve {
            return Err(ConfigError::ValidationError(
                "sampler: 'load_cell' is required unless 'use_mock_curve' is set".to_string(),
            ));
        }
        if self.sample_rate_hz == 0 {
            return Err(ConfigError::ValidationError(
                "sampler: 'sample_rate_hz' must be > 0".to_string(),
            ));
        }
        if self.buffer_size == 0 {
            return Err(ConfigError::ValidationError(
                "sampler: 'buffer_size' must be > 0".to_string(),
            ));
        }
        if self.capture_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "sampler: 'capture_timeout_ms' must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid_toml() -> &'static str {
        r#"
            [controller]
            arm = "arm1"
            pour_prep_position = "pour_prep"
            resting_position = "resting"
            force_sensor = "force1"

            [sampler]
            load_cell = "loadcell1"
        "#
    }

    #[test]
    fn test_load_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(valid_toml().as_bytes()).unwrap();

        let settings = Settings::load_from(file.path()).unwrap();
        assert_eq!(settings.controller.settle_ms, 1000);
        assert_eq!(settings.controller.move_poll_ms, 50);
        assert_eq!(settings.controller.move_timeout_ms, 10_000);
        assert_eq!(settings.sampler.sample_rate_hz, 50);
        assert_eq!(settings.sampler.buffer_size, 100);
        assert_eq!(settings.sampler.zero_threshold, 5.0);
        assert_eq!(settings.sampler.capture_timeout_ms, 10_000);
        assert_eq!(settings.sampler.force_key, "value");
    }

    #[test]
    fn test_missing_arm_fails_validation() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            br#"
            [controller]
            arm = ""
            pour_prep_position = "pour_prep"
            resting_position = "resting"

            [sampler]
            use_mock_curve = true
        "#,
        )
        .unwrap();

        let err = Settings::load_from(file.path()).unwrap_err();
        assert!(err.to_string().contains("'arm' is required"));
    }

    #[test]
    fn test_mock_curve_skips_load_cell_requirement() {
        // Default construction mirrors an empty [sampler] table: no load
        // cell and no mock curve is a validation error.
        let cfg = SamplerConfig::default();
        assert!(!cfg.use_mock_curve);
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("'load_cell' is required"));

        let cfg = SamplerConfig {
            use_mock_curve: true,
            ..SamplerConfig::default()
        };
        cfg.validate().unwrap();

        let cfg = SamplerConfig {
            load_cell: "loadcell1".to_string(),
            ..SamplerConfig::default()
        };
        cfg.validate().unwrap();
    }

    #[test]
    fn test_zero_buffer_rejected() {
        let cfg = SamplerConfig {
            buffer_size: 0,
            use_mock_curve: true,
            ..SamplerConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("'buffer_size' must be > 0"));
    }
}
