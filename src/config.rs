//! Configuration loading using Figment
//!
//! Strongly-typed settings for the acquisition engine. Configuration is loaded from:
//! 1. A TOML file (base configuration, optional)
//! 2. Environment variables prefixed with `FORCE_DAQ_`, nested keys split on `__`
//!
//! # Example
//! ```no_run
//! use force_daq::config::Settings;
//!
//! let settings = Settings::load_from("config/force_daq.toml")?;
//! settings.validate()?;
//! println!("Polling every {:?}", settings.acquisition.poll_interval);
//! # Ok::<(), force_daq::error::DaqError>(())
//! ```
//!
//! Environment override example: `FORCE_DAQ_SENSOR__PORT=/dev/ttyACM0`.

use crate::error::{AppResult, DaqError};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Serial link to the force sensor
    #[serde(default)]
    pub sensor: SensorConfig,
    /// Polling loop settings
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    /// Per-axis recursive filter constants
    #[serde(default)]
    pub filter: FilterConfig,
    /// Tracing output
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Serial link configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Port to connect to when the engine starts (e.g. "/dev/ttyUSB0", "COM3").
    /// Left unset, the engine starts disconnected until a connect command arrives.
    #[serde(default)]
    pub port: Option<String>,
    /// Communication speed
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Read timeout for a single line
    #[serde(default = "default_read_timeout", with = "humantime_serde")]
    pub read_timeout: Duration,
}

/// Acquisition loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Sleep between two ticks
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Number of samples kept in the history buffer
    #[serde(default = "default_history_len")]
    pub history_len: usize,
}

/// Axis filter constants shared by all four axes
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Process variance `q`
    #[serde(default = "default_process_variance")]
    pub process_variance: f64,
    /// Measurement variance `r`
    #[serde(default = "default_measurement_variance")]
    pub measurement_variance: f64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_baud_rate() -> u32 {
    9600
}

fn default_read_timeout() -> Duration {
    Duration::from_millis(200)
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(100)
}

fn default_history_len() -> usize {
    5
}

fn default_process_variance() -> f64 {
    1e-2
}

fn default_measurement_variance() -> f64 {
    0.05 * 0.05
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: default_baud_rate(),
            read_timeout: default_read_timeout(),
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            history_len: default_history_len(),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            process_variance: default_process_variance(),
            measurement_variance: default_measurement_variance(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Settings {
    /// Load settings from defaults and `FORCE_DAQ_*` environment variables only
    pub fn load() -> AppResult<Self> {
        Ok(Self::figment().extract()?)
    }

    /// Load settings from a specific TOML file, then apply environment overrides
    ///
    /// A missing file is not an error; the defaults apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        Ok(Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("FORCE_DAQ_").split("__"))
            .extract()?)
    }

    fn figment() -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Env::prefixed("FORCE_DAQ_").split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_formats.join(", ")
            )));
        }

        if self.sensor.baud_rate == 0 {
            return Err(DaqError::Configuration(
                "sensor.baud_rate must be greater than 0".into(),
            ));
        }

        if self.acquisition.history_len == 0 {
            return Err(DaqError::Configuration(
                "acquisition.history_len must be at least 1".into(),
            ));
        }

        if self.acquisition.poll_interval.is_zero() {
            return Err(DaqError::Configuration(
                "acquisition.poll_interval must be non-zero".into(),
            ));
        }

        for (name, value) in [
            ("filter.process_variance", self.filter.process_variance),
            ("filter.measurement_variance", self.filter.measurement_variance),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(DaqError::Configuration(format!(
                    "{name} must be a positive finite number, got {value}"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults_match_sensor_firmware() {
        let settings = Settings::default();
        assert_eq!(settings.sensor.port, None);
        assert_eq!(settings.sensor.read_timeout, Duration::from_millis(200));
        assert_eq!(settings.acquisition.poll_interval, Duration::from_millis(100));
        assert_eq!(settings.acquisition.history_len, 5);
        assert_eq!(settings.filter.process_variance, 1e-2);
        assert!((settings.filter.measurement_variance - 0.0025).abs() < 1e-15);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml_with_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "force_daq.toml",
                r#"
                [sensor]
                port = "/dev/ttyUSB0"
                baud_rate = 115200

                [acquisition]
                poll_interval = "20ms"
                history_len = 12
                "#,
            )?;
            jail.set_env("FORCE_DAQ_SENSOR__PORT", "/dev/ttyACM1");

            let settings = Settings::load_from("force_daq.toml").map_err(|e| e.to_string())?;
            assert_eq!(settings.sensor.port.as_deref(), Some("/dev/ttyACM1"));
            assert_eq!(settings.sensor.baud_rate, 115_200);
            assert_eq!(settings.acquisition.poll_interval, Duration::from_millis(20));
            assert_eq!(settings.acquisition.history_len, 12);
            // Untouched sections keep their defaults
            assert_eq!(settings.filter.process_variance, 1e-2);
            Ok(())
        });
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        Jail::expect_with(|_jail| {
            let settings = Settings::load_from("absent.toml").map_err(|e| e.to_string())?;
            assert_eq!(settings.acquisition.history_len, 5);
            Ok(())
        });
    }

    #[test]
    fn test_invalid_duration_is_a_config_error() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "force_daq.toml",
                r#"
                [acquisition]
                poll_interval = "soon"
                "#,
            )?;
            match Settings::load_from("force_daq.toml") {
                Err(DaqError::Config(_)) => Ok(()),
                other => Err(format!("expected config error, got {other:?}").into()),
            }
        });
    }

    #[test]
    fn test_invalid_log_level() {
        let mut settings = Settings::default();
        settings.logging.level = "loud".into();
        assert!(matches!(
            settings.validate(),
            Err(DaqError::Configuration(_))
        ));
    }

    #[test]
    fn test_zero_history_rejected() {
        let mut settings = Settings::default();
        settings.acquisition.history_len = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let mut settings = Settings::default();
        settings.acquisition.poll_interval = Duration::ZERO;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_non_positive_variance_rejected() {
        let mut settings = Settings::default();
        settings.filter.measurement_variance = 0.0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.filter.process_variance = f64::NAN;
        assert!(settings.validate().is_err());
    }
}
