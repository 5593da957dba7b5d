//! Configuration for the mood-mirror agent.

use crate::core::aggregator::{AbsencePolicy, Strategy, DEFAULT_CYCLE_PERIOD};
use crate::core::emoji::LAUGH_THRESHOLD;
use crate::core::windowing::DEFAULT_MAX_SAMPLES;
use crate::sampler::Cadence;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main configuration for the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Time between label decisions
    #[serde(with = "duration_ms")]
    pub cycle_period: Duration,

    /// Windowed sum or throttled per-sample labels
    pub strategy: Strategy,

    /// Cap on buffered samples per window (None = bounded by the cycle only)
    pub max_samples: Option<usize>,

    /// What a frame without a face does to the label
    pub absence: AbsencePolicy,

    /// How often the detector is invoked
    pub cadence: Cadence,

    /// Happy scores above this show the laughing emoji
    pub laugh_threshold: f64,

    /// Path for exported label histories
    pub export_path: PathBuf,

    /// Path for session statistics
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mood-mirror");

        Self {
            cycle_period: DEFAULT_CYCLE_PERIOD,
            strategy: Strategy::Windowed,
            max_samples: Some(DEFAULT_MAX_SAMPLES),
            absence: AbsencePolicy::Immediate,
            cadence: Cadence::default(),
            laugh_threshold: LAUGH_THRESHOLD,
            export_path: data_dir.join("exports"),
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content).map_err(ConfigError::Parse)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(&config_path, content)?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mood-mirror")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.export_path)?;
        std::fs::create_dir_all(&self.data_path)?;
        Ok(())
    }

    /// Reject values the loop cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cycle_period.is_zero() {
            return Err(ConfigError::Invalid("cycle_period must be positive".to_string()));
        }
        if self.max_samples == Some(0) {
            return Err(ConfigError::Invalid("max_samples must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&self.laugh_threshold) {
            return Err(ConfigError::Invalid(
                "laugh_threshold must be within [0, 1]".to_string(),
            ));
        }
        if let Cadence::FixedInterval { period } = self.cadence {
            if period.is_zero() {
                return Err(ConfigError::Invalid(
                    "fixed interval period must be positive".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn stats_path(&self) -> PathBuf {
        self.data_path.join("stats.json")
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Serde support for Duration as whole milliseconds.
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.cycle_period, Duration::from_millis(1000));
        assert_eq!(config.strategy, Strategy::Windowed);
        assert_eq!(config.max_samples, Some(30));
        assert_eq!(config.absence, AbsencePolicy::Immediate);
        assert_eq!(config.laugh_threshold, 0.8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_round_trip_uses_millis() {
        let config = Config {
            cycle_period: Duration::from_millis(750),
            cadence: Cadence::FixedInterval {
                period: Duration::from_millis(1000),
            },
            ..Config::default()
        };

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["cycle_period"], 750);
        assert_eq!(json["cadence"]["mode"], "fixed_interval");
        assert_eq!(json["cadence"]["period"], 1000);

        let back: Config = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"strategy":"instantaneous","absence":"tolerate"}"#).unwrap();
        assert_eq!(config.strategy, Strategy::Instantaneous);
        assert_eq!(config.absence, AbsencePolicy::Tolerate);
        assert_eq!(config.cycle_period, DEFAULT_CYCLE_PERIOD);
    }

    #[test]
    fn test_validate_rejects_zero_cycle() {
        let config = Config {
            cycle_period: Duration::ZERO,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
