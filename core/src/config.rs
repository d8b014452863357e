//! Configuration for the localization filter and the headless simulation
//!
//! Both structures are plain serde types with defaults for every field, so a configuration file
//! only needs to name the values it changes. Files are read and written by extension:
//! `.json`, `.yaml`/`.yml` or `.toml`.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LocalizationError, Result};
use crate::geometry::Environment;
use crate::particle::{
    DEFAULT_MOTION_NOISE_STD, DEFAULT_MOVE_SPEED, MoveCommand, ParticleResamplingStrategy,
};
use crate::sensor::DEFAULT_SENSOR_NOISE_STD;

/// Tuning parameters of the particle filter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Number of particles, fixed for the run
    pub num_particles: usize,
    /// Standard deviation of the per-particle motion noise (may be zero)
    pub motion_noise_std: f64,
    /// Scale applied to each movement command
    pub move_speed: f64,
    /// Standard deviation of the range sensor noise (must be positive)
    pub sensor_noise_std: f64,
    pub resampling_strategy: ParticleResamplingStrategy,
    /// Seed for the filter's random source
    pub seed: u64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            num_particles: 500,
            motion_noise_std: DEFAULT_MOTION_NOISE_STD,
            move_speed: DEFAULT_MOVE_SPEED,
            sensor_noise_std: DEFAULT_SENSOR_NOISE_STD,
            resampling_strategy: ParticleResamplingStrategy::Multinomial,
            seed: 42,
        }
    }
}

impl FilterConfig {
    /// Surface caller errors before a run starts.
    pub fn validate(&self) -> Result<()> {
        if self.num_particles == 0 {
            return Err(LocalizationError::InvalidArgument(
                "num_particles must be positive".to_string(),
            ));
        }
        if !(self.motion_noise_std.is_finite() && self.motion_noise_std >= 0.0) {
            return Err(LocalizationError::InvalidArgument(format!(
                "motion_noise_std must be non-negative, got {}",
                self.motion_noise_std
            )));
        }
        if !self.move_speed.is_finite() {
            return Err(LocalizationError::InvalidArgument(format!(
                "move_speed must be finite, got {}",
                self.move_speed
            )));
        }
        if !(self.sensor_noise_std.is_normal() && self.sensor_noise_std > 0.0) {
            return Err(LocalizationError::InvalidArgument(format!(
                "sensor_noise_std must be positive and normal, got {}",
                self.sensor_noise_std
            )));
        }
        Ok(())
    }
}

/// Logging preferences for the command-line front end.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (off, error, warn, info, debug, trace)
    pub level: String,
    /// Log file path; logs go to stderr when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Full configuration of a headless drive-loop run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub filter: FilterConfig,
    pub environment: Environment,
    /// Number of cycles to run
    pub steps: usize,
    /// Scripted commands, cycled if shorter than `steps`. Empty means a seeded random walk.
    pub commands: Vec<MoveCommand>,
    /// Number of consecutive cycles a random-walk command is held before a new one is drawn
    pub command_hold: usize,
    /// Where to write the per-cycle CSV, if anywhere
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    pub logging: LoggingConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            filter: FilterConfig::default(),
            environment: Environment::default_layout(),
            steps: 200,
            commands: Vec::new(),
            command_hold: 10,
            output: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        self.filter.validate()?;
        self.environment.validate()?;
        if self.command_hold == 0 {
            return Err(LocalizationError::InvalidArgument(
                "command_hold must be positive".to_string(),
            ));
        }
        match self
            .commands
            .iter()
            .find(|c| !(c.dx.is_finite() && c.dy.is_finite()))
        {
            Some(c) => Err(LocalizationError::InvalidArgument(format!(
                "scripted command ({}, {}) is not finite",
                c.dx, c.dy
            ))),
            None => Ok(()),
        }
    }

    /// Render the configuration in the given format.
    pub fn to_string_as(&self, format: ConfigFormat) -> io::Result<String> {
        match format {
            ConfigFormat::Json => serde_json::to_string_pretty(self).map_err(io::Error::other),
            ConfigFormat::Yaml => serde_yaml::to_string(self).map_err(io::Error::other),
            ConfigFormat::Toml => toml::to_string_pretty(self).map_err(io::Error::other),
        }
    }

    /// Parse a configuration; fields missing from `text` keep their defaults.
    pub fn from_str_as(text: &str, format: ConfigFormat) -> io::Result<Self> {
        match format {
            ConfigFormat::Json => serde_json::from_str(text).map_err(io::Error::other),
            ConfigFormat::Yaml => serde_yaml::from_str(text).map_err(io::Error::other),
            ConfigFormat::Toml => toml::from_str(text).map_err(io::Error::other),
        }
    }

    /// Save to `path` in the format its extension names.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let path = path.as_ref();
        let text = self.to_string_as(ConfigFormat::from_path(path)?)?;
        fs::write(path, text)
    }

    /// Load from `path` in the format its extension names.
    pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;
        Self::from_str_as(&fs::read_to_string(path)?, format)
    }
}

/// Serialization formats a [`SimulationConfig`] can be stored in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
    Toml,
}

impl ConfigFormat {
    /// Infer the format from `.json`, `.yaml`/`.yml` or `.toml` (any case). Anything else is
    /// an `InvalidInput` error.
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("json") => Ok(ConfigFormat::Json),
            Some("yaml" | "yml") => Ok(ConfigFormat::Yaml),
            Some("toml") => Ok(ConfigFormat::Toml),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("no configuration format for '{}'", path.display()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("mcl_config_{}_{name}", std::process::id()))
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = SimulationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.filter.num_particles, 500);
        assert_eq!(config.filter.motion_noise_std, 0.5);
        assert_eq!(config.filter.sensor_noise_std, 1.0);
        assert_eq!(config.environment.obstacles.len(), 7);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = FilterConfig::default();
        config.num_particles = 0;
        assert!(config.validate().is_err());

        let mut config = FilterConfig::default();
        config.sensor_noise_std = 0.0;
        assert!(config.validate().is_err());
        config.sensor_noise_std = 1e-310;
        assert!(config.validate().is_err());

        let mut config = FilterConfig::default();
        config.motion_noise_std = -1.0;
        assert!(config.validate().is_err());

        let mut config = SimulationConfig::default();
        config.commands = vec![MoveCommand::new(f64::NAN, 0.0)];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_file_formats() {
        let mut config = SimulationConfig::default();
        config.steps = 17;
        config.filter.resampling_strategy = ParticleResamplingStrategy::Systematic;
        config.commands = vec![MoveCommand::LEFT, MoveCommand::DOWN];
        for ext in ["json", "yaml", "toml"] {
            let path = temp_path(&format!("roundtrip.{ext}"));
            config.to_file(&path).expect("write config");
            let loaded = SimulationConfig::from_file(&path).expect("read config");
            assert_eq!(loaded, config, "format {ext}");
            let _ = std::fs::remove_file(&path);
        }
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let path = temp_path("partial.toml");
        std::fs::write(&path, "steps = 5\n\n[filter]\nnum_particles = 64\n").unwrap();
        let loaded = SimulationConfig::from_file(&path).unwrap();
        assert_eq!(loaded.steps, 5);
        assert_eq!(loaded.filter.num_particles, 64);
        assert_eq!(loaded.filter.seed, 42);
        assert_eq!(loaded.environment, Environment::default_layout());
        assert_eq!(loaded.logging.level, "info");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_unsupported_extension() {
        let err = SimulationConfig::default()
            .to_file(temp_path("config.ini"))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        let err = SimulationConfig::from_file("config.txt").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_format_from_extension_ignores_case() {
        assert_eq!(
            ConfigFormat::from_path(Path::new("a/b.YML")).unwrap(),
            ConfigFormat::Yaml
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("run.Toml")).unwrap(),
            ConfigFormat::Toml
        );
        assert!(ConfigFormat::from_path(Path::new("no_extension")).is_err());
    }

    #[test]
    fn test_string_roundtrip_in_memory() {
        let mut config = SimulationConfig::default();
        config.output = Some("out/results.csv".to_string());
        for format in [ConfigFormat::Json, ConfigFormat::Yaml, ConfigFormat::Toml] {
            let text = config.to_string_as(format).unwrap();
            let loaded = SimulationConfig::from_str_as(&text, format).unwrap();
            assert_eq!(loaded, config, "{format:?}");
        }
    }
}
