//! Configuration System
//!
//! Handles loading configuration from TOML files and environment variables.
//! Durations (slot width, reduction windows) are given as strings like
//! "500ms", "30s", "15m", "6h", "1d", or "2w".

use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::storage::{InterpolationMode, RecorderConfig, StorageError, StorageResult, SyncMode};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Recording engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Width of each slot's time window, as a duration string
    #[serde(default = "default_slot_width")]
    pub slot_width: String,

    /// Durability strategy: "everywrite", "batched", or "none"
    #[serde(default)]
    pub sync: SyncMode,

    /// Interpolation mode for series created implicitly by record
    #[serde(default)]
    pub default_interpolation: InterpolationMode,
}

fn default_data_dir() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("slotdb").to_string_lossy().to_string())
        .unwrap_or_else(|| "./slotdb_data".to_string())
}

fn default_slot_width() -> String {
    "1d".to_string()
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            slot_width: default_slot_width(),
            sync: SyncMode::default(),
            default_interpolation: InterpolationMode::default(),
        }
    }
}

impl StorageSettings {
    /// Resolve into the typed recorder configuration.
    ///
    /// Slot widths below one second are rejected: sub-second slots create
    /// pathological file counts even for high-frequency sensors.
    pub fn recorder_config(&self) -> StorageResult<RecorderConfig> {
        let slot_width = parse_duration_ms(&self.slot_width)?;
        if slot_width < 1000 {
            return Err(StorageError::Config(format!(
                "slot width {} is below the 1s minimum",
                self.slot_width
            )));
        }
        Ok(RecorderConfig {
            data_dir: PathBuf::from(&self.data_dir),
            slot_width,
            sync_mode: self.sync,
            default_mode: self.default_interpolation,
        })
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> StorageResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            StorageError::Config(format!("failed to read {:?}: {}", path, e))
        })?;
        toml::from_str(&content)
            .map_err(|e| StorageError::Config(format!("failed to parse {:?}: {}", path, e)))
    }

    /// Load from an explicit path, or fall back through the default
    /// locations, or the built-in defaults. Environment variables
    /// (`SLOTDB_DATA_DIR`, `SLOTDB_SLOT_WIDTH`, `SLOTDB_LOG_LEVEL`)
    /// override either way.
    pub fn load_default(path: Option<&Path>) -> StorageResult<Self> {
        let mut config = if let Some(path) = path {
            Self::load(path)?
        } else {
            let candidates = [
                dirs::config_dir().map(|p| p.join("slotdb").join("config.toml")),
                Some(PathBuf::from("./slotdb.toml")),
            ];
            let mut found = None;
            for candidate in candidates.iter().flatten() {
                if candidate.exists() {
                    tracing::info!("loading config from {:?}", candidate);
                    found = Some(Self::load(candidate)?);
                    break;
                }
            }
            found.unwrap_or_default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(data_dir) = std::env::var("SLOTDB_DATA_DIR") {
            self.storage.data_dir = data_dir;
        }
        if let Ok(width) = std::env::var("SLOTDB_SLOT_WIDTH") {
            self.storage.slot_width = width;
        }
        if let Ok(level) = std::env::var("SLOTDB_LOG_LEVEL") {
            self.logging.level = level;
        }
    }
}

/// Parse a duration string like "500ms", "30s", "15m", "6h", "1d", "2w"
/// into milliseconds.
pub fn parse_duration_ms(s: &str) -> StorageResult<i64> {
    let re = Regex::new(r"^(\d+)\s*(ms|s|m|h|d|w)$")
        .map_err(|e| StorageError::Config(e.to_string()))?;
    let caps = re.captures(s.trim()).ok_or_else(|| {
        StorageError::Config(format!(
            "invalid duration: {:?} (use e.g. 500ms, 30s, 15m, 6h, 1d, 2w)",
            s
        ))
    })?;

    let amount: i64 = caps[1]
        .parse()
        .map_err(|_| StorageError::Config(format!("duration out of range: {:?}", s)))?;
    let unit_ms = match &caps[2] {
        "ms" => 1,
        "s" => 1000,
        "m" => 60 * 1000,
        "h" => 3600 * 1000,
        "d" => 24 * 3600 * 1000,
        "w" => 7 * 24 * 3600 * 1000,
        _ => unreachable!(),
    };
    amount
        .checked_mul(unit_ms)
        .ok_or_else(|| StorageError::Config(format!("duration out of range: {:?}", s)))
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# slotdb configuration
#
# Environment variables override these settings:
# - SLOTDB_DATA_DIR
# - SLOTDB_SLOT_WIDTH
# - SLOTDB_LOG_LEVEL

[storage]
# Directory for series data
data_dir = "~/.local/share/slotdb"

# Width of each slot's time window (500ms/30s/15m/6h/1d/2w).
# One day suits sparse event data; shrink it for high-frequency sensors.
slot_width = "1d"

# Durability: "everywrite" fsyncs per append, "batched" fsyncs on a byte
# threshold and on flush, "none" leaves syncing to the OS.
sync = "batched"

# Interpolation mode for series created implicitly: "none", "steps", "linear"
default_interpolation = "none"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty or json
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration_ms("500ms").unwrap(), 500);
        assert_eq!(parse_duration_ms("30s").unwrap(), 30_000);
        assert_eq!(parse_duration_ms("15m").unwrap(), 900_000);
        assert_eq!(parse_duration_ms("6h").unwrap(), 21_600_000);
        assert_eq!(parse_duration_ms("1d").unwrap(), 86_400_000);
        assert_eq!(parse_duration_ms("2w").unwrap(), 1_209_600_000);
        assert_eq!(parse_duration_ms(" 1d ").unwrap(), 86_400_000);
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        for bad in ["", "1", "d", "-1d", "1.5h", "1 day"] {
            assert!(parse_duration_ms(bad).is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        let recorder = config.storage.recorder_config().unwrap();
        assert_eq!(recorder.slot_width, 86_400_000);
        assert_eq!(recorder.sync_mode, SyncMode::Batched);
        assert_eq!(recorder.default_mode, InterpolationMode::None);
    }

    #[test]
    fn test_generated_config_parses() {
        let config: Config = toml::from_str(&generate_default_config()).unwrap();
        assert_eq!(config.storage.slot_width, "1d");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_sub_second_slot_width_rejected() {
        let settings = StorageSettings {
            slot_width: "500ms".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            settings.recorder_config(),
            Err(StorageError::Config(_))
        ));
    }

    #[test]
    fn test_toml_overrides() {
        let config: Config = toml::from_str(
            r#"
            [storage]
            data_dir = "/tmp/sensors"
            slot_width = "6h"
            sync = "everywrite"
            default_interpolation = "steps"
            "#,
        )
        .unwrap();

        let recorder = config.storage.recorder_config().unwrap();
        assert_eq!(recorder.data_dir, PathBuf::from("/tmp/sensors"));
        assert_eq!(recorder.slot_width, 21_600_000);
        assert_eq!(recorder.sync_mode, SyncMode::EveryWrite);
        assert_eq!(recorder.default_mode, InterpolationMode::Steps);
    }
}
