//! Configuration loading and config file resolution
//!
//! Config file resolution follows a fixed priority order:
//! 1. Command-line argument (highest priority)
//! 2. `TOLLSCOPE_CONFIG` environment variable
//! 3. Platform config directory (`~/.config/tollscope/config.toml` on Linux)
//! 4. Compiled defaults (no file)
//!
//! A missing config file is not an error: analysis runs on compiled defaults
//! with a warning. A file that exists but cannot be parsed into the expected
//! shape is a hard error, since running with half-applied settings would
//! silently change trip boundaries or mismatch thresholds.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{Error, Result};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "TOLLSCOPE_CONFIG";

/// Default gap between crossings that ends a trip
pub const DEFAULT_TRIP_TIMEOUT_MINUTES: u32 = 30;

/// Default confirmed reads before a plate/tag pairing can flag a mismatch
pub const DEFAULT_READ_THRESHOLD: i64 = 5;

/// Default minimum evaluation window length
pub const DEFAULT_MIN_WINDOW_DAYS: u32 = 30;

/// Default number of randomized evaluation windows per dictionary cap
pub const DEFAULT_TRIALS: u32 = 30;

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter level; `RUST_LOG` overrides it
    pub level: String,
    /// Optional log file path
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// `[trips]` section: segmentation rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TripsConfig {
    /// Gap (minutes) above which the next crossing starts a new trip
    pub timeout_minutes: u32,
    /// Direction zones after which a trip always ends
    ///
    /// A full location code (e.g. `"SB10"`) is also accepted and matches that
    /// plaza only, a narrower rule than zone membership.
    pub exit_nodes: Vec<String>,
    /// Leading location-code tokens recognised as direction zones
    pub direction_tokens: Vec<String>,
}

impl Default for TripsConfig {
    fn default() -> Self {
        Self {
            timeout_minutes: DEFAULT_TRIP_TIMEOUT_MINUTES,
            exit_nodes: Vec::new(),
            direction_tokens: ["NB", "SB", "EB", "WB"]
                .iter()
                .map(|t| t.to_string())
                .collect(),
        }
    }
}

/// `[avi]` section: mismatch detection and evaluation harness
///
/// Numeric limits are kept signed here so that out-of-range values reach
/// validation with their original value instead of failing as parse errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AviConfig {
    pub read_threshold: i64,
    pub exact_plates: bool,
    pub min_window_days: u32,
    /// Dictionary size caps to evaluate; empty means uncapped only
    pub dictionary_caps: Vec<i64>,
    pub trials: u32,
    /// Fixed RNG seed for reproducible evaluation runs
    pub seed: Option<u64>,
}

impl Default for AviConfig {
    fn default() -> Self {
        Self {
            read_threshold: DEFAULT_READ_THRESHOLD,
            exact_plates: true,
            min_window_days: DEFAULT_MIN_WINDOW_DAYS,
            dictionary_caps: Vec::new(),
            trials: DEFAULT_TRIALS,
            seed: None,
        }
    }
}

/// TOML configuration file contents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub logging: LoggingConfig,
    pub trips: TripsConfig,
    pub avi: AviConfig,
}

impl TomlConfig {
    /// Parse TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }
}

/// Locates the config file following the priority order above
#[derive(Debug, Clone, Default)]
pub struct ConfigFileResolver {
    cli_arg: Option<PathBuf>,
}

impl ConfigFileResolver {
    pub fn new(cli_arg: Option<&Path>) -> Self {
        Self {
            cli_arg: cli_arg.map(Path::to_path_buf),
        }
    }

    /// Resolve the config file path, `None` when only defaults apply
    pub fn resolve(&self) -> Option<PathBuf> {
        // Priority 1: Command-line argument
        if let Some(path) = &self.cli_arg {
            return Some(path.clone());
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        // Priority 3: Platform config directory
        let user_config = default_config_path()?;
        if user_config.exists() {
            Some(user_config)
        } else {
            None
        }
    }

    /// Resolve and load, degrading to defaults when no file is present
    ///
    /// An explicitly requested file (CLI or environment) that does not exist
    /// still degrades to defaults, with a warning naming the path.
    pub fn load(&self) -> Result<TomlConfig> {
        match self.resolve() {
            Some(path) if path.exists() => load_toml_config(&path),
            Some(path) => {
                warn!("Config file not found: {} (using defaults)", path.display());
                Ok(TomlConfig::default())
            }
            None => {
                debug!("No config file found, using compiled defaults");
                Ok(TomlConfig::default())
            }
        }
    }
}

/// Platform default config file path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tollscope").join("config.toml"))
}

/// Load and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed ({}): {}", path.display(), e)))?;
    let config = TomlConfig::from_toml_str(&content)?;
    debug!(path = %path.display(), "Loaded config file");
    Ok(config)
}

/// Write a config file atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, content)?;
    if let Err(e) = std::fs::rename(&temp_path, path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(Error::Io(e));
    }
    Ok(())
}
