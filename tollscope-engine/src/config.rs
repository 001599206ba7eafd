//! Validated engine settings
//!
//! Converts the raw `[trips]` and `[avi]` TOML sections into settings the
//! services can use without further checks. Every validation failure surfaces
//! here, before any record is processed.

use std::collections::HashSet;

use chrono::Duration;
use tollscope_common::config::{
    AviConfig, TomlConfig, TripsConfig, DEFAULT_MIN_WINDOW_DAYS, DEFAULT_READ_THRESHOLD,
    DEFAULT_TRIALS, DEFAULT_TRIP_TIMEOUT_MINUTES,
};
use tollscope_common::time::minutes_to_duration;
use tollscope_common::{Error, Result};

/// Trip segmentation rules
#[derive(Debug, Clone, PartialEq)]
pub struct TripSettings {
    /// Gap strictly above which an interior crossing starts a new trip
    pub trip_timeout: Duration,
    /// Location codes or direction zones after which a trip always ends
    pub exit_nodes: HashSet<String>,
    /// Direction tokens, matched as location-code prefixes in this order
    pub direction_tokens: Vec<String>,
}

impl Default for TripSettings {
    fn default() -> Self {
        Self {
            trip_timeout: minutes_to_duration(DEFAULT_TRIP_TIMEOUT_MINUTES),
            exit_nodes: HashSet::new(),
            direction_tokens: TripsConfig::default().direction_tokens,
        }
    }
}

impl TripSettings {
    pub fn from_config(config: &TripsConfig) -> Result<Self> {
        if config.timeout_minutes == 0 {
            return Err(Error::InvalidInput(
                "trips.timeout_minutes must be at least 1".to_string(),
            ));
        }
        if config.direction_tokens.is_empty() {
            return Err(Error::InvalidInput(
                "trips.direction_tokens must name at least one token".to_string(),
            ));
        }
        if config.direction_tokens.iter().any(|t| t.trim().is_empty()) {
            return Err(Error::InvalidInput(
                "trips.direction_tokens must not contain blank tokens".to_string(),
            ));
        }
        if config.exit_nodes.iter().any(|n| n.trim().is_empty()) {
            return Err(Error::InvalidInput(
                "trips.exit_nodes must not contain blank entries".to_string(),
            ));
        }

        Ok(Self {
            trip_timeout: minutes_to_duration(config.timeout_minutes),
            exit_nodes: config.exit_nodes.iter().cloned().collect(),
            direction_tokens: config.direction_tokens.clone(),
        })
    }

    /// Replace the exit node set
    pub fn with_exit_nodes<I, S>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exit_nodes = nodes.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the trip timeout
    pub fn with_trip_timeout(mut self, timeout: Duration) -> Self {
        self.trip_timeout = timeout;
        self
    }
}

/// Mismatch detection and evaluation settings
#[derive(Debug, Clone, PartialEq)]
pub struct AviSettings {
    /// Confirmed reads a plate/tag pairing needs before it may flag a mismatch
    pub read_threshold: u32,
    /// Match plates exactly, or through OCR-confusion variants
    pub exact_plates: bool,
    /// Minimum evaluation window length
    pub min_window: Duration,
    /// Dictionary caps to evaluate (`None` = uncapped)
    pub dictionary_caps: Vec<Option<usize>>,
    /// Randomized windows per cap
    pub trials: u32,
    pub seed: Option<u64>,
}

impl Default for AviSettings {
    fn default() -> Self {
        Self {
            read_threshold: DEFAULT_READ_THRESHOLD as u32,
            exact_plates: true,
            min_window: Duration::days(i64::from(DEFAULT_MIN_WINDOW_DAYS)),
            dictionary_caps: vec![None],
            trials: DEFAULT_TRIALS,
            seed: None,
        }
    }
}

impl AviSettings {
    pub fn from_config(config: &AviConfig) -> Result<Self> {
        let read_threshold = validate_read_threshold(config.read_threshold)?;

        if config.min_window_days == 0 {
            return Err(Error::InvalidInput(
                "avi.min_window_days must be at least 1".to_string(),
            ));
        }
        if config.trials == 0 {
            return Err(Error::InvalidInput("avi.trials must be at least 1".to_string()));
        }

        let dictionary_caps = if config.dictionary_caps.is_empty() {
            vec![None]
        } else {
            config
                .dictionary_caps
                .iter()
                .map(|&cap| validate_dictionary_cap(cap).map(Some))
                .collect::<Result<Vec<_>>>()?
        };

        Ok(Self {
            read_threshold,
            exact_plates: config.exact_plates,
            min_window: Duration::days(i64::from(config.min_window_days)),
            dictionary_caps,
            trials: config.trials,
            seed: config.seed,
        })
    }
}

/// Read threshold must be a positive count
pub fn validate_read_threshold(value: i64) -> Result<u32> {
    if value < 1 {
        return Err(Error::InvalidInput(format!(
            "read threshold must be at least 1 (got {})",
            value
        )));
    }
    u32::try_from(value)
        .map_err(|_| Error::InvalidInput(format!("read threshold too large: {}", value)))
}

/// Dictionary size caps cannot be negative
pub fn validate_dictionary_cap(value: i64) -> Result<usize> {
    usize::try_from(value)
        .map_err(|_| Error::InvalidInput(format!("dictionary cap must not be negative (got {})", value)))
}

/// All engine settings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineSettings {
    pub trips: TripSettings,
    pub avi: AviSettings,
}

impl EngineSettings {
    pub fn from_config(config: &TomlConfig) -> Result<Self> {
        Ok(Self {
            trips: TripSettings::from_config(&config.trips)?,
            avi: AviSettings::from_config(&config.avi)?,
        })
    }
}
