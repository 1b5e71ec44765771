use std::net::SocketAddr;
use std::path::PathBuf;

use ayurtrace_core::{GeoFence, SeasonCalendar, Validator};

/// Zones accepted when AYURTRACE_APPROVED_ZONES is unset.
pub const DEFAULT_APPROVED_ZONES: &str = "26.9124,75.7873;28.6139,77.2090";

/// Server configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub db_path: PathBuf,
    pub geo_fence: GeoFence,
    /// `None` accepts every harvest date.
    pub season_calendar: Option<SeasonCalendar>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `var`, which returns a variable's value if set.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let listen_addr = var("AYURTRACE_LISTEN_ADDR")
            .unwrap_or_else(|| "0.0.0.0:3000".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid(
                    "AYURTRACE_LISTEN_ADDR",
                    "must be a valid socket address".to_string(),
                )
            })?;

        let db_path = var("AYURTRACE_DB_PATH")
            .unwrap_or_else(|| "./ayurtrace.redb".to_string())
            .into();

        let zones = var("AYURTRACE_APPROVED_ZONES")
            .unwrap_or_else(|| DEFAULT_APPROVED_ZONES.to_string());
        let geo_fence = GeoFence::parse(&zones)
            .map_err(|e| ConfigError::Invalid("AYURTRACE_APPROVED_ZONES", e.to_string()))?;

        let season_calendar = match var("AYURTRACE_SEASON_CALENDAR") {
            Some(s) if !s.trim().is_empty() => Some(
                SeasonCalendar::parse(&s)
                    .map_err(|e| ConfigError::Invalid("AYURTRACE_SEASON_CALENDAR", e.to_string()))?,
            ),
            _ => None,
        };

        Ok(Config {
            listen_addr,
            db_path,
            geo_fence,
            season_calendar,
        })
    }

    /// Build the validator described by this configuration.
    pub fn validator(&self) -> Validator {
        let validator = Validator::new(self.geo_fence.clone());
        match &self.season_calendar {
            Some(calendar) => validator.with_season_policy(calendar.clone()),
            None => validator,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Invalid(&'static str, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid(var, msg) => write!(f, "Invalid value for {}: {}", var, msg),
        }
    }
}

impl std::error::Error for ConfigError {}
