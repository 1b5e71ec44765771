use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Datelike};

use crate::error::ValidationError;

/// Approved collection zones.
///
/// Membership is an exact match on the `"lat,lon"` string, no tolerance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeoFence {
    zones: HashSet<String>,
}

impl GeoFence {
    pub fn new<I, S>(zones: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            zones: zones.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a `;`-separated zone list such as `"26.9124,75.7873;28.6139,77.2090"`.
    /// Each zone must be a pair of in-range coordinates.
    pub fn parse(list: &str) -> Result<Self, ValidationError> {
        let mut zones = HashSet::new();
        for zone in list.split(';') {
            let zone = zone.trim();
            if zone.is_empty() {
                continue;
            }
            Self::validate_zone(zone)?;
            zones.insert(zone.to_string());
        }
        Ok(Self { zones })
    }

    fn validate_zone(zone: &str) -> Result<(), ValidationError> {
        let (lat, lon) = zone
            .split_once(',')
            .ok_or_else(|| ValidationError::InvalidZone(zone.to_string()))?;
        let lat: f64 = lat
            .parse()
            .map_err(|_| ValidationError::InvalidZone(zone.to_string()))?;
        let lon: f64 = lon
            .parse()
            .map_err(|_| ValidationError::InvalidZone(zone.to_string()))?;
        Validator::validate_latitude(lat)?;
        Validator::validate_longitude(lon)?;
        Ok(())
    }

    pub fn contains(&self, coords: &str) -> bool {
        self.zones.contains(coords)
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

/// Decides whether a harvest of `crop_id` at `timestamp` is in season.
pub trait SeasonPolicy: Send + Sync {
    fn in_season(&self, crop_id: &str, timestamp: i64) -> bool;
}

/// Accepts every harvest. Used when no calendar is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnySeason;

impl SeasonPolicy for AnySeason {
    fn in_season(&self, _crop_id: &str, _timestamp: i64) -> bool {
        true
    }
}

/// Inclusive month range; `start > end` wraps over the new year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthWindow {
    start: u32,
    end: u32,
}

impl MonthWindow {
    pub fn new(start: u32, end: u32) -> Result<Self, ValidationError> {
        for month in [start, end] {
            if !(1..=12).contains(&month) {
                return Err(ValidationError::InvalidMonth(month));
            }
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, month: u32) -> bool {
        if self.start <= self.end {
            (self.start..=self.end).contains(&month)
        } else {
            month >= self.start || month <= self.end
        }
    }
}

/// Harvest windows per crop (UTC months). Crops without an entry are
/// accepted.
#[derive(Debug, Clone, Default)]
pub struct SeasonCalendar {
    windows: HashMap<String, MonthWindow>,
}

impl SeasonCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_window(mut self, crop_id: &str, window: MonthWindow) -> Self {
        self.windows.insert(crop_id.to_ascii_lowercase(), window);
        self
    }

    /// Parse entries like `"ashwagandha:11-3;tulsi:6-9"`.
    pub fn parse(entries: &str) -> Result<Self, ValidationError> {
        let mut calendar = Self::new();
        for entry in entries.split(';') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let invalid = || ValidationError::InvalidSeasonEntry(entry.to_string());
            let (crop, range) = entry.split_once(':').ok_or_else(invalid)?;
            let (start, end) = range.split_once('-').ok_or_else(invalid)?;
            let start = start.trim().parse().map_err(|_| invalid())?;
            let end = end.trim().parse().map_err(|_| invalid())?;
            let crop = crop.trim();
            if crop.is_empty() {
                return Err(invalid());
            }
            calendar = calendar.with_window(crop, MonthWindow::new(start, end)?);
        }
        Ok(calendar)
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

impl SeasonPolicy for SeasonCalendar {
    fn in_season(&self, crop_id: &str, timestamp: i64) -> bool {
        let Some(window) = self.windows.get(&crop_id.to_ascii_lowercase()) else {
            return true;
        };
        match DateTime::from_timestamp(timestamp, 0) {
            Some(at) => window.contains(at.month()),
            None => false,
        }
    }
}

/// Plausibility checks applied to incoming records.
pub struct Validator {
    geo_fence: GeoFence,
    seasons: Box<dyn SeasonPolicy>,
}

impl Validator {
    /// Validator with the given zones and no season calendar.
    pub fn new(geo_fence: GeoFence) -> Self {
        Self {
            geo_fence,
            seasons: Box::new(AnySeason),
        }
    }

    pub fn with_season_policy(mut self, policy: impl SeasonPolicy + 'static) -> Self {
        self.seasons = Box::new(policy);
        self
    }

    pub fn validate_geo_fence(&self, coords: &str) -> bool {
        self.geo_fence.contains(coords)
    }

    pub fn validate_season(&self, crop_id: &str, timestamp: i64) -> bool {
        self.seasons.in_season(crop_id, timestamp)
    }

    /// A certificate is valid strictly before its expiry.
    pub fn certification_valid(expiry_date: i64, now: i64) -> bool {
        now < expiry_date
    }

    /// Record and batch IDs become ledger keys and must be non-empty.
    pub fn validate_record_id(field: &str, id: &str) -> Result<(), ValidationError> {
        if id.trim().is_empty() {
            return Err(ValidationError::InvalidRecordId(format!(
                "{field} cannot be empty"
            )));
        }
        Ok(())
    }

    /// Rejects NaN and anything outside [-90, 90].
    pub fn validate_latitude(lat: f64) -> Result<(), ValidationError> {
        if lat.is_nan() || !(-90.0..=90.0).contains(&lat) {
            return Err(ValidationError::InvalidLatitude(lat));
        }
        Ok(())
    }

    /// Rejects NaN and anything outside [-180, 180].
    pub fn validate_longitude(lon: f64) -> Result<(), ValidationError> {
        if lon.is_nan() || !(-180.0..=180.0).contains(&lon) {
            return Err(ValidationError::InvalidLongitude(lon));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator")
            .field("geo_fence", &self.geo_fence)
            .finish_non_exhaustive()
    }
}
