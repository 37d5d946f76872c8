use chrono::{DateTime, Utc};
use serde::Serialize;
use strum_macros::Display;

/// Geodetic point, degrees. Longitude is in [-180, 180).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatLng {
    pub lat_deg: f64,
    pub lng_deg: f64,
}

impl LatLng {
    pub fn new(lat_deg: f64, lng_deg: f64) -> Self {
        Self {
            lat_deg,
            lng_deg: normalize_lng(lng_deg),
        }
    }
}

pub fn normalize_lng(lng_deg: f64) -> f64 {
    (lng_deg + 180.0).rem_euclid(360.0) - 180.0
}

/// Look angles from an observer to a body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Topo {
    pub azimuth_deg: f64,
    pub elevation_deg: f64,
    pub range_km: f64,
    pub range_rate_km_s: f64,
}

/// Next rise and set found by the pass search.
///
/// When both are present and `set_time <= rise_time` the body was already
/// up when the search started: the set ends the current pass and the rise
/// begins the following one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RiseSetResult {
    pub rise_time: Option<DateTime<Utc>>,
    pub rise_azimuth_deg: f64,
    pub set_time: Option<DateTime<Utc>>,
    pub set_azimuth_deg: f64,
    pub ever_above_min_elevation: bool,
    pub ever_below_min_elevation: bool,
}

impl RiseSetResult {
    pub fn rise_valid(&self) -> bool {
        self.rise_time.is_some()
    }

    pub fn set_valid(&self) -> bool {
        self.set_time.is_some()
    }

    /// Both an up and a down sample were seen during the search.
    pub fn ever_rises_and_sets(&self) -> bool {
        self.ever_above_min_elevation && self.ever_below_min_elevation
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
pub enum PassState {
    #[strum(to_string = "No pass")]
    NoPass,
    #[strum(to_string = "Pass ahead")]
    PassAhead,
    #[strum(to_string = "Pass in progress")]
    PassInProgress,
    #[strum(to_string = "Pass ended")]
    JustEnded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassStatus {
    pub state: PassState,
    /// Time until the next transition, or since the set for `JustEnded`.
    pub transition: Option<chrono::Duration>,
}

/// Current circumstances of the selected body, for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SatelliteNow {
    pub name: String,
    pub azimuth_deg: f64,
    pub elevation_deg: f64,
    pub range_km: f64,
    pub range_rate_km_s: f64,
    pub rise_azimuth_deg: Option<f64>,
    pub set_azimuth_deg: Option<f64>,
    pub hours_to_rise: Option<f64>,
    pub hours_to_set: Option<f64>,
    pub pass_state: PassState,
}
