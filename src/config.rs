use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;
use thiserror::Error;

use crate::gimbal::{ControllerSettings, DEFAULT_DEADBAND_DEG, DEFAULT_UPOVER_EPSILON_DEG};
use crate::predict::{GroundStation, SearchParams, DEFAULT_MAX_PATH_POINTS};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid coordinates `{0}`, expected \"lat, lon\"")]
    InvalidCoordinates(String),
    #[error("invalid duration for {field}: {message}")]
    InvalidDuration { field: &'static str, message: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub station: StationConfig,
    #[serde(default)]
    pub dx: Option<DxConfig>,
    #[serde(default)]
    pub rotator: RotatorConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub tle: TleConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StationConfig {
    pub name: Option<String>,
    pub coordinates: String,
    #[serde(default)]
    pub altitude_m: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DxConfig {
    pub coordinates: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RotatorConfig {
    #[serde(default = "default_rotator_address")]
    pub address: String,
    #[serde(default = "default_rotator_timeout")]
    pub timeout: String,
    #[serde(default = "default_tick")]
    pub tick: String,
    #[serde(default = "default_deadband")]
    pub deadband_deg: f64,
}

impl Default for RotatorConfig {
    fn default() -> Self {
        Self {
            address: default_rotator_address(),
            timeout: default_rotator_timeout(),
            tick: default_tick(),
            deadband_deg: default_deadband(),
        }
    }
}

fn default_rotator_address() -> String {
    "localhost:4533".to_string()
}

fn default_rotator_timeout() -> String {
    "2s".to_string()
}

fn default_tick() -> String {
    "1s".to_string()
}

fn default_deadband() -> f64 {
    DEFAULT_DEADBAND_DEG
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackingConfig {
    #[serde(default)]
    pub min_elevation_deg: f64,
    #[serde(default = "default_coarse_step")]
    pub coarse_step: String,
    /// Refinement resolution; the search walks backward by this much.
    #[serde(default = "default_fine_step")]
    pub fine_step: String,
    #[serde(default = "default_horizon")]
    pub horizon: String,
    #[serde(default = "default_upover_epsilon")]
    pub upover_epsilon_deg: f64,
    #[serde(default = "default_max_path_points")]
    pub max_path_points: usize,
    /// Start the gimbal in auto-track.
    #[serde(default)]
    pub auto: bool,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            min_elevation_deg: 0.0,
            coarse_step: default_coarse_step(),
            fine_step: default_fine_step(),
            horizon: default_horizon(),
            upover_epsilon_deg: default_upover_epsilon(),
            max_path_points: default_max_path_points(),
            auto: false,
        }
    }
}

fn default_coarse_step() -> String {
    "90s".to_string()
}

fn default_fine_step() -> String {
    "2s".to_string()
}

fn default_horizon() -> String {
    "2days".to_string()
}

fn default_upover_epsilon() -> f64 {
    DEFAULT_UPOVER_EPSILON_DEG
}

fn default_max_path_points() -> usize {
    DEFAULT_MAX_PATH_POINTS
}

#[derive(Debug, Clone, Deserialize)]
pub struct TleConfig {
    #[serde(default = "default_tle_folder")]
    pub folder: PathBuf,
    pub satellite: Option<String>,
    #[serde(default = "default_fetch_attempts")]
    pub fetch_attempts: u32,
    #[serde(default = "default_fetch_backoff")]
    pub fetch_backoff: String,
}

impl Default for TleConfig {
    fn default() -> Self {
        Self {
            folder: default_tle_folder(),
            satellite: None,
            fetch_attempts: default_fetch_attempts(),
            fetch_backoff: default_fetch_backoff(),
        }
    }
}

fn default_tle_folder() -> PathBuf {
    PathBuf::from("tles")
}

fn default_fetch_attempts() -> u32 {
    3
}

fn default_fetch_backoff() -> String {
    "2s".to_string()
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse every derived value once so a bad file fails at load time.
    fn validate(&self) -> Result<(), ConfigError> {
        self.station()?;
        self.dx()?;
        self.search_params()?;
        self.rotator_timeout()?;
        self.tick_interval()?;
        self.fetch_backoff()?;
        Ok(())
    }

    pub fn station(&self) -> Result<GroundStation, ConfigError> {
        GroundStation::from_coordinates(&self.station.coordinates, Some(self.station.altitude_m))
            .ok_or_else(|| ConfigError::InvalidCoordinates(self.station.coordinates.clone()))
    }

    pub fn dx(&self) -> Result<Option<GroundStation>, ConfigError> {
        self.dx
            .as_ref()
            .map(|dx| {
                GroundStation::from_coordinates(&dx.coordinates, None)
                    .ok_or_else(|| ConfigError::InvalidCoordinates(dx.coordinates.clone()))
            })
            .transpose()
    }

    pub fn search_params(&self) -> Result<SearchParams, ConfigError> {
        let t = &self.tracking;
        Ok(SearchParams {
            min_elevation_deg: t.min_elevation_deg,
            coarse_step: chrono_duration("tracking.coarse_step", &t.coarse_step)?,
            fine_step: -chrono_duration("tracking.fine_step", &t.fine_step)?,
            horizon: chrono_duration("tracking.horizon", &t.horizon)?,
        })
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            deadband_deg: self.rotator.deadband_deg,
            upover_epsilon_deg: self.tracking.upover_epsilon_deg,
        }
    }

    pub fn rotator_timeout(&self) -> Result<StdDuration, ConfigError> {
        std_duration("rotator.timeout", &self.rotator.timeout)
    }

    pub fn tick_interval(&self) -> Result<StdDuration, ConfigError> {
        std_duration("rotator.tick", &self.rotator.tick)
    }

    pub fn fetch_backoff(&self) -> Result<StdDuration, ConfigError> {
        std_duration("tle.fetch_backoff", &self.tle.fetch_backoff)
    }
}

fn std_duration(field: &'static str, s: &str) -> Result<StdDuration, ConfigError> {
    let d = humantime::parse_duration(s.trim()).map_err(|e| ConfigError::InvalidDuration {
        field,
        message: e.to_string(),
    })?;
    if d.is_zero() {
        return Err(ConfigError::InvalidDuration {
            field,
            message: "must be positive".to_string(),
        });
    }
    Ok(d)
}

fn chrono_duration(field: &'static str, s: &str) -> Result<chrono::Duration, ConfigError> {
    chrono::Duration::from_std(std_duration(field, s)?).map_err(|e| ConfigError::InvalidDuration {
        field,
        message: e.to_string(),
    })
}
