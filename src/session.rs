use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};

use crate::predict::{
    check_epoch_age, classify, fetch_with_retry, find_next_pass, sample_path, ElementSource,
    GroundStation, MapProjection, MoonOrbit, OrbitModel, PassState, PassStatus, PredictError,
    RiseSetResult, SatPath, SatelliteNow, SearchParams, Sgp4Orbit, DEFAULT_MAX_PATH_POINTS,
    MOON_NAME,
};

/// A search that found no pass is retried after this long.
const NO_PASS_RESEARCH: Duration = Duration::hours(1);

/// What the gimbal needs to know about the selected body at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetView {
    pub azimuth_deg: f64,
    pub elevation_deg: f64,
    pub min_elevation_deg: f64,
    pub rise_azimuth_deg: Option<f64>,
    pub set_azimuth_deg: Option<f64>,
    /// The last search saw the body above `min_elevation_deg` at some point.
    pub ever_rises: bool,
    pub is_moon: bool,
}

impl TargetView {
    pub fn is_up(&self) -> bool {
        self.elevation_deg >= self.min_elevation_deg
    }
}

/// At most one selected body, the observer, and the pass search cached
/// between refreshes.
///
/// The body is held behind an `Arc` and replaced as a whole, so a reader
/// holding a clone never sees a half-updated selection.
pub struct SatelliteTrackingSession {
    body: Option<Arc<dyn OrbitModel>>,
    station: Option<GroundStation>,
    params: SearchParams,
    max_path_points: usize,
    rise_set: RiseSetResult,
    searched_at: Option<DateTime<Utc>>,
    new_pass: bool,
}

impl Default for SatelliteTrackingSession {
    fn default() -> Self {
        Self::new(SearchParams::default(), DEFAULT_MAX_PATH_POINTS)
    }
}

impl SatelliteTrackingSession {
    pub fn new(params: SearchParams, max_path_points: usize) -> Self {
        Self {
            body: None,
            station: None,
            params,
            max_path_points,
            rise_set: RiseSetResult::default(),
            searched_at: None,
            new_pass: false,
        }
    }

    pub fn body(&self) -> Option<Arc<dyn OrbitModel>> {
        self.body.clone()
    }

    pub fn observer(&self) -> Option<&GroundStation> {
        self.station.as_ref()
    }

    pub fn params(&self) -> &SearchParams {
        &self.params
    }

    pub fn rise_set(&self) -> &RiseSetResult {
        &self.rise_set
    }

    /// Replace the selection. Stale elements are refused and leave nothing
    /// selected.
    pub fn select(&mut self, body: Arc<dyn OrbitModel>, now: DateTime<Utc>) -> Result<(), PredictError> {
        if let Err(e) = check_epoch_age(body.as_ref(), now) {
            log::warn!("Refusing {}: {}", body.name(), e);
            self.deselect();
            return Err(e);
        }
        log::info!("Tracking {}", body.name());
        self.body = Some(body);
        self.search(now);
        Ok(())
    }

    /// Look `name` up in `source` and select it. `Moon` needs no elements.
    ///
    /// A failed lookup keeps the current selection.
    pub async fn select_by_name<S: ElementSource + ?Sized>(
        &mut self,
        source: &mut S,
        name: &str,
        attempts: u32,
        backoff: StdDuration,
        now: DateTime<Utc>,
    ) -> Result<(), PredictError> {
        let body: Arc<dyn OrbitModel> = if name.trim().eq_ignore_ascii_case(MOON_NAME) {
            Arc::new(MoonOrbit::new(now))
        } else {
            let tle = fetch_with_retry(source, name, attempts, backoff).await?;
            Arc::new(Sgp4Orbit::from_tle(&tle.name, &tle.line1, &tle.line2)?)
        };
        self.select(body, now)
    }

    pub fn deselect(&mut self) {
        if let Some(body) = self.body.take() {
            log::info!("No longer tracking {}", body.name());
        }
        self.rise_set = RiseSetResult::default();
        self.searched_at = None;
        self.new_pass = false;
    }

    pub fn set_observer(&mut self, station: Option<GroundStation>, now: DateTime<Utc>) {
        self.station = station;
        if self.body.is_some() {
            self.search(now);
        } else {
            self.searched_at = None;
        }
    }

    pub fn pass_status(&self, now: DateTime<Utc>) -> PassStatus {
        classify(&self.rise_set, now)
    }

    /// Rerun the pass search if the cached one has run its course.
    ///
    /// Returns whether a search ran. Elements that aged out since selection
    /// drop the selection, except the Moon which is simply renewed.
    pub fn refresh(&mut self, now: DateTime<Utc>) -> Result<bool, PredictError> {
        let Some(body) = self.body.clone() else {
            return Ok(false);
        };
        if let Err(e) = check_epoch_age(body.as_ref(), now) {
            if body.is_moon() {
                self.body = Some(Arc::new(MoonOrbit::new(now)));
            } else {
                log::warn!("{}", e);
                self.deselect();
                return Err(e);
            }
        }
        if self.station.is_none() || !self.needs_search(now) {
            return Ok(false);
        }
        self.search(now);
        Ok(true)
    }

    fn needs_search(&self, now: DateTime<Utc>) -> bool {
        let Some(searched_at) = self.searched_at else {
            return true;
        };
        match self.pass_status(now).state {
            PassState::JustEnded => true,
            PassState::NoPass => now - searched_at >= NO_PASS_RESEARCH,
            PassState::PassAhead | PassState::PassInProgress => false,
        }
    }

    fn search(&mut self, now: DateTime<Utc>) {
        self.rise_set = find_next_pass(
            self.station.as_ref(),
            self.body.as_deref(),
            now,
            &self.params,
        );
        self.searched_at = Some(now);
        self.new_pass = true;
    }

    /// True once after every completed search.
    pub fn take_new_pass(&mut self) -> bool {
        std::mem::take(&mut self.new_pass)
    }

    pub fn satellite_now(&self, now: DateTime<Utc>) -> Option<SatelliteNow> {
        let body = self.body.as_ref()?;
        let station = self.station.as_ref()?;
        let topo = match body.predict(now) {
            Ok(fix) => fix.topo(station),
            Err(e) => {
                log::warn!("Cannot place {}: {}", body.name(), e);
                return None;
            }
        };
        let rs = &self.rise_set;
        let hours_until = |t: Option<DateTime<Utc>>| {
            t.filter(|t| *t > now)
                .map(|t| (t - now).num_milliseconds() as f64 / 3_600_000.0)
        };

        Some(SatelliteNow {
            name: body.name().to_string(),
            azimuth_deg: topo.azimuth_deg,
            elevation_deg: topo.elevation_deg,
            range_km: topo.range_km,
            range_rate_km_s: topo.range_rate_km_s,
            rise_azimuth_deg: rs.rise_valid().then_some(rs.rise_azimuth_deg),
            set_azimuth_deg: rs.set_valid().then_some(rs.set_azimuth_deg),
            hours_to_rise: hours_until(rs.rise_time),
            hours_to_set: hours_until(rs.set_time),
            pass_state: self.pass_status(now).state,
        })
    }

    pub fn target_view(&self, now: DateTime<Utc>) -> Option<TargetView> {
        let body = self.body.as_ref()?;
        let sat = self.satellite_now(now)?;
        Some(TargetView {
            azimuth_deg: sat.azimuth_deg,
            elevation_deg: sat.elevation_deg,
            min_elevation_deg: self.params.min_elevation_deg,
            rise_azimuth_deg: sat.rise_azimuth_deg,
            set_azimuth_deg: sat.set_azimuth_deg,
            ever_rises: self.rise_set.ever_above_min_elevation,
            is_moon: body.is_moon(),
        })
    }

    pub fn sample_path<M: MapProjection>(&self, now: DateTime<Utc>, projection: &M) -> SatPath<M::Point> {
        sample_path(
            self.station.as_ref(),
            self.body.as_deref(),
            now,
            self.max_path_points,
            projection,
        )
    }
}
