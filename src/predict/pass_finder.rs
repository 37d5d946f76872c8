use chrono::{DateTime, Duration, Utc};

use crate::predict::error::PredictError;
use crate::predict::orbit::OrbitModel;
use crate::predict::types::RiseSetResult;
use crate::predict::GroundStation;

pub const COARSE_STEP_SECONDS: i64 = 90;
pub const FINE_STEP_SECONDS: i64 = -2;
pub const SEARCH_HORIZON_DAYS: i64 = 2;
pub const DEFAULT_MIN_ELEVATION: f64 = 0.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchParams {
    pub min_elevation_deg: f64,
    /// Forward scan step.
    pub coarse_step: Duration,
    /// Refinement step; negative, the refinement walks back in time.
    pub fine_step: Duration,
    pub horizon: Duration,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            min_elevation_deg: DEFAULT_MIN_ELEVATION,
            coarse_step: Duration::seconds(COARSE_STEP_SECONDS),
            fine_step: Duration::seconds(FINE_STEP_SECONDS),
            horizon: Duration::days(SEARCH_HORIZON_DAYS),
        }
    }
}

/// Find the next rise and set of `body` as seen from `station`.
///
/// Missing inputs are the normal "nothing selected" state and yield an
/// empty result. Propagation failures are logged and also yield an empty
/// result.
pub fn find_next_pass(
    station: Option<&GroundStation>,
    body: Option<&dyn OrbitModel>,
    start: DateTime<Utc>,
    params: &SearchParams,
) -> RiseSetResult {
    let (Some(station), Some(body)) = (station, body) else {
        return RiseSetResult::default();
    };

    let result = search_rise_set(start, params, |t| {
        let topo = body.predict(t)?.topo(station);
        Ok((topo.elevation_deg, topo.azimuth_deg))
    });

    match result {
        Ok(rs) => {
            log::info!(
                "{}: rise {:?} az {:.0}, set {:?} az {:.0}",
                body.name(),
                rs.rise_time,
                rs.rise_azimuth_deg,
                rs.set_time,
                rs.set_azimuth_deg
            );
            rs
        }
        Err(e) => {
            log::warn!("Pass search for {} failed: {}", body.name(), e);
            RiseSetResult::default()
        }
    }
}

/// Coarse forward scan with backward fine refinement around each crossing.
///
/// `look` returns (elevation, azimuth) in degrees at an instant. A refined
/// rise is the first sample at or above the threshold, a refined set the
/// first sample below it.
pub fn search_rise_set<F>(
    start: DateTime<Utc>,
    params: &SearchParams,
    mut look: F,
) -> Result<RiseSetResult, PredictError>
where
    F: FnMut(DateTime<Utc>) -> Result<(f64, f64), PredictError>,
{
    let min_el = params.min_elevation_deg;
    let coarse = params.coarse_step;
    let fine = params.fine_step;
    let end = start + params.horizon;

    let mut rs = RiseSetResult::default();
    let mut t = start + fine;
    let (mut pel, mut paz) = look(t)?;
    let mut refining = false;
    let mut dt = coarse;
    t += dt;

    while !(rs.rise_valid() && rs.set_valid()) && t < end {
        let (tel, taz) = look(t)?;

        if tel >= min_el {
            rs.ever_above_min_elevation = true;
            if pel < min_el {
                if refining {
                    // Walking back out of the down side: the later sample is the set.
                    rs.set_time = Some(t - fine);
                    rs.set_azimuth_deg = paz;
                    refining = false;
                    dt = coarse;
                } else if !rs.rise_valid() {
                    refining = true;
                    dt = fine;
                }
            }
        } else {
            rs.ever_below_min_elevation = true;
            if pel >= min_el {
                if refining {
                    // Walking back out of the up side: the later sample is the rise.
                    let rise = t - fine;
                    rs.rise_time = Some(rise);
                    rs.rise_azimuth_deg = paz;
                    if !rs.set_valid() {
                        // A pass ending before the next coarse sample would have its
                        // set stepped over, so resolve it here.
                        if let Some((set, set_az)) = short_pass_set(rise, params, &mut look)? {
                            log::debug!("Pass shorter than the coarse step at {}", rise);
                            rs.set_time = Some(set);
                            rs.set_azimuth_deg = set_az;
                        }
                    }
                    refining = false;
                    dt = coarse;
                } else if !rs.set_valid() {
                    refining = true;
                    dt = fine;
                }
            }
        }

        pel = tel;
        paz = taz;
        t += dt;
    }

    Ok(rs)
}

/// Set of a pass that rose at `rise`, if it comes before the next coarse
/// sample. Walks forward in fine steps to the first sample below the threshold.
fn short_pass_set<F>(
    rise: DateTime<Utc>,
    params: &SearchParams,
    look: &mut F,
) -> Result<Option<(DateTime<Utc>, f64)>, PredictError>
where
    F: FnMut(DateTime<Utc>) -> Result<(f64, f64), PredictError>,
{
    let min_el = params.min_elevation_deg;
    let check = rise + params.coarse_step;
    let (check_el, check_az) = look(check)?;
    if check_el >= min_el {
        return Ok(None);
    }

    let step = if params.fine_step < Duration::zero() {
        -params.fine_step
    } else {
        params.fine_step
    };
    let mut t = rise + step;
    while t < check {
        let (el, az) = look(t)?;
        if el < min_el {
            return Ok(Some((t, az)));
        }
        t += step;
    }
    Ok(Some((check, check_az)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predict::orbit::tests::{ISS_LINE1, ISS_LINE2};
    use crate::predict::{classify, PassState, Sgp4Orbit};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    /// Up (10°) inside any of the closed windows, down (-10°) elsewhere.
    /// Azimuth encodes seconds since `t0` so tests can check which sample was kept.
    fn windows(
        windows: Vec<(i64, i64)>,
    ) -> impl FnMut(DateTime<Utc>) -> Result<(f64, f64), PredictError> {
        move |t| {
            let s = (t - t0()).num_seconds();
            let up = windows.iter().any(|&(a, b)| s >= a && s <= b);
            Ok((if up { 10.0 } else { -10.0 }, s as f64))
        }
    }

    #[test]
    fn pass_ahead_is_refined_to_fine_step() {
        let rs = search_rise_set(t0(), &SearchParams::default(), windows(vec![(600, 1200)]))
            .unwrap();

        let rise = rs.rise_time.unwrap();
        let set = rs.set_time.unwrap();
        assert!(rise >= t0() + Duration::minutes(10));
        assert!(rise <= t0() + Duration::minutes(10) + Duration::seconds(2));
        assert!(set >= t0() + Duration::minutes(20));
        assert!(set <= t0() + Duration::minutes(20) + Duration::seconds(2));
        assert!(rise < set);
        assert_eq!(rs.rise_azimuth_deg, (rise - t0()).num_seconds() as f64);
        assert_eq!(rs.set_azimuth_deg, (set - t0()).num_seconds() as f64);
        assert!(rs.ever_above_min_elevation && rs.ever_below_min_elevation);
    }

    #[test]
    fn pass_in_progress_reports_current_set_and_next_rise() {
        let period = 95 * 60;
        let passes: Vec<(i64, i64)> = (0..40).map(|k| (k * period - 300, k * period + 300)).collect();
        let rs = search_rise_set(t0(), &SearchParams::default(), windows(passes)).unwrap();

        let set = rs.set_time.unwrap();
        let rise = rs.rise_time.unwrap();
        assert!(set <= rise);
        assert!((set - t0()).num_seconds() >= 300 && (set - t0()).num_seconds() <= 302);
        let next_rise = period - 300;
        assert!((rise - t0()).num_seconds() >= next_rise);
        assert!((rise - t0()).num_seconds() <= next_rise + 2);
    }

    #[test]
    fn pass_shorter_than_coarse_step_is_reported() {
        // Caught by a single coarse sample, and down again before the next one.
        let rs = search_rise_set(
            t0(),
            &SearchParams::default(),
            windows(vec![(600, 660), (3000, 3600)]),
        )
        .unwrap();
        assert_eq!(rs.rise_time, Some(t0() + Duration::seconds(600)));
        assert_eq!(rs.set_time, Some(t0() + Duration::seconds(662)));
        assert_eq!(rs.set_azimuth_deg, 662.0);
    }

    #[test]
    fn only_pass_in_horizon_being_short_is_not_lost() {
        let rs = search_rise_set(t0(), &SearchParams::default(), windows(vec![(600, 680)]))
            .unwrap();
        assert_eq!(rs.rise_time, Some(t0() + Duration::seconds(600)));
        assert_eq!(rs.set_time, Some(t0() + Duration::seconds(682)));

        let status = classify(&rs, t0());
        assert_eq!(status.state, PassState::PassAhead);
        assert_eq!(status.transition, Some(Duration::seconds(600)));
    }

    #[test]
    fn short_pass_after_pass_in_progress_is_the_next_rise() {
        let rs = search_rise_set(
            t0(),
            &SearchParams::default(),
            windows(vec![(-300, 300), (3000, 3080), (6000, 6600)]),
        )
        .unwrap();
        // Set of the current pass, rise of the short one.
        assert_eq!(rs.set_time, Some(t0() + Duration::seconds(302)));
        assert_eq!(rs.rise_time, Some(t0() + Duration::seconds(3000)));
        assert_eq!(rs.rise_azimuth_deg, 3000.0);
    }

    #[test]
    fn never_rising_body_reports_no_events() {
        let rs = search_rise_set(t0(), &SearchParams::default(), |_| Ok((-5.0, 0.0))).unwrap();
        assert!(!rs.rise_valid() && !rs.set_valid());
        assert!(!rs.ever_above_min_elevation);
        assert!(rs.ever_below_min_elevation);
    }

    #[test]
    fn circumpolar_body_reports_no_events() {
        let rs = search_rise_set(t0(), &SearchParams::default(), |_| Ok((30.0, 0.0))).unwrap();
        assert!(!rs.rise_valid() && !rs.set_valid());
        assert!(rs.ever_above_min_elevation);
        assert!(!rs.ever_below_min_elevation);
    }

    fn count_evaluations(period_s: f64, peak_el: f64) -> (usize, RiseSetResult) {
        let mut calls = 0usize;
        let rs = search_rise_set(t0(), &SearchParams::default(), |t| {
            calls += 1;
            let phase = (t - t0()).num_seconds() as f64 / period_s * std::f64::consts::TAU;
            Ok((peak_el * phase.sin() - 0.5, 0.0))
        })
        .unwrap();
        (calls, rs)
    }

    #[test]
    fn search_terminates_within_horizon() {
        // Coarse scan of two days plus a handful of fine walks.
        let bound = (2 * 86_400 / COARSE_STEP_SECONDS) as usize + 200;

        let (geo_calls, _) = count_evaluations(86_164.0, 0.4);
        assert!(geo_calls <= bound, "geostationary-like took {geo_calls}");

        let (leo_calls, rs) = count_evaluations(90.0 * 60.0, 40.0);
        assert!(leo_calls <= bound, "leo took {leo_calls}");
        assert!(rs.rise_valid() && rs.set_valid());
    }

    #[test]
    fn missing_inputs_yield_empty_result() {
        let station = GroundStation::new(40.0, -105.0);
        let rs = find_next_pass(Some(&station), None, t0(), &SearchParams::default());
        assert_eq!(rs, RiseSetResult::default());

        let iss = Sgp4Orbit::from_tle("ISS", ISS_LINE1, ISS_LINE2).unwrap();
        let rs = find_next_pass(None, Some(&iss), t0(), &SearchParams::default());
        assert_eq!(rs, RiseSetResult::default());
    }

    #[test]
    fn iss_has_a_short_pass_within_two_days() {
        let station = GroundStation::new(40.0, -105.0);
        let iss = Sgp4Orbit::from_tle("ISS", ISS_LINE1, ISS_LINE2).unwrap();
        let start = iss.epoch() + Duration::hours(6);
        let rs = find_next_pass(Some(&station), Some(&iss), start, &SearchParams::default());

        assert!(rs.rise_valid() && rs.set_valid());
        let rise = rs.rise_time.unwrap();
        let set = rs.set_time.unwrap();
        if rise < set {
            let minutes = (set - rise).num_minutes();
            assert!((1..=20).contains(&minutes), "pass of {minutes} min");
        }
        assert!(rise < start + Duration::days(2));
    }
}
