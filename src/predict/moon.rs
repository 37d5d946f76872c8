//! Low-precision lunar ephemeris (about 0.3° in position), good enough to
//! point an antenna and draw a sub-lunar point.

use chrono::{DateTime, Duration, Utc};

use super::error::PredictError;
use super::ground_station::EARTH_RADIUS_KM;
use super::orbit::{gmst_rad, teme_to_ecef_position, Fix, OrbitModel};

pub const MOON_NAME: &str = "Moon";
const SIDEREAL_MONTH_DAYS: f64 = 27.321_661;
const DIFF_STEP_S: i64 = 30;

pub struct MoonOrbit {
    epoch: DateTime<Utc>,
}

impl MoonOrbit {
    /// The model has no elements to age; `epoch` records when it was selected
    /// so the usual staleness rule still forces a periodic refresh.
    pub fn new(epoch: DateTime<Utc>) -> Self {
        Self { epoch }
    }
}

impl OrbitModel for MoonOrbit {
    fn name(&self) -> &str {
        MOON_NAME
    }

    fn epoch(&self) -> DateTime<Utc> {
        self.epoch
    }

    fn period_days(&self) -> f64 {
        SIDEREAL_MONTH_DAYS
    }

    fn is_moon(&self) -> bool {
        true
    }

    fn predict(&self, at: DateTime<Utc>) -> Result<Fix, PredictError> {
        let before = moon_ecef_km(at - Duration::seconds(DIFF_STEP_S));
        let here = moon_ecef_km(at);
        let after = moon_ecef_km(at + Duration::seconds(DIFF_STEP_S));
        let span = 2.0 * DIFF_STEP_S as f64;
        Ok(Fix {
            position_ecef_km: here,
            velocity_ecef_km_s: [
                (after[0] - before[0]) / span,
                (after[1] - before[1]) / span,
                (after[2] - before[2]) / span,
            ],
        })
    }
}

fn julian_centuries(at: DateTime<Utc>) -> f64 {
    let jd = at.timestamp_millis() as f64 / 86_400_000.0 + 2_440_587.5;
    (jd - 2_451_545.0) / 36_525.0
}

fn sin_d(deg: f64) -> f64 {
    deg.to_radians().sin()
}

fn cos_d(deg: f64) -> f64 {
    deg.to_radians().cos()
}

fn moon_ecef_km(at: DateTime<Utc>) -> [f64; 3] {
    let t = julian_centuries(at);

    let lambda = 218.32 + 481_267.881 * t
        + 6.29 * sin_d(135.0 + 477_198.87 * t)
        - 1.27 * sin_d(259.3 - 413_335.36 * t)
        + 0.66 * sin_d(235.7 + 890_534.22 * t)
        + 0.21 * sin_d(269.9 + 954_397.74 * t)
        - 0.19 * sin_d(357.5 + 35_999.05 * t)
        - 0.11 * sin_d(186.5 + 966_404.03 * t);
    let beta = 5.13 * sin_d(93.3 + 483_202.02 * t)
        + 0.28 * sin_d(228.2 + 960_400.89 * t)
        - 0.28 * sin_d(318.3 + 6_003.15 * t)
        - 0.17 * sin_d(217.6 - 407_332.21 * t);
    let parallax = 0.9508
        + 0.0518 * cos_d(135.0 + 477_198.87 * t)
        + 0.0095 * cos_d(259.3 - 413_335.36 * t)
        + 0.0078 * cos_d(235.7 + 890_534.22 * t)
        + 0.0028 * cos_d(269.9 + 954_397.74 * t);

    let r = EARTH_RADIUS_KM / sin_d(parallax);
    let obliquity = 23.439_291 - 0.013_004_2 * t;

    let l = cos_d(beta) * cos_d(lambda);
    let m = cos_d(beta) * sin_d(lambda);
    let n = sin_d(beta);
    let eci = [
        r * l,
        r * (m * cos_d(obliquity) - n * sin_d(obliquity)),
        r * (m * sin_d(obliquity) + n * cos_d(obliquity)),
    ];

    teme_to_ecef_position(eci, gmst_rad(at))
}
