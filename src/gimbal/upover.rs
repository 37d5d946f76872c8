use crate::session::TargetView;

pub const DEFAULT_UPOVER_EPSILON_DEG: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpOver {
    Normal,
    UpsideDown,
    /// Too close to the horizon to trust the predicted azimuths; ask again later.
    Pending,
}

/// Whether sweeping from `az_a` to `az_b` the short way runs through the
/// azimuth wrap point `az_min`.
pub fn does_pass_cross_end_of_travel(az_a: f64, az_b: f64, az_min: f64) -> bool {
    let a = (az_a - az_min).rem_euclid(360.0);
    let b = (az_b - az_min).rem_euclid(360.0);
    (a > 180.0 && b < a - 180.0) || (a < 180.0 && b > a + 180.0)
}

/// Decide whether the coming (or current) pass should be flown upside down.
///
/// Needs elevation travel past 90°. The Moon is always flown normally.
pub fn decide_upover(view: &TargetView, el_max: f64, az_min: f64, epsilon: f64) -> UpOver {
    if el_max <= 90.0 || view.is_moon {
        return UpOver::Normal;
    }

    let min_el = view.min_elevation_deg;
    let crosses = if view.elevation_deg < min_el - epsilon {
        match (view.rise_azimuth_deg, view.set_azimuth_deg) {
            (Some(rise), Some(set)) => does_pass_cross_end_of_travel(rise, set, az_min),
            _ => false,
        }
    } else if view.elevation_deg <= min_el + epsilon {
        return UpOver::Pending;
    } else {
        view.set_azimuth_deg
            .map(|set| does_pass_cross_end_of_travel(view.azimuth_deg, set, az_min))
            .unwrap_or(false)
    };

    if crosses {
        UpOver::UpsideDown
    } else {
        UpOver::Normal
    }
}
