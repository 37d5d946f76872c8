use std::f64::consts::{FRAC_PI_2, TAU};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::predict::orbit::{Fix, OrbitModel};
use crate::predict::types::LatLng;
use crate::predict::GroundStation;

pub const DEFAULT_MAX_PATH_POINTS: usize = 1000;

/// Viewing elevations of the three footprint loci, degrees.
pub const FOOTPRINT_ELEVATIONS_DEG: [f64; 3] = [0.0, 30.0, 60.0];

/// Azimuth samples per footprint locus; the horizon locus is the largest.
pub const FOOTPRINT_POINTS: [usize; 3] = [180, 120, 60];

/// Label anchors used when the body is in the western / eastern hemisphere.
const LABEL_ANCHOR_WEST: (f64, f64) = (-35.0, 80.0);
const LABEL_ANCHOR_EAST: (f64, f64) = (-35.0, -135.0);

/// Turns geodetic points into whatever the map draws with. Consecutive equal
/// points are dropped by the sampler.
pub trait MapProjection {
    type Point: Copy + PartialEq + Serialize;

    fn project(&self, ll: LatLng) -> Self::Point;
}

/// Identity projection.
pub struct Geodetic;

impl MapProjection for Geodetic {
    type Point = LatLng;

    fn project(&self, ll: LatLng) -> LatLng {
        ll
    }
}

/// Plate carrée raster of `width` × `height` pixels, origin top-left at (90N, 180W).
pub struct EquirectangularGrid {
    pub width: u32,
    pub height: u32,
}

impl MapProjection for EquirectangularGrid {
    type Point = (i32, i32);

    fn project(&self, ll: LatLng) -> (i32, i32) {
        let w = self.width.max(1) as f64;
        let h = self.height.max(1) as f64;
        let x = ((ll.lng_deg + 180.0) / 360.0 * w).floor().clamp(0.0, w - 1.0);
        let y = ((90.0 - ll.lat_deg) / 180.0 * h).floor().clamp(0.0, h - 1.0);
        (x as i32, y as i32)
    }
}

/// One sweep of rendering geometry for the selected body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SatPath<P> {
    pub path: Vec<P>,
    /// Loci for each of `FOOTPRINT_ELEVATIONS_DEG`, in that order.
    pub footprints: [Vec<P>; 3],
    pub label_anchor: Option<P>,
}

impl<P> SatPath<P> {
    pub fn empty() -> Self {
        Self {
            path: Vec::new(),
            footprints: [Vec::new(), Vec::new(), Vec::new()],
            label_anchor: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }
}

/// Bodies whose ground track stays put over a day.
pub fn is_geostationary_class(period_days: f64) -> bool {
    (0.95..=1.05).contains(&period_days)
}

/// Spherical triangle: given the included angle `a_angle` between sides `b`
/// and `c` (supplied as cos/sin), returns cos of the opposite side `a` and the
/// angle `B` opposite `b`.
pub fn solve_sphere(a_angle: f64, b: f64, cos_c: f64, sin_c: f64) -> (f64, f64) {
    let cos_b = b.cos();
    let sin_b = b.sin();
    let cos_a = (cos_b * cos_c + sin_b * sin_c * a_angle.cos()).clamp(-1.0, 1.0);
    let big_b = (a_angle.sin() * sin_b * sin_c).atan2(cos_b - cos_a * cos_c);
    (cos_a, big_b)
}

/// Sample one revolution of ground track plus the 0°/30°/60° footprints.
///
/// Missing inputs or a failing propagator give an empty (or truncated)
/// result; nothing is raised.
pub fn sample_path<M: MapProjection>(
    station: Option<&GroundStation>,
    body: Option<&dyn OrbitModel>,
    now: DateTime<Utc>,
    max_points: usize,
    projection: &M,
) -> SatPath<M::Point> {
    let (Some(_), Some(body)) = (station, body) else {
        return SatPath::empty();
    };

    let fix_now = match body.predict(now) {
        Ok(fix) => fix,
        Err(e) => {
            log::warn!("Cannot place {}: {}", body.name(), e);
            return SatPath::empty();
        }
    };
    let sub = fix_now.geo();

    let n_points = if body.is_moon() || is_geostationary_class(body.period_days()) {
        1
    } else {
        max_points.max(1)
    };

    let mut path = Vec::with_capacity(n_points);
    push_distinct(&mut path, projection.project(sub));
    let step_ms = (body.period_days() * 86_400_000.0 / n_points as f64) as i64;
    for i in 1..n_points {
        let t = now + Duration::milliseconds(step_ms * i as i64);
        match body.predict(t) {
            Ok(fix) => push_distinct(&mut path, projection.project(fix.geo())),
            Err(e) => {
                log::warn!("Path for {} truncated at {}: {}", body.name(), t, e);
                break;
            }
        }
    }

    let footprints = [0, 1, 2].map(|i| {
        footprint(
            &fix_now,
            sub,
            FOOTPRINT_ELEVATIONS_DEG[i],
            FOOTPRINT_POINTS[i],
            projection,
        )
    });

    SatPath {
        path,
        footprints,
        label_anchor: Some(projection.project(label_anchor(sub))),
    }
}

fn footprint<M: MapProjection>(
    fix: &Fix,
    sub: LatLng,
    elevation_deg: f64,
    n_points: usize,
    projection: &M,
) -> Vec<M::Point> {
    let radius = fix.viewing_radius(elevation_deg.to_radians());
    let lat = sub.lat_deg.to_radians();
    // Side c runs from the pole to the sub-point.
    let (cos_c, sin_c) = (lat.sin(), lat.cos());

    let mut points = Vec::with_capacity(n_points);
    for i in 0..n_points {
        let azimuth = TAU * i as f64 / n_points as f64;
        let (cos_a, dlng) = solve_sphere(azimuth, radius, cos_c, sin_c);
        let ll = LatLng::new(
            (FRAC_PI_2 - cos_a.acos()).to_degrees(),
            sub.lng_deg + dlng.to_degrees(),
        );
        push_distinct(&mut points, projection.project(ll));
    }
    points
}

/// Anchor for the body's name label, kept away from the body itself.
pub fn label_anchor(sub: LatLng) -> LatLng {
    let (lat, lng) = if sub.lng_deg < 0.0 {
        LABEL_ANCHOR_WEST
    } else {
        LABEL_ANCHOR_EAST
    };
    LatLng::new(lat, lng)
}

fn push_distinct<P: PartialEq>(points: &mut Vec<P>, p: P) {
    if points.last() != Some(&p) {
        points.push(p);
    }
}
