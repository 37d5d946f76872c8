use chrono::{DateTime, Duration, Utc};
use sgp4::{Constants, Elements};

use super::error::PredictError;
use super::ground_station::{GroundStation, EARTH_E2, EARTH_RADIUS_KM, EARTH_ROTATION_RAD_S};
use super::types::{LatLng, Topo};

/// Source of body positions. Implementations are read-only once built,
/// so a selected body can be shared behind an `Arc` and swapped whole.
pub trait OrbitModel: Send + Sync {
    fn name(&self) -> &str;

    /// Reference time of the elements.
    fn epoch(&self) -> DateTime<Utc>;

    /// Orbital period in days.
    fn period_days(&self) -> f64;

    /// Moon-like bodies get a single path point and are never tracked upside-down.
    fn is_moon(&self) -> bool {
        false
    }

    fn predict(&self, at: DateTime<Utc>) -> Result<Fix, PredictError>;

    fn period(&self) -> Duration {
        Duration::milliseconds((self.period_days() * 86_400_000.0) as i64)
    }
}

/// Earth-fixed state of a body at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fix {
    pub position_ecef_km: [f64; 3],
    pub velocity_ecef_km_s: [f64; 3],
}

impl Fix {
    pub fn topo(&self, station: &GroundStation) -> Topo {
        let sta_ecef = station.position_ecef_km();
        let sat = self.position_ecef_km;

        let dr = [sat[0] - sta_ecef[0], sat[1] - sta_ecef[1], sat[2] - sta_ecef[2]];
        let range_km = norm(dr);

        let enu = ecef_to_enu(dr, station.lat_rad(), station.lon_rad());
        let azimuth_deg = enu.0.atan2(enu.1).to_degrees().rem_euclid(360.0);
        let elevation_deg = if range_km > 0.0 {
            (enu.2 / range_km).asin().to_degrees()
        } else {
            0.0
        };

        // The station is at rest in the Earth-fixed frame.
        let range_rate_km_s = if range_km > 0.0 {
            let v = self.velocity_ecef_km_s;
            (v[0] * dr[0] + v[1] * dr[1] + v[2] * dr[2]) / range_km
        } else {
            0.0
        };

        Topo {
            azimuth_deg,
            elevation_deg,
            range_km,
            range_rate_km_s,
        }
    }

    /// Geodetic sub-body point.
    pub fn geo(&self) -> LatLng {
        let (lat, lon, _) = ecef_to_geodetic(self.position_ecef_km);
        LatLng::new(lat.to_degrees(), lon.to_degrees())
    }

    pub fn altitude_km(&self) -> f64 {
        ecef_to_geodetic(self.position_ecef_km).2
    }

    /// Great-circle radius, radians of arc, of the ground locus from which the
    /// body is seen at `elevation_rad` above the horizon.
    pub fn viewing_radius(&self, elevation_rad: f64) -> f64 {
        let ratio = EARTH_RADIUS_KM / (EARTH_RADIUS_KM + self.altitude_km().max(0.0));
        (ratio * elevation_rad.cos()).clamp(-1.0, 1.0).acos() - elevation_rad
    }
}

/// Earth satellite propagated with SGP4/SDP4.
pub struct Sgp4Orbit {
    name: String,
    elements: Elements,
    constants: Constants,
}

impl Sgp4Orbit {
    pub fn from_tle(name: &str, line1: &str, line2: &str) -> Result<Self, PredictError> {
        let elements = Elements::from_tle(
            Some(name.to_string()),
            line1.as_bytes(),
            line2.as_bytes(),
        )?;
        let constants = Constants::from_elements(&elements)?;
        Ok(Self {
            name: name.to_string(),
            elements,
            constants,
        })
    }

    pub fn norad_id(&self) -> u64 {
        self.elements.norad_id
    }
}

impl OrbitModel for Sgp4Orbit {
    fn name(&self) -> &str {
        &self.name
    }

    fn epoch(&self) -> DateTime<Utc> {
        self.elements.datetime.and_utc()
    }

    fn period_days(&self) -> f64 {
        1.0 / self.elements.mean_motion
    }

    fn predict(&self, at: DateTime<Utc>) -> Result<Fix, PredictError> {
        let minutes = self
            .elements
            .datetime_to_minutes_since_epoch(&at.naive_utc())
            .map_err(|e| PredictError::Propagation(e.to_string()))?;
        let prediction = self.constants.propagate(minutes)?;
        let gmst = gmst_rad(at);

        Ok(Fix {
            position_ecef_km: teme_to_ecef_position(prediction.position, gmst),
            velocity_ecef_km_s: teme_to_ecef_velocity(
                prediction.position,
                prediction.velocity,
                gmst,
            ),
        })
    }
}

pub fn gmst_rad(at: DateTime<Utc>) -> f64 {
    sgp4::iau_epoch_to_sidereal_time(sgp4::julian_years_since_j2000(&at.naive_utc()))
}

pub fn teme_to_ecef_position(pos_teme: [f64; 3], gmst: f64) -> [f64; 3] {
    let cos_gmst = gmst.cos();
    let sin_gmst = gmst.sin();
    [
        pos_teme[0] * cos_gmst + pos_teme[1] * sin_gmst,
        -pos_teme[0] * sin_gmst + pos_teme[1] * cos_gmst,
        pos_teme[2],
    ]
}

pub fn teme_to_ecef_velocity(pos_teme: [f64; 3], vel_teme: [f64; 3], gmst: f64) -> [f64; 3] {
    let pos = teme_to_ecef_position(pos_teme, gmst);
    let rotated = teme_to_ecef_position(vel_teme, gmst);
    [
        rotated[0] + EARTH_ROTATION_RAD_S * pos[1],
        rotated[1] - EARTH_ROTATION_RAD_S * pos[0],
        rotated[2],
    ]
}

pub fn ecef_to_enu(dr: [f64; 3], lat_rad: f64, lon_rad: f64) -> (f64, f64, f64) {
    let sin_lat = lat_rad.sin();
    let cos_lat = lat_rad.cos();
    let sin_lon = lon_rad.sin();
    let cos_lon = lon_rad.cos();

    let east = -sin_lon * dr[0] + cos_lon * dr[1];
    let north = -sin_lat * cos_lon * dr[0] - sin_lat * sin_lon * dr[1] + cos_lat * dr[2];
    let up = cos_lat * cos_lon * dr[0] + cos_lat * sin_lon * dr[1] + sin_lat * dr[2];
    (east, north, up)
}

/// Returns (lat rad, lon rad, height km) on the WGS-84 ellipsoid.
pub fn ecef_to_geodetic(p: [f64; 3]) -> (f64, f64, f64) {
    let lon = p[1].atan2(p[0]);
    let rho = (p[0] * p[0] + p[1] * p[1]).sqrt();
    let mut lat = p[2].atan2(rho * (1.0 - EARTH_E2));
    let mut height = 0.0;
    for _ in 0..5 {
        let sin_lat = lat.sin();
        let n = EARTH_RADIUS_KM / (1.0 - EARTH_E2 * sin_lat * sin_lat).sqrt();
        height = if lat.cos().abs() > 1e-9 {
            rho / lat.cos() - n
        } else {
            p[2].abs() - n * (1.0 - EARTH_E2)
        };
        lat = p[2].atan2(rho * (1.0 - EARTH_E2 * n / (n + height)));
    }
    (lat, lon, height)
}

fn norm(v: [f64; 3]) -> f64 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    pub const ISS_LINE1: &str =
        "1 25544U 98067A   20194.88612269 -.00002218  00000-0 -31515-4 0  9992";
    pub const ISS_LINE2: &str =
        "2 25544  51.6461 221.2784 0001413  89.1723 280.4612 15.49507896236008";

    #[test]
    fn overhead_body_is_at_zenith() {
        let station = GroundStation::new(0.0, 0.0);
        let fix = Fix {
            position_ecef_km: [EARTH_RADIUS_KM + 500.0, 0.0, 0.0],
            velocity_ecef_km_s: [0.0, 0.0, 0.0],
        };
        let topo = fix.topo(&station);
        assert_abs_diff_eq!(topo.elevation_deg, 90.0, epsilon = 1e-6);
        assert_abs_diff_eq!(topo.range_km, 500.0, epsilon = 1e-6);
    }

    #[test]
    fn north_of_station_has_zero_azimuth() {
        let station = GroundStation::new(0.0, 0.0);
        let fix = Fix {
            position_ecef_km: [EARTH_RADIUS_KM, 0.0, 1000.0],
            velocity_ecef_km_s: [0.0, 0.0, 0.0],
        };
        let topo = fix.topo(&station);
        assert_abs_diff_eq!(topo.azimuth_deg, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(topo.elevation_deg, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn geodetic_round_trip_through_station() {
        let station = GroundStation {
            latitude_deg: 40.0,
            longitude_deg: -105.0,
            altitude_m: 1600.0,
        };
        let (lat, lon, h) = ecef_to_geodetic(station.position_ecef_km());
        assert_abs_diff_eq!(lat.to_degrees(), 40.0, epsilon = 1e-7);
        assert_abs_diff_eq!(lon.to_degrees(), -105.0, epsilon = 1e-7);
        assert_abs_diff_eq!(h, 1.6, epsilon = 1e-5);
    }

    #[test]
    fn horizon_viewing_radius_grows_with_altitude() {
        let low = Fix {
            position_ecef_km: [EARTH_RADIUS_KM + 400.0, 0.0, 0.0],
            velocity_ecef_km_s: [0.0; 3],
        };
        let high = Fix {
            position_ecef_km: [EARTH_RADIUS_KM + 20_000.0, 0.0, 0.0],
            velocity_ecef_km_s: [0.0; 3],
        };
        let expected = (EARTH_RADIUS_KM / (EARTH_RADIUS_KM + 400.0)).acos();
        assert_abs_diff_eq!(low.viewing_radius(0.0), expected, epsilon = 1e-9);
        assert!(high.viewing_radius(0.0) > low.viewing_radius(0.0));
        assert!(low.viewing_radius(30f64.to_radians()) < low.viewing_radius(0.0));
        assert_abs_diff_eq!(
            low.viewing_radius(std::f64::consts::FRAC_PI_2),
            0.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn iss_elements_propagate() {
        let iss = Sgp4Orbit::from_tle("ISS", ISS_LINE1, ISS_LINE2).unwrap();
        assert_eq!(iss.norad_id(), 25544);
        assert_abs_diff_eq!(iss.period_days() * 1440.0, 92.9, epsilon = 0.2);

        let fix = iss.predict(iss.epoch() + Duration::minutes(30)).unwrap();
        let alt = fix.altitude_km();
        assert!(alt > 350.0 && alt < 450.0, "altitude {alt}");
        assert!(fix.geo().lat_deg.abs() <= 52.0);
    }
}
