mod error;
mod ground_station;
mod moon;
mod orbit;
mod pass_finder;
mod pass_state;
mod path;
mod tle_loader;
mod types;

pub use error::PredictError;
pub use ground_station::{GroundStation, EARTH_RADIUS_KM};
pub use moon::{MoonOrbit, MOON_NAME};
pub use orbit::{Fix, OrbitModel, Sgp4Orbit};
pub use pass_finder::{find_next_pass, search_rise_set, SearchParams};
pub use pass_state::classify;
pub use path::{
    is_geostationary_class, label_anchor, sample_path, solve_sphere, EquirectangularGrid,
    Geodetic, MapProjection, SatPath, DEFAULT_MAX_PATH_POINTS,
};
pub use tle_loader::{
    check_epoch_age, checksum_ok, fetch_with_retry, max_epoch_age_days, parse_tle_text,
    ElementSource, TleLoader, TleSet,
};
pub use types::*;

#[cfg(test)]
pub(crate) mod test_support {
    pub use super::orbit::tests::{ISS_LINE1, ISS_LINE2};
    pub use super::path::tests::RingOrbit;
}
