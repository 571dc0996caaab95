use std::fmt;

use crate::error::FacsError;

/// Mean radius of the earth in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A validated latitude/longitude pair in decimal degrees.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LatLon {
    lat: f64,
    lon: f64,
}

impl LatLon {
    /// # Errors
    ///
    /// Returns `FacsError::InvalidLocation` if the latitude is outside `[-90, 90]` or the
    /// longitude is outside `[-180, 180]`.
    pub fn new(lat: f64, lon: f64) -> Result<Self, FacsError> {
        if !(-180.0..=180.0).contains(&lon) {
            return Err(FacsError::InvalidLocation(
                "Longitude must be between -180 and 180".to_string(),
            ));
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(FacsError::InvalidLocation(
                "Latitude must be between -90 and 90".to_string(),
            ));
        }
        Ok(LatLon { lat, lon })
    }

    #[must_use]
    pub fn lat(&self) -> f64 {
        self.lat
    }

    #[must_use]
    pub fn lon(&self) -> f64 {
        self.lon
    }
}

impl fmt::Display for LatLon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lat = if self.lat < 0.0 {
            format!("{} S", -self.lat)
        } else {
            format!("{} N", self.lat)
        };
        let lon = if self.lon < 0.0 {
            format!("{} W", -self.lon)
        } else {
            format!("{} E", self.lon)
        };
        write!(f, "({lat}, {lon})")
    }
}

/// Great-circle distance in kilometres between two points, using the haversine formula.
#[must_use]
pub fn haversine_distance(a: LatLon, b: LatLon) -> f64 {
    let (lat1, lon1) = (a.lat.to_radians(), a.lon.to_radians());
    let (lat2, lon2) = (b.lat.to_radians(), b.lon.to_radians());

    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    c * EARTH_RADIUS_KM
}
