use serde::Serialize;
use thiserror::Error;

/// Mean Earth radius used for great-circle distances, in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A WGS-84 coordinate pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoPoint {
    latitude: f64,
    longitude: f64,
}

impl GeoPoint {
    /// Builds a point, rejecting non-finite or out-of-range coordinates.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, GeoError> {
        if !latitude.is_finite() {
            return Err(GeoError::NotNumeric("latitude"));
        }
        if !longitude.is_finite() {
            return Err(GeoError::NotNumeric("longitude"));
        }
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(GeoError::OutOfRange {
                field: "latitude",
                value: latitude,
            });
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(GeoError::OutOfRange {
                field: "longitude",
                value: longitude,
            });
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Parses a point from raw query values such as `?latitude=..&longitude=..`.
    ///
    /// `lat_field` and `lon_field` name the parameters in error messages.
    pub fn parse(
        latitude: Option<&str>,
        longitude: Option<&str>,
        lat_field: &'static str,
        lon_field: &'static str,
    ) -> Result<Self, GeoError> {
        let latitude = latitude.map(str::trim).filter(|value| !value.is_empty());
        let longitude = longitude.map(str::trim).filter(|value| !value.is_empty());
        let (Some(latitude), Some(longitude)) = (latitude, longitude) else {
            return Err(GeoError::Missing {
                latitude: lat_field,
                longitude: lon_field,
            });
        };

        let latitude = parse_degrees(latitude, lat_field)?;
        let longitude = parse_degrees(longitude, lon_field)?;
        Self::new(latitude, longitude).map_err(|err| err.renamed(lat_field, lon_field))
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Great-circle distance in kilometers using the spherical law of cosines.
    ///
    /// The cosine is clamped to `[-1, 1]` so identical points yield `0.0`
    /// instead of `NaN` when rounding pushes the value past one.
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let delta_lon = (other.longitude - self.longitude).to_radians();

        let cosine = lat1.cos() * lat2.cos() * delta_lon.cos() + lat1.sin() * lat2.sin();
        EARTH_RADIUS_KM * cosine.clamp(-1.0, 1.0).acos()
    }

    /// Component-wise arithmetic mean of two points.
    ///
    /// This is a planar approximation of the geodesic midpoint. It is only
    /// meaningful for points that are close together and do not straddle
    /// the antimeridian. The mean of two valid points is always in range.
    pub fn midpoint(&self, other: &GeoPoint) -> GeoPoint {
        GeoPoint {
            latitude: (self.latitude + other.latitude) / 2.0,
            longitude: (self.longitude + other.longitude) / 2.0,
        }
    }
}

fn parse_degrees(raw: &str, field: &'static str) -> Result<f64, GeoError> {
    raw.parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or(GeoError::NotNumeric(field))
}

/// Invalid coordinate input.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeoError {
    #[error("{latitude} and {longitude} are required")]
    Missing {
        latitude: &'static str,
        longitude: &'static str,
    },
    #[error("{0} must be numeric")]
    NotNumeric(&'static str),
    #[error("{field} is out of range (got {value})")]
    OutOfRange { field: &'static str, value: f64 },
}

impl GeoError {
    fn renamed(self, lat_field: &'static str, lon_field: &'static str) -> Self {
        let rename = |field: &'static str| match field {
            "latitude" => lat_field,
            "longitude" => lon_field,
            other => other,
        };
        match self {
            Self::NotNumeric(field) => Self::NotNumeric(rename(field)),
            Self::OutOfRange { field, value } => Self::OutOfRange {
                field: rename(field),
                value,
            },
            missing @ Self::Missing { .. } => missing,
        }
    }
}
