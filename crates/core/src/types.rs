use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::geo::{GeoError, GeoPoint};

/// Persisted café entry as read from the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CafeRecord {
    #[serde(skip_serializing)]
    pub id: i64,
    pub name: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub opening_hours: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Mean of all ratings for the café, `0.0` when unrated.
    pub rating: f64,
}

impl CafeRecord {
    /// Returns the café location, or an error if the stored coordinates are unusable.
    pub fn location(&self) -> Result<GeoPoint, GeoError> {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// A café paired with its distance from a search origin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedResult {
    #[serde(flatten)]
    pub cafe: CafeRecord,
    /// Great-circle distance in kilometers.
    pub distance: f64,
}

/// Star rating constrained to `1..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RatingValue(u8);

impl RatingValue {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: i64) -> Result<Self, RatingValueError> {
        if (i64::from(Self::MIN)..=i64::from(Self::MAX)).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(RatingValueError::OutOfRange(value))
        }
    }

    /// Accepts a JSON integer, a whole float such as `4.0`, or a string holding
    /// an integer, as sent by form-style clients.
    pub fn from_json(value: Option<&Value>) -> Result<Self, RatingValueError> {
        let parsed = match value {
            None | Some(Value::Null) => return Err(RatingValueError::Missing),
            Some(Value::Number(number)) => number.as_i64().or_else(|| {
                number
                    .as_f64()
                    .filter(|float| float.is_finite() && float.fract() == 0.0)
                    .map(|float| float as i64)
            }),
            Some(Value::String(raw)) => raw.trim().parse::<i64>().ok(),
            Some(_) => None,
        };
        let parsed = parsed.ok_or(RatingValueError::NotInteger)?;
        Self::new(parsed)
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RatingValueError {
    #[error("rating is required")]
    Missing,
    #[error("rating must be an integer")]
    NotInteger,
    #[error("rating must be between 1 and 5 (got {0})")]
    OutOfRange(i64),
}

/// Rating left by a single rater for a café.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rating {
    pub id: i64,
    pub cafe: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    pub rating: RatingValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Free-text review attached to a café.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Review {
    pub id: i64,
    pub cafe: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Review body that is guaranteed not to be blank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewContent(String);

impl ReviewContent {
    pub fn new(raw: impl Into<String>) -> Result<Self, ReviewContentError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(ReviewContentError::Blank);
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReviewContentError {
    #[error("content may not be blank")]
    Blank,
}

/// Mean of the provided rating values, `0.0` for an empty set.
pub fn average_rating(values: &[RatingValue]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let total: u32 = values.iter().map(|value| u32::from(value.get())).sum();
    f64::from(total) / values.len() as f64
}
