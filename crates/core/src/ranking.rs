use thiserror::Error;

use crate::geo::GeoPoint;
use crate::types::{CafeRecord, RankedResult};

pub const DEFAULT_LIMIT: usize = 5;
pub const MAX_LIMIT: usize = 50;
pub const DEFAULT_RADIUS_KM: f64 = 5.0;

/// Ranks every café by distance from `origin` and keeps the closest `limit`.
///
/// Ties keep the order of `cafes`. Records with unusable coordinates are skipped.
pub fn rank_by_point(cafes: &[CafeRecord], origin: GeoPoint, limit: usize) -> Vec<RankedResult> {
    rank(cafes, origin, None, limit)
}

/// Ranks cafés around the midpoint of `point_a` and `point_b`, keeping only
/// those within `radius_km` of it.
pub fn rank_by_midpoint(
    cafes: &[CafeRecord],
    point_a: GeoPoint,
    point_b: GeoPoint,
    radius_km: f64,
    limit: usize,
) -> Vec<RankedResult> {
    rank(cafes, point_a.midpoint(&point_b), Some(radius_km), limit)
}

fn rank(
    cafes: &[CafeRecord],
    origin: GeoPoint,
    radius_km: Option<f64>,
    limit: usize,
) -> Vec<RankedResult> {
    let mut ranked: Vec<RankedResult> = cafes
        .iter()
        .filter_map(|cafe| {
            let location = cafe.location().ok()?;
            let distance = origin.distance_km(&location);
            match radius_km {
                Some(radius) if distance > radius => None,
                _ => Some(RankedResult {
                    cafe: cafe.clone(),
                    distance,
                }),
            }
        })
        .collect();

    // `sort_by` is stable, so equal distances keep store order.
    ranked.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    ranked.truncate(limit);
    ranked
}

/// Parses an optional `limit` query value, capping it at [`MAX_LIMIT`].
pub fn parse_limit(raw: Option<&str>, default: usize) -> Result<usize, RankingError> {
    let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(default.min(MAX_LIMIT));
    };
    match raw.parse::<usize>() {
        Ok(0) | Err(_) => Err(RankingError::InvalidLimit(raw.to_string())),
        Ok(limit) => Ok(limit.min(MAX_LIMIT)),
    }
}

/// Parses an optional `radius_km` query value.
pub fn parse_radius(raw: Option<&str>, default: f64) -> Result<f64, RankingError> {
    let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(default);
    };
    raw.parse::<f64>()
        .ok()
        .filter(|radius| radius.is_finite() && *radius >= 0.0)
        .ok_or_else(|| RankingError::InvalidRadius(raw.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RankingError {
    #[error("limit must be a positive integer (got {0})")]
    InvalidLimit(String),
    #[error("radius_km must be a non-negative number (got {0})")]
    InvalidRadius(String),
}
