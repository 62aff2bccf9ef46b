use std::time::Instant;

use axum::{
    extract::{rejection::PathRejection, Path, Query, State},
    Json,
};
use metrics::{counter, histogram};
use serde::Deserialize;
use tracing::{debug, info};

use cafe_finder_core::ranking::{parse_limit, parse_radius};
use cafe_finder_core::types::{CafeRecord, RankedResult};
use cafe_finder_core::{rank_by_midpoint, rank_by_point, GeoPoint};

use crate::problem::ApiError;
use crate::router::AppState;

/// Defaults applied when a ranking request omits `limit` or `radius_km`.
#[derive(Debug, Clone, Copy)]
pub struct RankingDefaults {
    /// Second location of the midpoint search.
    pub midpoint_reference: GeoPoint,
    pub limit: usize,
    pub radius_km: f64,
}

#[derive(Debug, Default, Deserialize)]
pub struct NearbyQuery {
    latitude: Option<String>,
    longitude: Option<String>,
    limit: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MidpointQuery {
    user1_latitude: Option<String>,
    user1_longitude: Option<String>,
    radius_km: Option<String>,
    limit: Option<String>,
}

/// `GET /api/cafes/nearby`: closest cafés to the caller's position.
pub async fn nearby(
    State(state): State<AppState>,
    Query(query): Query<NearbyQuery>,
) -> Result<Json<Vec<RankedResult>>, ApiError> {
    let result = nearby_inner(&state, &query).await;
    record_query("nearby", &result);
    result.map(Json)
}

async fn nearby_inner(
    state: &AppState,
    query: &NearbyQuery,
) -> Result<Vec<RankedResult>, ApiError> {
    let origin = GeoPoint::parse(
        query.latitude.as_deref(),
        query.longitude.as_deref(),
        "latitude",
        "longitude",
    )?;
    let limit = parse_limit(query.limit.as_deref(), state.ranking().limit)?;

    let start = Instant::now();
    let cafes = state.storage().cafes().list_all().await?;
    let results = rank_by_point(&cafes, origin, limit);
    histogram!("ranking_duration_seconds", "kind" => "nearby")
        .record(start.elapsed().as_secs_f64());

    debug!(
        stage = "api",
        latitude = origin.latitude(),
        longitude = origin.longitude(),
        limit,
        candidates = cafes.len(),
        returned = results.len(),
        "nearby cafes ranked"
    );
    Ok(results)
}

/// `GET /api/cafes/midpoint`: cafés around the midpoint between the caller
/// and the configured reference location.
pub async fn midpoint(
    State(state): State<AppState>,
    Query(query): Query<MidpointQuery>,
) -> Result<Json<Vec<RankedResult>>, ApiError> {
    let result = midpoint_inner(&state, &query).await;
    record_query("midpoint", &result);
    result.map(Json)
}

async fn midpoint_inner(
    state: &AppState,
    query: &MidpointQuery,
) -> Result<Vec<RankedResult>, ApiError> {
    let user = GeoPoint::parse(
        query.user1_latitude.as_deref(),
        query.user1_longitude.as_deref(),
        "user1_latitude",
        "user1_longitude",
    )?;
    let defaults = state.ranking();
    let radius_km = parse_radius(query.radius_km.as_deref(), defaults.radius_km)?;
    let limit = parse_limit(query.limit.as_deref(), defaults.limit)?;

    let start = Instant::now();
    let cafes = state.storage().cafes().list_all().await?;
    let results = rank_by_midpoint(&cafes, user, defaults.midpoint_reference, radius_km, limit);
    histogram!("ranking_duration_seconds", "kind" => "midpoint")
        .record(start.elapsed().as_secs_f64());

    let mid = user.midpoint(&defaults.midpoint_reference);
    debug!(
        stage = "api",
        mid_latitude = mid.latitude(),
        mid_longitude = mid.longitude(),
        radius_km,
        limit,
        returned = results.len(),
        "midpoint cafes ranked"
    );
    Ok(results)
}

/// `GET /api/cafes/:name`
pub async fn detail(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<CafeRecord>, ApiError> {
    let Path(name) = path?;
    let result = state
        .storage()
        .cafes()
        .fetch_by_name(&name)
        .await
        .map_err(ApiError::from);
    record_query("detail", &result);
    if let Err(ApiError::NotFound(_)) = &result {
        info!(stage = "api", cafe = %name, "cafe lookup missed");
    }
    result.map(Json)
}

fn record_query<T>(kind: &'static str, result: &Result<T, ApiError>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(err) => err.kind(),
    };
    counter!("cafe_queries_total", "kind" => kind, "result" => outcome).increment(1);
}
