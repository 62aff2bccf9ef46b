use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use cafe_finder_core::types::{Rating, RatingValue};

use crate::problem::ApiError;
use crate::router::AppState;

#[derive(Debug, Deserialize)]
pub struct RatingPayload {
    #[serde(default)]
    rating: Option<Value>,
    /// Identifier of the rater; omitted for anonymous ratings.
    #[serde(default)]
    user: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RatingSaved {
    message: &'static str,
    rating: Rating,
    average_rating: f64,
}

#[derive(Debug, Serialize)]
pub struct AverageRating {
    average_rating: f64,
}

/// `POST /api/cafes/:name/ratings`
///
/// Answers `201 Created` for a new rating and `200 OK` when the rater's
/// existing rating was replaced.
pub async fn upsert(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    payload: Result<Json<RatingPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<RatingSaved>), ApiError> {
    let Path(cafe_name) = path?;
    let Json(payload) = payload?;
    let value = RatingValue::from_json(payload.rating.as_ref())?;
    let user = payload
        .user
        .as_deref()
        .map(str::trim)
        .filter(|user| !user.is_empty());

    let outcome = state
        .storage()
        .ratings()
        .upsert(&cafe_name, user, value, state.now())
        .await?;

    let op = if outcome.created { "create" } else { "replace" };
    counter!("rating_writes_total", "op" => op).increment(1);
    info!(
        stage = "api",
        cafe = %cafe_name,
        rating = value.get(),
        created = outcome.created,
        average = outcome.average_rating,
        "rating saved"
    );

    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(RatingSaved {
            message: "rating saved",
            rating: outcome.rating,
            average_rating: outcome.average_rating,
        }),
    ))
}

/// `GET /api/cafes/:name/ratings`
pub async fn average(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<AverageRating>, ApiError> {
    let Path(cafe_name) = path?;
    let average_rating = state
        .storage()
        .ratings()
        .average_for_cafe(&cafe_name)
        .await?;
    Ok(Json(AverageRating { average_rating }))
}

/// `GET /api/ratings/:id`
pub async fn fetch(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<Rating>, ApiError> {
    let Path(id) = path?;
    let rating = state.storage().ratings().fetch(id).await?;
    Ok(Json(rating))
}

/// `PUT /api/ratings/:id`
pub async fn update(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<RatingPayload>, JsonRejection>,
) -> Result<Json<RatingSaved>, ApiError> {
    let Path(id) = path?;
    let Json(payload) = payload?;
    let value = RatingValue::from_json(payload.rating.as_ref())?;

    let outcome = state
        .storage()
        .ratings()
        .update(id, value, state.now())
        .await?;
    let rating = outcome
        .rating
        .ok_or_else(|| ApiError::Internal(format!("rating {id} vanished during update")))?;

    counter!("rating_writes_total", "op" => "update").increment(1);
    info!(
        stage = "api",
        rating_id = id,
        rating = value.get(),
        average = outcome.average_rating,
        "rating updated"
    );

    Ok(Json(RatingSaved {
        message: "rating updated",
        rating,
        average_rating: outcome.average_rating,
    }))
}

/// `DELETE /api/ratings/:id`
pub async fn delete(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = path?;
    let outcome = state.storage().ratings().delete(id, state.now()).await?;

    counter!("rating_writes_total", "op" => "delete").increment(1);
    info!(
        stage = "api",
        rating_id = id,
        average = outcome.average_rating,
        "rating deleted"
    );
    Ok(StatusCode::NO_CONTENT)
}
