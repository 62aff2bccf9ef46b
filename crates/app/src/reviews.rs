use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    Json,
};
use metrics::counter;
use serde::Deserialize;
use tracing::info;

use cafe_finder_core::types::{Review, ReviewContent};

use crate::problem::ApiError;
use crate::router::AppState;

#[derive(Debug, Deserialize)]
pub struct ReviewPayload {
    #[serde(default)]
    content: String,
}

/// `GET /api/cafes/:name/reviews`
pub async fn list(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<Vec<Review>>, ApiError> {
    let Path(cafe_name) = path?;
    let reviews = state.storage().reviews().list_for_cafe(&cafe_name).await?;
    Ok(Json(reviews))
}

/// `POST /api/cafes/:name/reviews`
pub async fn create(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    payload: Result<Json<ReviewPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<Review>), ApiError> {
    let Path(cafe_name) = path?;
    let Json(payload) = payload?;
    let content = ReviewContent::new(payload.content)?;

    let review = state
        .storage()
        .reviews()
        .insert(&cafe_name, &content, state.now())
        .await?;

    counter!("review_writes_total", "op" => "create").increment(1);
    info!(stage = "api", cafe = %cafe_name, review_id = review.id, "review created");
    Ok((StatusCode::CREATED, Json(review)))
}

/// `GET /api/reviews/:id`
pub async fn fetch(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<Review>, ApiError> {
    let Path(id) = path?;
    let review = state.storage().reviews().fetch(id).await?;
    Ok(Json(review))
}

/// `PUT /api/reviews/:id`
pub async fn update(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<ReviewPayload>, JsonRejection>,
) -> Result<Json<Review>, ApiError> {
    let Path(id) = path?;
    let Json(payload) = payload?;
    let content = ReviewContent::new(payload.content)?;

    let review = state
        .storage()
        .reviews()
        .update(id, &content, state.now())
        .await?;

    counter!("review_writes_total", "op" => "update").increment(1);
    info!(stage = "api", review_id = id, "review updated");
    Ok(Json(review))
}

/// `DELETE /api/reviews/:id`
pub async fn delete(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = path?;
    state.storage().reviews().delete(id).await?;

    counter!("review_writes_total", "op" => "delete").increment(1);
    info!(stage = "api", review_id = id, "review deleted");
    Ok(StatusCode::NO_CONTENT)
}
