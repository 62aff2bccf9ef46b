use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use cafe_finder_core::types::{RatingValueError, ReviewContentError};
use cafe_finder_core::{GeoError, RankingError};
use cafe_finder_storage::{CafeError, RatingError, ReviewError};

#[derive(Debug, Serialize)]
struct ProblemDetails {
    #[serde(rename = "type")]
    problem_type: &'static str,
    title: &'static str,
    detail: String,
}

pub struct ProblemResponse {
    status: StatusCode,
    body: ProblemDetails,
}

impl ProblemResponse {
    pub fn new<S: Into<String>>(status: StatusCode, problem_type: &'static str, detail: S) -> Self {
        Self {
            status,
            body: ProblemDetails {
                problem_type,
                title: status.canonical_reason().unwrap_or("error"),
                detail: detail.into(),
            },
        }
    }
}

impl IntoResponse for ProblemResponse {
    fn into_response(self) -> Response {
        let mut response = Json(self.body).into_response();
        *response.status_mut() = self.status;
        response.headers_mut().insert(
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}

/// Error surfaced by the HTTP handlers.
///
/// Internal failures keep their cause for logging; clients only see a generic detail.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{0}")]
    NotFound(String),
    #[error("internal failure: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::NotFound(_) => "not_found",
            Self::Internal(_) => "internal_failure",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.kind();
        match self {
            Self::InvalidArgument(detail) | Self::NotFound(detail) => {
                ProblemResponse::new(status, kind, detail).into_response()
            }
            Self::Internal(cause) => {
                error!(stage = "api", error = %cause, "request failed");
                ProblemResponse::new(status, kind, "the request could not be completed")
                    .into_response()
            }
        }
    }
}

impl From<GeoError> for ApiError {
    fn from(err: GeoError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

impl From<RankingError> for ApiError {
    fn from(err: RankingError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

impl From<RatingValueError> for ApiError {
    fn from(err: RatingValueError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

impl From<ReviewContentError> for ApiError {
    fn from(err: ReviewContentError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(err: JsonRejection) -> Self {
        Self::InvalidArgument(err.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(err: PathRejection) -> Self {
        Self::InvalidArgument(err.body_text())
    }
}

impl From<CafeError> for ApiError {
    fn from(err: CafeError) -> Self {
        match err {
            CafeError::NotFound => Self::NotFound("cafe not found".to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<RatingError> for ApiError {
    fn from(err: RatingError) -> Self {
        match err {
            RatingError::CafeNotFound => Self::NotFound("cafe not found".to_string()),
            RatingError::NotFound => Self::NotFound("rating not found".to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<ReviewError> for ApiError {
    fn from(err: ReviewError) -> Self {
        match err {
            ReviewError::CafeNotFound => Self::NotFound("cafe not found".to_string()),
            ReviewError::NotFound => Self::NotFound("review not found".to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}
