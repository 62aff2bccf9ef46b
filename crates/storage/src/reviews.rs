use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use thiserror::Error;

use cafe_finder_core::types::{Review, ReviewContent};

use crate::{is_foreign_key_violation, to_rfc3339};

const REVIEW_SELECT: &str = "SELECT r.id, c.name AS cafe, r.content, r.created_at \
     FROM reviews AS r \
     JOIN cafes AS c ON c.id = r.cafe_id";

/// Repository for café reviews.
#[derive(Clone)]
pub struct ReviewRepository {
    pool: SqlitePool,
}

impl ReviewRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Lists the reviews of a café, oldest first. Unknown cafés yield an empty list.
    pub async fn list_for_cafe(&self, cafe_name: &str) -> Result<Vec<Review>, ReviewError> {
        let rows = sqlx::query_as::<_, ReviewRow>(&format!(
            "{REVIEW_SELECT} WHERE c.name = ? ORDER BY r.id"
        ))
        .bind(cafe_name)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ReviewRow::into_domain).collect())
    }

    /// Attaches a new review to the named café.
    pub async fn insert(
        &self,
        cafe_name: &str,
        content: &ReviewContent,
        now: DateTime<Utc>,
    ) -> Result<Review, ReviewError> {
        let cafe_id: i64 = sqlx::query("SELECT id FROM cafes WHERE name = ?")
            .bind(cafe_name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ReviewError::CafeNotFound)?
            .get("id");

        let timestamp = to_rfc3339(now);
        let id: i64 = sqlx::query(
            "INSERT INTO reviews (cafe_id, content, created_at, updated_at) \
             VALUES (?, ?, ?, ?) \
             RETURNING id",
        )
        .bind(cafe_id)
        .bind(content.as_str())
        .bind(&timestamp)
        .bind(&timestamp)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            if is_foreign_key_violation(&err) {
                ReviewError::CafeNotFound
            } else {
                ReviewError::Database(err)
            }
        })?
        .get("id");

        self.fetch(id).await
    }

    /// Loads a single review by id.
    pub async fn fetch(&self, id: i64) -> Result<Review, ReviewError> {
        let row = sqlx::query_as::<_, ReviewRow>(&format!("{REVIEW_SELECT} WHERE r.id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ReviewError::NotFound)?;
        Ok(row.into_domain())
    }

    /// Replaces the content of an existing review.
    pub async fn update(
        &self,
        id: i64,
        content: &ReviewContent,
        now: DateTime<Utc>,
    ) -> Result<Review, ReviewError> {
        let result = sqlx::query("UPDATE reviews SET content = ?, updated_at = ? WHERE id = ?")
            .bind(content.as_str())
            .bind(to_rfc3339(now))
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ReviewError::NotFound);
        }
        self.fetch(id).await
    }

    pub async fn delete(&self, id: i64) -> Result<(), ReviewError> {
        let result = sqlx::query("DELETE FROM reviews WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ReviewError::NotFound);
        }
        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ReviewRow {
    id: i64,
    cafe: String,
    content: String,
    created_at: DateTime<Utc>,
}

impl ReviewRow {
    fn into_domain(self) -> Review {
        Review {
            id: self.id,
            cafe: self.cafe,
            content: self.content,
            created_at: self.created_at,
        }
    }
}

/// Errors that can occur while reading or writing reviews.
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("cafe not found")]
    CafeNotFound,
    #[error("review not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
