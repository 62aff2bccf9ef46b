use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use thiserror::Error;

use cafe_finder_core::types::CafeRecord;

use crate::{is_unique_violation, to_rfc3339};

const CAFE_COLUMNS: &str =
    "id, name, address, latitude, longitude, opening_hours, status, rating";

/// Repository for café records.
#[derive(Clone)]
pub struct CafeRepository {
    pool: SqlitePool,
}

impl CafeRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Loads every café in store order (ascending id).
    pub async fn list_all(&self) -> Result<Vec<CafeRecord>, CafeError> {
        let rows = sqlx::query_as::<_, CafeRow>(&format!(
            "SELECT {CAFE_COLUMNS} FROM cafes ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(CafeRow::into_domain).collect())
    }

    /// Looks up a café by its exact name.
    ///
    /// Two matching rows are reported as [`CafeError::Ambiguous`] rather than
    /// returning whichever the database yields first.
    pub async fn fetch_by_name(&self, name: &str) -> Result<CafeRecord, CafeError> {
        let mut rows = sqlx::query_as::<_, CafeRow>(&format!(
            "SELECT {CAFE_COLUMNS} FROM cafes WHERE name = ? ORDER BY id LIMIT 2"
        ))
        .bind(name)
        .fetch_all(&self.pool)
        .await?;

        match rows.len() {
            0 => Err(CafeError::NotFound),
            1 => Ok(rows.remove(0).into_domain()),
            _ => Err(CafeError::Ambiguous(name.to_string())),
        }
    }

    /// Inserts a café and returns the stored record.
    pub async fn insert(
        &self,
        cafe: &NewCafe,
        now: DateTime<Utc>,
    ) -> Result<CafeRecord, CafeError> {
        let timestamp = to_rfc3339(now);
        let row = sqlx::query_as::<_, CafeRow>(&format!(
            "INSERT INTO cafes \
             (name, address, latitude, longitude, opening_hours, status, rating, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?) \
             RETURNING {CAFE_COLUMNS}"
        ))
        .bind(&cafe.name)
        .bind(&cafe.address)
        .bind(cafe.latitude)
        .bind(cafe.longitude)
        .bind(&cafe.opening_hours)
        .bind(&cafe.status)
        .bind(&timestamp)
        .bind(&timestamp)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                CafeError::DuplicateName(cafe.name.clone())
            } else {
                CafeError::Database(err)
            }
        })?;

        Ok(row.into_domain())
    }
}

/// Parameters required to insert a café.
#[derive(Debug, Clone)]
pub struct NewCafe {
    pub name: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub opening_hours: String,
    pub status: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct CafeRow {
    id: i64,
    name: String,
    address: String,
    latitude: f64,
    longitude: f64,
    opening_hours: String,
    status: Option<String>,
    rating: f64,
}

impl CafeRow {
    fn into_domain(self) -> CafeRecord {
        CafeRecord {
            id: self.id,
            name: self.name,
            address: self.address,
            latitude: self.latitude,
            longitude: self.longitude,
            opening_hours: self.opening_hours,
            status: self.status,
            rating: self.rating,
        }
    }
}

/// Errors that can occur while reading or inserting cafés.
#[derive(Debug, Error)]
pub enum CafeError {
    #[error("cafe not found")]
    NotFound,
    #[error("more than one cafe is named {0:?}")]
    Ambiguous(String),
    #[error("a cafe named {0:?} already exists")]
    DuplicateName(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
