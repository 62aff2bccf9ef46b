use chrono::{DateTime, Utc};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use thiserror::Error;

use cafe_finder_core::types::{average_rating, Rating, RatingValue};

use crate::{is_foreign_key_violation, to_rfc3339};

const RATING_SELECT: &str = "SELECT r.id, c.name AS cafe, r.rater, r.rating, r.created_at, r.updated_at \
     FROM ratings AS r \
     JOIN cafes AS c ON c.id = r.cafe_id";

/// Repository for ratings.
///
/// Every write recomputes the owning café's average inside the same
/// transaction, so `cafes.rating` always reflects the committed rating set.
#[derive(Clone)]
pub struct RatingRepository {
    pool: SqlitePool,
}

impl RatingRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Creates or replaces the rating a rater gave to a café.
    ///
    /// `rater = None` is the anonymous slot; anonymous ratings overwrite each other.
    pub async fn upsert(
        &self,
        cafe_name: &str,
        rater: Option<&str>,
        value: RatingValue,
        now: DateTime<Utc>,
    ) -> Result<RatingUpsert, RatingError> {
        let cafe_id = self.cafe_id(cafe_name).await?;
        let rater = rater.unwrap_or_default();
        let timestamp = to_rfc3339(now);

        // The first statement writes, so the transaction holds the write lock
        // before the average is read back.
        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            "INSERT INTO ratings (cafe_id, rater, rating, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(cafe_id, rater) DO NOTHING",
        )
        .bind(cafe_id)
        .bind(rater)
        .bind(i64::from(value.get()))
        .bind(&timestamp)
        .bind(&timestamp)
        .execute(&mut *tx)
        .await
        .map_err(map_write_error)?;

        let created = inserted.rows_affected() == 1;
        if !created {
            sqlx::query(
                "UPDATE ratings SET rating = ?, updated_at = ? WHERE cafe_id = ? AND rater = ?",
            )
            .bind(i64::from(value.get()))
            .bind(&timestamp)
            .bind(cafe_id)
            .bind(rater)
            .execute(&mut *tx)
            .await?;
        }

        let average_rating = recompute_average(&mut tx, cafe_id, &timestamp).await?;
        let row = sqlx::query_as::<_, RatingRow>(&format!(
            "{RATING_SELECT} WHERE r.cafe_id = ? AND r.rater = ?"
        ))
        .bind(cafe_id)
        .bind(rater)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(RatingUpsert {
            rating: row.into_domain()?,
            created,
            average_rating,
        })
    }

    /// Mean of the café's current ratings, `0.0` when it has none.
    pub async fn average_for_cafe(&self, cafe_name: &str) -> Result<f64, RatingError> {
        let cafe_id = self.cafe_id(cafe_name).await?;
        let values = sqlx::query("SELECT rating FROM ratings WHERE cafe_id = ?")
            .bind(cafe_id)
            .fetch_all(&self.pool)
            .await?;
        let values = values
            .iter()
            .map(|row| stored_value(row.get("rating")))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(average_rating(&values))
    }

    /// Loads a single rating by id.
    pub async fn fetch(&self, id: i64) -> Result<Rating, RatingError> {
        let row = sqlx::query_as::<_, RatingRow>(&format!("{RATING_SELECT} WHERE r.id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RatingError::NotFound)?;
        row.into_domain()
    }

    /// Replaces the value of an existing rating.
    pub async fn update(
        &self,
        id: i64,
        value: RatingValue,
        now: DateTime<Utc>,
    ) -> Result<RatingWrite, RatingError> {
        let timestamp = to_rfc3339(now);
        let mut tx = self.pool.begin().await?;
        let cafe_id: i64 = sqlx::query(
            "UPDATE ratings SET rating = ?, updated_at = ? WHERE id = ? RETURNING cafe_id",
        )
        .bind(i64::from(value.get()))
        .bind(&timestamp)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RatingError::NotFound)?
        .get("cafe_id");

        let average_rating = recompute_average(&mut tx, cafe_id, &timestamp).await?;
        let row = sqlx::query_as::<_, RatingRow>(&format!("{RATING_SELECT} WHERE r.id = ?"))
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(RatingWrite {
            rating: Some(row.into_domain()?),
            average_rating,
        })
    }

    /// Deletes a rating and returns the café's recomputed average.
    pub async fn delete(&self, id: i64, now: DateTime<Utc>) -> Result<RatingWrite, RatingError> {
        let timestamp = to_rfc3339(now);
        let mut tx = self.pool.begin().await?;
        let cafe_id: i64 = sqlx::query("DELETE FROM ratings WHERE id = ? RETURNING cafe_id")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(RatingError::NotFound)?
            .get("cafe_id");

        let average_rating = recompute_average(&mut tx, cafe_id, &timestamp).await?;
        tx.commit().await?;

        Ok(RatingWrite {
            rating: None,
            average_rating,
        })
    }

    async fn cafe_id(&self, cafe_name: &str) -> Result<i64, RatingError> {
        let row = sqlx::query("SELECT id FROM cafes WHERE name = ?")
            .bind(cafe_name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RatingError::CafeNotFound)?;
        Ok(row.get("id"))
    }
}

async fn recompute_average(
    tx: &mut Transaction<'_, Sqlite>,
    cafe_id: i64,
    timestamp: &str,
) -> Result<f64, RatingError> {
    let rows = sqlx::query("SELECT rating FROM ratings WHERE cafe_id = ?")
        .bind(cafe_id)
        .fetch_all(&mut **tx)
        .await?;
    let values = rows
        .iter()
        .map(|row| stored_value(row.get("rating")))
        .collect::<Result<Vec<_>, _>>()?;
    let average = average_rating(&values);

    sqlx::query("UPDATE cafes SET rating = ?, updated_at = ? WHERE id = ?")
        .bind(average)
        .bind(timestamp)
        .bind(cafe_id)
        .execute(&mut **tx)
        .await?;

    Ok(average)
}

fn stored_value(raw: i64) -> Result<RatingValue, RatingError> {
    RatingValue::new(raw).map_err(|_| RatingError::CorruptValue(raw))
}

fn map_write_error(err: sqlx::Error) -> RatingError {
    if is_foreign_key_violation(&err) {
        RatingError::CafeNotFound
    } else {
        RatingError::Database(err)
    }
}

/// Outcome of [`RatingRepository::upsert`].
#[derive(Debug, Clone)]
pub struct RatingUpsert {
    pub rating: Rating,
    pub created: bool,
    pub average_rating: f64,
}

/// Outcome of updating or deleting a rating.
#[derive(Debug, Clone)]
pub struct RatingWrite {
    /// The rating after the write; `None` once deleted.
    pub rating: Option<Rating>,
    pub average_rating: f64,
}

#[derive(Debug, sqlx::FromRow)]
struct RatingRow {
    id: i64,
    cafe: String,
    rater: String,
    rating: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RatingRow {
    fn into_domain(self) -> Result<Rating, RatingError> {
        Ok(Rating {
            id: self.id,
            cafe: self.cafe,
            user: Some(self.rater).filter(|rater| !rater.is_empty()),
            rating: stored_value(self.rating)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Errors that can occur while reading or writing ratings.
#[derive(Debug, Error)]
pub enum RatingError {
    #[error("cafe not found")]
    CafeNotFound,
    #[error("rating not found")]
    NotFound,
    #[error("stored rating value {0} is outside 1..=5")]
    CorruptValue(i64),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::test_support::{fixed_now, new_cafe, setup_db, TestDb};

    fn value(raw: i64) -> RatingValue {
        RatingValue::new(raw).expect("valid rating")
    }

    async fn setup_with_cafe() -> TestDb {
        let test_db = setup_db().await;
        test_db
            .db
            .cafes()
            .insert(&new_cafe("Anthracite", 37.5547, 126.9105), fixed_now())
            .await
            .expect("insert cafe");
        test_db
    }

    async fn stored_average(test_db: &TestDb) -> f64 {
        test_db
            .db
            .cafes()
            .fetch_by_name("Anthracite")
            .await
            .expect("fetch cafe")
            .rating
    }

    #[tokio::test]
    async fn average_follows_upserts_and_deletes() {
        let test_db = setup_with_cafe().await;
        let repo = test_db.db.ratings();

        let mut ids = Vec::new();
        for (rater, raw) in [("ana", 5), ("ben", 3), ("cho", 4)] {
            let outcome = repo
                .upsert("Anthracite", Some(rater), value(raw), fixed_now())
                .await
                .expect("upsert");
            assert!(outcome.created);
            ids.push(outcome.rating.id);
        }
        assert_eq!(stored_average(&test_db).await, 4.0);
        assert_eq!(repo.average_for_cafe("Anthracite").await.unwrap(), 4.0);

        let outcome = repo.delete(ids[1], fixed_now()).await.expect("delete");
        assert_eq!(outcome.average_rating, 4.5);
        assert!(outcome.rating.is_none());
        assert_eq!(stored_average(&test_db).await, 4.5);
    }

    #[tokio::test]
    async fn upsert_replaces_existing_rating_for_same_rater() {
        let test_db = setup_with_cafe().await;
        let repo = test_db.db.ratings();

        let first = repo
            .upsert("Anthracite", Some("ana"), value(2), fixed_now())
            .await
            .expect("first upsert");
        let later = fixed_now() + Duration::minutes(5);
        let second = repo
            .upsert("Anthracite", Some("ana"), value(5), later)
            .await
            .expect("second upsert");

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.rating.id, second.rating.id);
        assert_eq!(second.rating.rating.get(), 5);
        assert_eq!(second.rating.created_at, fixed_now());
        assert_eq!(second.rating.updated_at, later);
        assert_eq!(second.average_rating, 5.0);
        assert_eq!(second.rating.user.as_deref(), Some("ana"));
    }

    #[tokio::test]
    async fn anonymous_ratings_share_one_slot() {
        let test_db = setup_with_cafe().await;
        let repo = test_db.db.ratings();

        repo.upsert("Anthracite", None, value(1), fixed_now())
            .await
            .expect("first anonymous");
        let outcome = repo
            .upsert("Anthracite", None, value(3), fixed_now())
            .await
            .expect("second anonymous");

        assert!(!outcome.created);
        assert!(outcome.rating.user.is_none());
        assert_eq!(outcome.average_rating, 3.0);
    }

    #[tokio::test]
    async fn update_recomputes_average() {
        let test_db = setup_with_cafe().await;
        let repo = test_db.db.ratings();
        repo.upsert("Anthracite", Some("ana"), value(5), fixed_now())
            .await
            .expect("upsert ana");
        let ben = repo
            .upsert("Anthracite", Some("ben"), value(1), fixed_now())
            .await
            .expect("upsert ben");

        let outcome = repo
            .update(ben.rating.id, value(4), fixed_now())
            .await
            .expect("update");
        assert_eq!(outcome.average_rating, 4.5);
        assert_eq!(outcome.rating.map(|r| r.rating.get()), Some(4));
        assert_eq!(stored_average(&test_db).await, 4.5);
    }

    #[tokio::test]
    async fn average_is_zero_without_ratings() {
        let test_db = setup_with_cafe().await;
        let repo = test_db.db.ratings();
        assert_eq!(repo.average_for_cafe("Anthracite").await.unwrap(), 0.0);

        let only = repo
            .upsert("Anthracite", Some("ana"), value(4), fixed_now())
            .await
            .expect("upsert");
        let outcome = repo.delete(only.rating.id, fixed_now()).await.expect("delete");
        assert_eq!(outcome.average_rating, 0.0);
        assert_eq!(stored_average(&test_db).await, 0.0);
    }

    #[tokio::test]
    async fn unknown_cafe_and_rating_are_reported() {
        let test_db = setup_with_cafe().await;
        let repo = test_db.db.ratings();

        let err = repo
            .upsert("Missing", Some("ana"), value(3), fixed_now())
            .await
            .unwrap_err();
        assert!(matches!(err, RatingError::CafeNotFound));
        assert!(matches!(
            repo.average_for_cafe("Missing").await.unwrap_err(),
            RatingError::CafeNotFound
        ));
        assert!(matches!(
            repo.fetch(999).await.unwrap_err(),
            RatingError::NotFound
        ));
        assert!(matches!(
            repo.update(999, value(2), fixed_now()).await.unwrap_err(),
            RatingError::NotFound
        ));
        assert!(matches!(
            repo.delete(999, fixed_now()).await.unwrap_err(),
            RatingError::NotFound
        ));
    }
}
