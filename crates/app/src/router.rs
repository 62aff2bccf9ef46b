use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;

use cafe_finder_storage::Database;

use crate::cafes::{self, RankingDefaults};
use crate::{ratings, reviews, telemetry};

#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    storage: Database,
    clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
    ranking: RankingDefaults,
}

impl AppState {
    pub fn new(metrics: PrometheusHandle, storage: Database, ranking: RankingDefaults) -> Self {
        Self {
            metrics,
            storage,
            clock: Arc::new(Utc::now),
            ranking,
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>) -> Self {
        self.clock = clock;
        self
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn storage(&self) -> &Database {
        &self.storage
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    pub fn ranking(&self) -> RankingDefaults {
        self.ranking
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/api/cafes/nearby", get(cafes::nearby))
        .route("/api/cafes/midpoint", get(cafes::midpoint))
        .route("/api/cafes/:name", get(cafes::detail))
        .route(
            "/api/cafes/:name/ratings",
            get(ratings::average).post(ratings::upsert),
        )
        .route(
            "/api/ratings/:id",
            get(ratings::fetch)
                .put(ratings::update)
                .delete(ratings::delete),
        )
        .route(
            "/api/cafes/:name/reviews",
            get(reviews::list).post(reviews::create),
        )
        .route(
            "/api/reviews/:id",
            get(reviews::fetch)
                .put(reviews::update)
                .delete(reviews::delete),
        )
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = telemetry::render_metrics(state.metrics());
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        Body::from(body),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Method, Request};
    use chrono::TimeZone;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use cafe_finder_core::GeoPoint;
    use cafe_finder_storage::NewCafe;

    struct TestApp {
        router: Router,
        _dir: TempDir,
    }

    impl TestApp {
        async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
            let builder = Request::builder().method(method).uri(uri);
            let request = match body {
                Some(body) => builder
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };

            let response = self
                .router
                .clone()
                .oneshot(request)
                .await
                .expect("handler should respond");
            let status = response.status();
            let bytes = response
                .into_body()
                .collect()
                .await
                .expect("body should read")
                .to_bytes();
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes)
                    .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
            };
            (status, value)
        }

        async fn get(&self, uri: &str) -> (StatusCode, Value) {
            self.request(Method::GET, uri, None).await
        }
    }

    fn cafe(name: &str, latitude: f64, longitude: f64) -> NewCafe {
        NewCafe {
            name: name.to_string(),
            address: format!("{name} address"),
            latitude,
            longitude,
            opening_hours: "08:00-22:00".to_string(),
            status: Some("open".to_string()),
        }
    }

    async fn setup_app() -> TestApp {
        let metrics = telemetry::init_metrics().expect("metrics init");
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite://{}", dir.path().join("cafes.db").display());
        let database = Database::connect(&url).await.expect("connect");
        database.run_migrations().await.expect("migrations");

        let now = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
        for new_cafe in [
            cafe("CityHall", 37.5665, 126.9780),
            cafe("Jongno", 37.5704, 126.9920),
            cafe("Itaewon", 37.5345, 126.9946),
            cafe("Hongdae", 37.5563, 126.9220),
            cafe("Yeouido", 37.5219, 126.9245),
            cafe("Gangnam", 37.4979, 127.0276),
            cafe("Busan", 35.1796, 129.0756),
            cafe("Midway", 37.2783305, 126.9528902),
        ] {
            database
                .cafes()
                .insert(&new_cafe, now)
                .await
                .expect("seed cafe");
        }

        let ranking = RankingDefaults {
            midpoint_reference: GeoPoint::new(37.556661, 126.9057804).expect("reference"),
            limit: 5,
            radius_km: 5.0,
        };
        let state = AppState::new(metrics, database, ranking).with_clock(Arc::new(move || now));
        TestApp {
            router: app_router(state),
            _dir: dir,
        }
    }

    fn names(body: &Value) -> Vec<&str> {
        body.as_array()
            .expect("array body")
            .iter()
            .map(|item| item["name"].as_str().expect("name"))
            .collect()
    }

    #[tokio::test]
    async fn healthz_returns_ok() {
        let app = setup_app().await;
        let (status, _) = app.get("/healthz").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_exports_build_info() {
        let app = setup_app().await;
        let (status, body) = app.get("/metrics").await;

        assert_eq!(status, StatusCode::OK);
        let text = body.as_str().expect("plain text body");
        assert!(text.contains("app_build_info"));
        assert!(text.contains("app_uptime_seconds"));
    }

    #[tokio::test]
    async fn nearby_returns_closest_cafes_in_order() {
        let app = setup_app().await;
        let (status, body) = app
            .get("/api/cafes/nearby?latitude=37.5665&longitude=126.9780")
            .await;

        assert_eq!(status, StatusCode::OK);
        let items = body.as_array().expect("array");
        assert_eq!(items.len(), 5);
        assert_eq!(items[0]["name"], "CityHall");
        assert!(items[0]["distance"].as_f64().expect("distance") < 1e-3);
        assert_eq!(items[0]["opening_hours"], "08:00-22:00");
        assert_eq!(items[0]["status"], "open");

        let distances: Vec<f64> = items
            .iter()
            .map(|item| item["distance"].as_f64().expect("distance"))
            .collect();
        assert!(distances.windows(2).all(|pair| pair[0] <= pair[1]));
        assert!(!names(&body).contains(&"Busan"));
    }

    #[tokio::test]
    async fn nearby_honours_limit_parameter() {
        let app = setup_app().await;
        let (status, body) = app
            .get("/api/cafes/nearby?latitude=37.5665&longitude=126.9780&limit=2")
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(names(&body), vec!["CityHall", "Jongno"]);

        let (status, body) = app
            .get("/api/cafes/nearby?latitude=37.5665&longitude=126.9780&limit=0")
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["type"], "invalid_argument");
    }

    #[tokio::test]
    async fn nearby_rejects_non_numeric_latitude() {
        let app = setup_app().await;
        let (status, body) = app
            .get("/api/cafes/nearby?latitude=abc&longitude=126.9780")
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["type"], "invalid_argument");
        assert_eq!(body["detail"], "latitude must be numeric");
    }

    #[tokio::test]
    async fn nearby_requires_both_coordinates() {
        let app = setup_app().await;
        let (status, body) = app.get("/api/cafes/nearby?latitude=37.5").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "latitude and longitude are required");
    }

    #[tokio::test]
    async fn midpoint_returns_cafes_within_radius() {
        let app = setup_app().await;
        let (status, body) = app
            .get("/api/cafes/midpoint?user1_latitude=37.0&user1_longitude=127.0")
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(names(&body), vec!["Midway"]);
        assert!(body[0]["distance"].as_f64().expect("distance") < 1e-3);
        assert_eq!(body[0]["latitude"], 37.2783305);
    }

    #[tokio::test]
    async fn midpoint_zero_radius_keeps_exact_match() {
        let app = setup_app().await;
        let (status, body) = app
            .get("/api/cafes/midpoint?user1_latitude=37.0&user1_longitude=127.0&radius_km=0")
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(names(&body), vec!["Midway"]);
        assert_eq!(body[0]["distance"], 0.0);
    }

    #[tokio::test]
    async fn midpoint_radius_can_be_widened() {
        let app = setup_app().await;
        let (status, body) = app
            .get("/api/cafes/midpoint?user1_latitude=37.0&user1_longitude=127.0&radius_km=40&limit=3")
            .await;

        assert_eq!(status, StatusCode::OK);
        let items = body.as_array().expect("array");
        assert_eq!(items.len(), 3);
        assert_eq!(items[0]["name"], "Midway");
        assert!(items
            .iter()
            .all(|item| item["distance"].as_f64().expect("distance") <= 40.0));
    }

    #[tokio::test]
    async fn midpoint_rejects_missing_user_coordinates() {
        let app = setup_app().await;
        let (status, body) = app.get("/api/cafes/midpoint?user1_latitude=37.0").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["detail"],
            "user1_latitude and user1_longitude are required"
        );
    }

    #[tokio::test]
    async fn detail_returns_cafe_or_404() {
        let app = setup_app().await;
        let (status, body) = app.get("/api/cafes/Jongno").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Jongno");
        assert_eq!(body["address"], "Jongno address");
        assert_eq!(body["rating"], 0.0);

        let (status, body) = app.get("/api/cafes/Nowhere").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["type"], "not_found");
    }

    #[tokio::test]
    async fn rating_average_follows_writes() {
        let app = setup_app().await;

        let mut ids = Vec::new();
        for (user, rating) in [("ana", json!(5)), ("ben", json!("3")), ("cho", json!(4))] {
            let (status, body) = app
                .request(
                    Method::POST,
                    "/api/cafes/CityHall/ratings",
                    Some(json!({ "rating": rating, "user": user })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED);
            ids.push(body["rating"]["id"].as_i64().expect("rating id"));
        }

        let (status, body) = app.get("/api/cafes/CityHall/ratings").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["average_rating"], 4.0);

        let (status, _) = app
            .request(Method::DELETE, &format!("/api/ratings/{}", ids[1]), None)
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, body) = app.get("/api/cafes/CityHall/ratings").await;
        assert_eq!(body["average_rating"], 4.5);
        let (_, body) = app.get("/api/cafes/CityHall").await;
        assert_eq!(body["rating"], 4.5);
    }

    #[tokio::test]
    async fn rating_replacement_and_update() {
        let app = setup_app().await;
        let (status, first) = app
            .request(
                Method::POST,
                "/api/cafes/Hongdae/ratings",
                Some(json!({ "rating": 2, "user": "ana" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(first["rating"]["user"], "ana");
        assert_eq!(first["rating"]["cafe"], "Hongdae");

        let (status, second) = app
            .request(
                Method::POST,
                "/api/cafes/Hongdae/ratings",
                Some(json!({ "rating": 4, "user": "ana" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(second["rating"]["id"], first["rating"]["id"]);
        assert_eq!(second["average_rating"], 4.0);

        let id = first["rating"]["id"].as_i64().expect("id");
        let (status, updated) = app
            .request(
                Method::PUT,
                &format!("/api/ratings/{id}"),
                Some(json!({ "rating": 1 })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["rating"]["rating"], 1);
        assert_eq!(updated["average_rating"], 1.0);

        let (status, fetched) = app.get(&format!("/api/ratings/{id}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["rating"], 1);
    }

    #[tokio::test]
    async fn rating_validation_and_missing_targets() {
        let app = setup_app().await;
        for payload in [json!({}), json!({ "rating": 0 }), json!({ "rating": 6 }), json!({ "rating": "x" })] {
            let (status, body) = app
                .request(Method::POST, "/api/cafes/CityHall/ratings", Some(payload))
                .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["type"], "invalid_argument");
        }

        let (status, _) = app
            .request(
                Method::POST,
                "/api/cafes/Nowhere/ratings",
                Some(json!({ "rating": 3 })),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = app.get("/api/cafes/Nowhere/ratings").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = app.request(Method::DELETE, "/api/ratings/999", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = app.get("/api/ratings/not-a-number").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["type"], "invalid_argument");
    }

    #[tokio::test]
    async fn review_lifecycle() {
        let app = setup_app().await;
        let (status, created) = app
            .request(
                Method::POST,
                "/api/cafes/Itaewon/reviews",
                Some(json!({ "content": "Great pour-over" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["cafe"], "Itaewon");
        assert_eq!(created["content"], "Great pour-over");
        assert_eq!(created["created_at"], "2024-05-01T09:30:00Z");

        let (status, list) = app.get("/api/cafes/Itaewon/reviews").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().map(Vec::len), Some(1));

        let id = created["id"].as_i64().expect("review id");
        let (status, updated) = app
            .request(
                Method::PUT,
                &format!("/api/reviews/{id}"),
                Some(json!({ "content": "Great pour-over, slow service" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["content"], "Great pour-over, slow service");

        let (status, _) = app
            .request(Method::DELETE, &format!("/api/reviews/{id}"), None)
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = app.get(&format!("/api/reviews/{id}")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn review_validation_and_missing_cafe() {
        let app = setup_app().await;
        let (status, body) = app
            .request(
                Method::POST,
                "/api/cafes/Itaewon/reviews",
                Some(json!({ "content": "   " })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "content may not be blank");

        let (status, _) = app
            .request(
                Method::POST,
                "/api/cafes/Nowhere/reviews",
                Some(json!({ "content": "hello" })),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, list) = app.get("/api/cafes/Nowhere/reviews").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list, json!([]));
    }

    #[tokio::test]
    async fn review_update_validates_content_and_target() {
        let app = setup_app().await;
        let (_, created) = app
            .request(
                Method::POST,
                "/api/cafes/Hongdae/reviews",
                Some(json!({ "content": "Cozy" })),
            )
            .await;
        let id = created["id"].as_i64().expect("review id");

        let (status, body) = app
            .request(
                Method::PUT,
                &format!("/api/reviews/{id}"),
                Some(json!({ "content": "  " })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "content may not be blank");

        let (_, unchanged) = app.get(&format!("/api/reviews/{id}")).await;
        assert_eq!(unchanged["content"], "Cozy");

        let (status, body) = app
            .request(
                Method::PUT,
                "/api/reviews/9999",
                Some(json!({ "content": "Still cozy" })),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["type"], "not_found");
    }
}
