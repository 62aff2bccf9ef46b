mod cafes;
mod problem;
mod ratings;
mod reviews;
mod router;
mod seed;
mod telemetry;

use std::net::SocketAddr;

use tracing::info;

use cafe_finder_core::GeoPoint;
use cafe_finder_storage::Database;
use cafe_finder_util::{load_env_file, AppConfig};

use crate::cafes::RankingDefaults;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;
    let metrics = telemetry::init_metrics()?;

    let reference = config.midpoint_reference;
    let ranking = RankingDefaults {
        midpoint_reference: GeoPoint::new(reference.latitude, reference.longitude)?,
        limit: config.nearby_limit,
        radius_km: config.midpoint_radius_km,
    };

    let database = Database::connect(&config.database_url).await?;
    database.run_migrations().await?;
    info!(stage = "storage", url = %config.database_url, "database ready");

    if let Some(path) = &config.seed_file {
        seed::seed_cafes(&database, path, chrono::Utc::now()).await?;
    }

    let state = router::AppState::new(metrics, database, ranking);

    let addr: SocketAddr = config.bind_addr;
    info!(stage = "app", %addr, env = %config.environment.as_str(), "starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router::app_router(state))
        .await
        .map_err(|err| err.into())
}
