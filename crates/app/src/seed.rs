use std::{fs, io, path::Path};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use cafe_finder_core::{GeoError, GeoPoint};
use cafe_finder_storage::{CafeError, Database, NewCafe};

#[derive(Debug, Deserialize)]
struct SeedCafe {
    name: String,
    address: String,
    latitude: f64,
    longitude: f64,
    opening_hours: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("failed to read seed file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("seed file {path} is not a JSON array of cafes: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("seed cafe {name} has invalid coordinates: {source}")]
    Coordinates {
        name: String,
        #[source]
        source: GeoError,
    },
    #[error("failed to insert seed cafe: {0}")]
    Insert(#[from] CafeError),
}

/// Inserts the cafés listed in the JSON file at `path`.
///
/// Names already in the store are left untouched, so the same file can be
/// loaded on every start. Returns how many cafés were inserted.
pub async fn seed_cafes(
    database: &Database,
    path: &Path,
    now: DateTime<Utc>,
) -> Result<usize, SeedError> {
    let path_display = path.display().to_string();
    let raw = fs::read_to_string(path).map_err(|source| SeedError::Read {
        path: path_display.clone(),
        source,
    })?;
    let entries: Vec<SeedCafe> = serde_json::from_str(&raw).map_err(|source| SeedError::Parse {
        path: path_display.clone(),
        source,
    })?;

    // Validate the whole file before writing anything.
    for entry in &entries {
        GeoPoint::new(entry.latitude, entry.longitude).map_err(|source| {
            SeedError::Coordinates {
                name: entry.name.clone(),
                source,
            }
        })?;
    }

    let repo = database.cafes();
    let mut inserted = 0;
    for entry in entries {
        let cafe = NewCafe {
            name: entry.name,
            address: entry.address,
            latitude: entry.latitude,
            longitude: entry.longitude,
            opening_hours: entry.opening_hours,
            status: entry.status,
        };
        match repo.insert(&cafe, now).await {
            Ok(_) => inserted += 1,
            Err(CafeError::DuplicateName(name)) => {
                debug!(stage = "seed", %name, "cafe already present");
            }
            Err(err) => return Err(err.into()),
        }
    }

    info!(stage = "seed", path = %path_display, inserted, "seed cafes loaded");
    Ok(inserted)
}
