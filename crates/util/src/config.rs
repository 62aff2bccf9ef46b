use std::{env, fmt, net::SocketAddr, path::PathBuf};

use super::{database_url, server_bind_address};

const DEFAULT_MIDPOINT_REFERENCE: ReferencePoint = ReferencePoint {
    latitude: 37.556661,
    longitude: 126.9057804,
};
const DEFAULT_NEARBY_LIMIT: usize = 5;
const DEFAULT_MIDPOINT_RADIUS_KM: f64 = 5.0;

/// Application runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    /// Returns the canonical name used for logging/metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

/// Fixed second location used by the midpoint search, in decimal degrees.
///
/// Range validation happens when the app converts it into a domain point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferencePoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl ReferencePoint {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidReferencePoint(raw.to_string());
        let (lat, lon) = raw.split_once(',').ok_or_else(invalid)?;
        let latitude = lat.trim().parse::<f64>().map_err(|_| invalid())?;
        let longitude = lon.trim().parse::<f64>().map_err(|_| invalid())?;
        Ok(Self {
            latitude,
            longitude,
        })
    }
}

/// Runtime configuration resolved from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    pub database_url: String,
    pub midpoint_reference: ReferencePoint,
    pub nearby_limit: usize,
    pub midpoint_radius_km: f64,
    /// JSON file of cafés inserted at startup, when set.
    pub seed_file: Option<PathBuf>,
}

impl AppConfig {
    /// Constructs the configuration by reading and validating environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_value = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let environment = Environment::from_str(&env_value)?;
        let bind_addr = server_bind_address().map_err(ConfigError::BindAddress)?;

        let midpoint_reference = match env::var("APP_MIDPOINT_REFERENCE") {
            Ok(raw) if !raw.trim().is_empty() => ReferencePoint::parse(&raw)?,
            _ => DEFAULT_MIDPOINT_REFERENCE,
        };

        let nearby_limit = match env::var("APP_NEARBY_LIMIT") {
            Ok(raw) => raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|limit| *limit > 0)
                .ok_or(ConfigError::InvalidNearbyLimit(raw))?,
            Err(_) => DEFAULT_NEARBY_LIMIT,
        };

        let midpoint_radius_km = match env::var("APP_MIDPOINT_RADIUS_KM") {
            Ok(raw) => raw
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|radius| radius.is_finite() && *radius >= 0.0)
                .ok_or(ConfigError::InvalidRadius(raw))?,
            Err(_) => DEFAULT_MIDPOINT_RADIUS_KM,
        };

        let seed_file = env::var("APP_SEED_FILE")
            .ok()
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            bind_addr,
            environment,
            database_url: database_url(),
            midpoint_reference,
            nearby_limit,
            midpoint_radius_km,
            seed_file,
        })
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    InvalidEnvironment(String),
    BindAddress(std::net::AddrParseError),
    InvalidReferencePoint(String),
    InvalidNearbyLimit(String),
    InvalidRadius(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnvironment(value) => write!(
                f,
                "APP_ENV must be one of 'development', 'production', or 'test' (got {value})"
            ),
            Self::BindAddress(err) => write!(f, "invalid APP_BIND_ADDR value: {err}"),
            Self::InvalidReferencePoint(value) => write!(
                f,
                "APP_MIDPOINT_REFERENCE must look like '<latitude>,<longitude>' (got {value})"
            ),
            Self::InvalidNearbyLimit(value) => {
                write!(f, "APP_NEARBY_LIMIT must be a positive integer (got {value})")
            }
            Self::InvalidRadius(value) => write!(
                f,
                "APP_MIDPOINT_RADIUS_KM must be a non-negative number (got {value})"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}
