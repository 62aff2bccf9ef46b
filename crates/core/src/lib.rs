//! Domain layer shared by the HTTP app and the storage crate.
//!
//! Everything here is pure: coordinate handling, distance ranking and the
//! value types for ratings and reviews.
pub mod geo;
pub mod ranking;
pub mod types;

pub use geo::{GeoError, GeoPoint};
pub use ranking::{rank_by_midpoint, rank_by_point, RankingError};
