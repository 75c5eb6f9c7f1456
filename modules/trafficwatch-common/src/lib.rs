pub mod types;
pub mod geo;
pub mod config;
pub mod error;
pub mod limits;

pub use types::*;
pub use geo::{haversine_km, BoundingBox, GeoPoint, KM_PER_DEGREE};
pub use config::{Config, EngineSettings};
pub use error::{ErrorKind, TrafficError};
