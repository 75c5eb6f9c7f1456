use std::time::Duration;

use thiserror::Error;
use trafficwatch_common::TrafficError;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Store offline: {0}")]
    Offline(String),

    #[error("Duplicate key: {0}")]
    Duplicate(String),

    /// A persisted row could not be mapped back onto the model.
    #[error("Corrupt row in {table}: {detail}")]
    CorruptRow { table: &'static str, detail: String },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for TrafficError {
    fn from(err: StoreError) -> Self {
        TrafficError::StoreUnavailable(err.to_string())
    }
}
