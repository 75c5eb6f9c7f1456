use thiserror::Error;

/// Failure categories surfaced by the incident engine.
///
/// Each variant carries a human-readable detail so the transport layer can
/// map it to its own response format.
#[derive(Error, Debug)]
pub enum TrafficError {
    /// Malformed input: coordinates out of range, empty description,
    /// unrecognized enum value, bad limit or radius.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Referenced incident does not exist (vote path only).
    #[error("Incident not found: {0}")]
    NotFound(String),

    /// The persistence layer failed or timed out. Safe to retry at the
    /// caller's discretion; no partial write is visible.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Event publication failed. Logged by the engine, never returned from
    /// a report.
    #[error("Notification failed: {0}")]
    Notification(String),
}

/// Fieldless discriminant of [`TrafficError`], for callers that branch on
/// the failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    StoreUnavailable,
    Notification,
}

impl TrafficError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TrafficError::Validation(_) => ErrorKind::Validation,
            TrafficError::NotFound(_) => ErrorKind::NotFound,
            TrafficError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            TrafficError::Notification(_) => ErrorKind::Notification,
        }
    }

    /// Only store failures are worth retrying; everything else will fail the
    /// same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TrafficError::StoreUnavailable(_))
    }

    pub fn validation(detail: impl Into<String>) -> Self {
        TrafficError::Validation(detail.into())
    }
}

pub type Result<T> = std::result::Result<T, TrafficError>;
