use std::collections::BTreeMap;

use thiserror::Error;

/// Field name mapped to the messages collected for it. BTreeMap keeps the
/// serialized order stable.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Registry unavailable: {0}")]
    Unavailable(String),

    #[error("Database query failed: {0}")]
    Query(#[from] libsql::Error),

    #[error("Unique constraint violation on {field}")]
    Conflict { field: &'static str },

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("Schedule entry {0} does not exist")]
    MissingEntry(String),

    #[error("Schedule store unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by the typed API operations.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Validation failed on {} field(s)", .0.len())]
    Validation(FieldErrors),

    #[error("{0}")]
    NotFound(String),

    #[error("A record with this {field} already exists")]
    Conflict { field: &'static str },

    #[error("Watchdog schedule unavailable: {0}")]
    ScheduleUnavailable(String),

    #[error(transparent)]
    Store(StoreError),
}

impl ApiError {
    pub fn missing_service(id: i64) -> Self {
        ApiError::NotFound(format!("Service with id {id} does not exist."))
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { field } => ApiError::Conflict { field },
            other => ApiError::Store(other),
        }
    }
}

impl From<ScheduleError> for ApiError {
    fn from(err: ScheduleError) -> Self {
        ApiError::ScheduleUnavailable(err.to_string())
    }
}
