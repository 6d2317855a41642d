//! Storage-specific error type wrapping sqlx errors.

use robofleet_domain::error::{DomainError, FleetError};

/// Errors originating from the `SQLite` storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A query or connection failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Failed to serialize a JSON column.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Failed to run migrations.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored row no longer satisfies the domain rules.
    #[error("stored record is invalid: {0}")]
    Corrupt(#[from] DomainError),
}

impl From<StorageError> for FleetError {
    fn from(err: StorageError) -> Self {
        Self::Storage(Box::new(err))
    }
}

/// Turn a unique-constraint violation into the domain rule it protects.
pub(crate) fn conflict_or_storage(
    err: sqlx::Error,
    conflict: impl FnOnce() -> DomainError,
) -> FleetError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => conflict().into(),
        _ => StorageError::from(err).into(),
    }
}
