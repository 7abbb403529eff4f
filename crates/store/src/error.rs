use thiserror::Error;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A concurrent transaction changed the same rows, or a unique key was
    /// taken between check and write. Retrying the whole operation is safe.
    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    /// The backing store could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns true if the failed operation may succeed when retried as a whole.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::ConcurrencyConflict(_) | StoreError::Unavailable(_)
        )
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db_err) => {
                // serialization_failure / deadlock_detected
                if matches!(db_err.code().as_deref(), Some("40001") | Some("40P01")) {
                    return StoreError::ConcurrencyConflict(db_err.message().to_string());
                }
                if db_err.is_unique_violation() {
                    return StoreError::ConcurrencyConflict(format!(
                        "unique constraint {} violated",
                        db_err.constraint().unwrap_or("unknown")
                    ));
                }
                StoreError::Database(e)
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(e.to_string())
            }
            _ => StoreError::Database(e),
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
