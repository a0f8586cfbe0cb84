use thiserror::Error;

/// Errors that can occur when interacting with a resource adapter.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested row or file does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A unique key is already taken.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The backend refused the operation (also used for injected faults).
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// A blob path escapes the storage root or is otherwise unusable.
    #[error("Invalid blob path: {0}")]
    InvalidPath(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A filesystem error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Shorthand for a not-found error.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns true for [`StoreError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type for adapter operations.
pub type Result<T> = std::result::Result<T, StoreError>;
