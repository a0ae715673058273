//! Error types for the store layer.

use thiserror::Error;

/// Store operation result type.
pub type Result<T> = std::result::Result<T, DbError>;

/// Store errors.
#[derive(Error, Debug)]
pub enum DbError {
    /// Another writer held the store for longer than the retry budget.
    #[error("database busy after {attempts} attempts")]
    Busy { attempts: u32 },

    /// SQLx error (connection, query, decode, etc.)
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// A row with the same filepath already exists.
    #[error("duplicate filepath: {0}")]
    Duplicate(String),

    /// Status string outside the closed enumeration, or a transition a
    /// worker is not allowed to issue.
    #[error("invalid status: {0}")]
    InvalidStatus(String),

    /// Row lookup by id came back empty.
    #[error("job not found: {0}")]
    NotFound(i64),
}

impl DbError {
    /// Create an invalid-status error.
    pub fn invalid_status(msg: impl Into<String>) -> Self {
        Self::InvalidStatus(msg.into())
    }
}

/// SQLITE_BUSY / SQLITE_LOCKED classification, including the extended
/// result codes sqlx surfaces as strings.
pub(crate) fn is_busy(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            matches!(db.code().as_deref(), Some("5") | Some("6") | Some("261") | Some("517"))
                || db.message().contains("database is locked")
        }
        _ => false,
    }
}
