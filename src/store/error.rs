//! Error taxonomy for the State Store, classified from the underlying
//! `sqlx::Error` the way a connection-pool-aware caller needs: busy/locked
//! conditions are distinguished from genuine constraint violations so the
//! caller can decide whether a retry is worthwhile.

use std::fmt;

/// A coarse classification of the SQLite error underlying a [`StoreError::Database`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorKind {
    BusyOrLocked,
    ConstraintViolation,
    PoolTimeout,
    PoolClosed,
    RowNotFound,
    Io,
    Protocol,
    Other,
}

impl DbErrorKind {
    /// Inspects `error` and picks the closest matching kind. SQLite reports
    /// busy/locked and constraint failures as `Error::Database` with a
    /// message rather than a typed variant, so this falls back to substring
    /// matching on the driver message for those two cases.
    #[must_use]
    pub fn from_sqlx(error: &sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => Self::RowNotFound,
            sqlx::Error::PoolTimedOut => Self::PoolTimeout,
            sqlx::Error::PoolClosed => Self::PoolClosed,
            sqlx::Error::Io(_) => Self::Io,
            sqlx::Error::Protocol(_) => Self::Protocol,
            sqlx::Error::Database(db_error) => {
                let message = db_error.message();
                if message.contains("database is locked") || message.contains("busy") {
                    Self::BusyOrLocked
                } else if db_error.is_unique_violation()
                    || db_error.is_foreign_key_violation()
                    || message.contains("CHECK constraint failed")
                {
                    Self::ConstraintViolation
                } else {
                    Self::Other
                }
            }
            _ => Self::Other,
        }
    }
}

impl fmt::Display for DbErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::BusyOrLocked => "busy_or_locked",
            Self::ConstraintViolation => "constraint_violation",
            Self::PoolTimeout => "pool_timeout",
            Self::PoolClosed => "pool_closed",
            Self::RowNotFound => "row_not_found",
            Self::Io => "io",
            Self::Protocol => "protocol",
            Self::Other => "other",
        };
        f.write_str(label)
    }
}

/// Errors surfaced by the State Store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("state store database error ({kind}): {message}")]
    Database { kind: DbErrorKind, message: String },

    #[error("key not found: {0}")]
    NotFound(String),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("failed to serialize state store value: {0}")]
    Serialize(#[source] serde_json::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        let kind = DbErrorKind::from_sqlx(&error);
        if kind == DbErrorKind::ConstraintViolation {
            Self::ConstraintViolation(error.to_string())
        } else {
            Self::Database {
                kind,
                message: error.to_string(),
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_classifies_as_row_not_found() {
        assert_eq!(
            DbErrorKind::from_sqlx(&sqlx::Error::RowNotFound),
            DbErrorKind::RowNotFound
        );
    }
}
