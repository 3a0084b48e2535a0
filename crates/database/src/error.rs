use thiserror::Error;

/// Errors surfaced by the Database Manager's query/decode seam (C5). `is_transient` mirrors
/// the Data Fetcher's idiom for deciding whether a failure belongs to error class 1 (retry)
/// or should be surfaced immediately as a worker failure (class 2).
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("database busy or locked: {0}")]
    Busy(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("payload could not be decoded: {0}")]
    Decode(String),

    #[error("migration failed: {0}")]
    Migration(String),
}

impl DatabaseError {
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Busy(_))
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        let message = err.to_string();
        if message.to_lowercase().contains("locked") || message.to_lowercase().contains("busy") {
            Self::Busy(message)
        } else {
            Self::Query(message)
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DatabaseError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::Migration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DatabaseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_errors_are_transient() {
        let err = DatabaseError::Busy("database is locked".to_string());
        assert!(err.is_transient());
    }

    #[test]
    fn query_errors_are_not_transient() {
        let err = DatabaseError::Query("no such table: widgets".to_string());
        assert!(!err.is_transient());
    }
}
