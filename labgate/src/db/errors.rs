use thiserror::Error;

/// Unified error type for database operations that application code can handle
#[derive(Error, Debug)]
pub enum DbError {
    /// Entity not found by the given identifier
    #[error("Entity not found")]
    NotFound,

    /// Unique constraint violation
    #[error("Unique constraint violation")]
    UniqueViolation {
        constraint: Option<String>,
        table: Option<String>,
        message: String,
    },

    /// Foreign key constraint violation
    #[error("Foreign key constraint violation")]
    ForeignKeyViolation {
        constraint: Option<String>,
        table: Option<String>,
        message: String,
    },

    /// Check constraint violation
    #[error("Check constraint violation")]
    CheckViolation {
        constraint: Option<String>,
        table: Option<String>,
        message: String,
    },

    /// Catch-all for non-recoverable errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convert from sqlx::Error using proper sqlx error categorization
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => DbError::NotFound,
            sqlx::Error::Database(db_err) => {
                let message = db_err.message().to_string();
                // SQLite does not report constraint or table names separately; they are embedded in
                // the message, e.g. "UNIQUE constraint failed: users.email".
                let (table, constraint) = parse_constraint_target(&message);
                let constraint = db_err.constraint().map(|s| s.to_string()).or(constraint);
                let table = db_err.table().map(|s| s.to_string()).or(table);

                if db_err.is_unique_violation() {
                    DbError::UniqueViolation { constraint, table, message }
                } else if db_err.is_foreign_key_violation() {
                    DbError::ForeignKeyViolation { constraint, table, message }
                } else if db_err.is_check_violation() {
                    DbError::CheckViolation { constraint, table, message }
                } else {
                    // All other database errors are non-recoverable - convert to anyhow
                    DbError::Other(anyhow::Error::from(err))
                }
            }
            // All other sqlx errors are non-recoverable - convert to anyhow with context
            _ => DbError::Other(anyhow::Error::from(err)),
        }
    }
}

/// Extract `(table, constraint)` from a SQLite constraint message.
///
/// "UNIQUE constraint failed: users.email" yields `(Some("users"), Some("users.email"))`;
/// "CHECK constraint failed: batches_window_check" yields `(None, Some("batches_window_check"))`.
fn parse_constraint_target(message: &str) -> (Option<String>, Option<String>) {
    let Some((_, target)) = message.split_once("constraint failed: ") else {
        return (None, None);
    };
    // Multi-column uniques list every column; the first one names the table.
    let first = target.split(',').next().unwrap_or(target).trim();
    match first.split_once('.') {
        Some((table, _)) => (Some(table.to_string()), Some(target.trim().to_string())),
        None => (None, Some(first.to_string())),
    }
}

/// Type alias for database operation results
pub type Result<T> = std::result::Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_constraint_target() {
        assert_eq!(
            parse_constraint_target("UNIQUE constraint failed: users.email"),
            (Some("users".to_string()), Some("users.email".to_string()))
        );
        assert_eq!(
            parse_constraint_target("UNIQUE constraint failed: batch_trainers.batch_id, batch_trainers.trainer_id"),
            (
                Some("batch_trainers".to_string()),
                Some("batch_trainers.batch_id, batch_trainers.trainer_id".to_string())
            )
        );
        assert_eq!(
            parse_constraint_target("CHECK constraint failed: batches_window_check"),
            (None, Some("batches_window_check".to_string()))
        );
        assert_eq!(parse_constraint_target("FOREIGN KEY constraint failed"), (None, None));
    }
}
