use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("No database connection available: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("Could not build the connection pool: {0}")]
    Build(#[from] deadpool_postgres::BuildError),

    #[error("Invalid database URL: {0}")]
    InvalidUrl(String),

    /// A statement issued on behalf of an ingester operation, e.g. `upsert into user_balance`.
    #[error("{operation} failed: {}", describe_pg_error(.source))]
    Statement {
        operation: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("Migration {name} failed: {}", describe_pg_error(.source))]
    Migration {
        name: String,
        #[source]
        source: tokio_postgres::Error,
    },

    /// Migration bookkeeping on `_migrations`.
    #[error("Migration bookkeeping failed: {}", describe_pg_error(.0))]
    Bookkeeping(#[from] tokio_postgres::Error),

    #[error("Could not read migrations: {0}")]
    Io(#[from] std::io::Error),
}

impl DbError {
    pub fn statement(operation: impl Into<String>) -> impl FnOnce(tokio_postgres::Error) -> Self {
        let operation = operation.into();
        move |source| DbError::Statement { operation, source }
    }
}

/// SQLSTATE, server message and the violated constraint, if any.
fn describe_pg_error(e: &tokio_postgres::Error) -> String {
    let Some(db_err) = e.as_db_error() else {
        return e.to_string();
    };

    match db_err.constraint() {
        Some(constraint) => format!(
            "[{}] {} (constraint {})",
            db_err.code().code(),
            db_err.message(),
            constraint
        ),
        None => format!("[{}] {}", db_err.code().code(), db_err.message()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_what_failed() {
        let err = DbError::InvalidUrl("missing host".to_string());
        assert_eq!(err.to_string(), "Invalid database URL: missing host");

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "migrations");
        assert_eq!(
            DbError::from(io).to_string(),
            "Could not read migrations: migrations"
        );
    }
}
