//! Error types for the shadow-table migration engine.

use thiserror::Error;

/// Main error type for migration operations.
///
/// The engine favours forward progress: `Schema` and `Statement` errors are
/// isolated to the table or foreign key that produced them, logged with
/// context, and the run continues with the next item. Only connectivity-level
/// failures abort a whole run.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, unknown dialect)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Catalog introspection found an inconsistent or incomplete structure
    #[error("Schema error: {0}")]
    Schema(String),

    /// A DDL/DML statement failed against the database
    #[error("Statement failed for table {table}: {message}")]
    Statement { table: String, message: String },

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// PostgreSQL-family database error
    #[error("Database error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// MySQL-family database error
    #[cfg(feature = "mysql")]
    #[error("Database error: {0}")]
    Mysql(#[from] mysql_async::Error),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a Schema error
    pub fn schema(message: impl Into<String>) -> Self {
        MigrateError::Schema(message.into())
    }

    /// Create a Statement error tied to a table
    pub fn statement(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Statement {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        MigrateError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }

    /// Process exit code for this error kind.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) | MigrateError::Io(_) => 2,
            MigrateError::Pool { .. } => 3,
            MigrateError::Postgres(_) => 3,
            #[cfg(feature = "mysql")]
            MigrateError::Mysql(_) => 3,
            _ => 1,
        }
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
