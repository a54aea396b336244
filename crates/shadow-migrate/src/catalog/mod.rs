//! Catalog introspection and statement execution abstractions.
//!
//! [`SchemaCatalog`] wraps the database's catalog access behind a
//! dialect-neutral, read-only interface; [`StatementRunner`] executes the
//! generated DDL/DML. Concrete backends live in [`postgres`] and, behind the
//! `mysql` cargo feature, [`mysql`].

pub mod postgres;

#[cfg(feature = "mysql")]
pub mod mysql;

use async_trait::async_trait;

use crate::context::VERSION_COLUMN_SUFFIX;
use crate::error::{MigrateError, Result};

/// One foreign key discovered on a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyRef {
    /// Column on the inspected table that holds the reference.
    pub source_column: String,
    /// Table the foreign key points at.
    pub target_table: String,
}

/// Read-only access to the live database catalog.
///
/// All structure the engine acts on is rebuilt fresh from these calls on
/// every run, which is what makes re-running the migration safe.
#[async_trait]
pub trait SchemaCatalog: Send + Sync {
    /// True iff a table with this exact (already case-folded) name exists.
    async fn table_exists(&self, name: &str) -> Result<bool>;

    /// All tables whose name ends with the given suffix.
    async fn list_tables_with_suffix(&self, suffix: &str) -> Result<Vec<String>>;

    /// Foreign keys defined on a table. Zero results is not an error.
    async fn list_foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyRef>>;

    /// Full column listing, in catalog enumeration order.
    async fn list_columns(&self, table: &str) -> Result<Vec<String>>;

    /// Whether a column exists on a table.
    async fn column_exists(&self, table: &str, column: &str) -> Result<bool> {
        Ok(self.list_columns(table).await?.iter().any(|c| c == column))
    }

    /// Last column (in catalog order) whose name ends with the suffix.
    ///
    /// Used to detect the ordered-collection index column.
    async fn find_column_ending_with(&self, table: &str, suffix: &str) -> Result<Option<String>> {
        Ok(self
            .list_columns(table)
            .await?
            .into_iter()
            .filter(|c| c.ends_with(suffix))
            .next_back())
    }

    /// The version-identifier column of a history table.
    ///
    /// A history table without one is malformed; that surfaces as a
    /// [`MigrateError::Schema`].
    async fn find_version_column(&self, table: &str) -> Result<String> {
        self.list_columns(table)
            .await?
            .into_iter()
            .find(|c| c.to_lowercase().ends_with(VERSION_COLUMN_SUFFIX))
            .ok_or_else(|| {
                MigrateError::schema(format!(
                    "history table {} is missing the current version column",
                    table
                ))
            })
    }
}

/// Executes generated DDL/DML against the target database.
#[async_trait]
pub trait StatementRunner: Send + Sync {
    /// Execute a single statement, returning the number of affected rows.
    async fn execute(&self, sql: &str) -> Result<u64>;
}
