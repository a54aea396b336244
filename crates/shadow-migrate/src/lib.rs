//! # shadow-migrate
//!
//! Schema-evolution engine for the auxiliary **history** (audit/versioning) and
//! **trash** (soft-delete) shadow tables of dynamically-defined entities.
//!
//! When relationship metadata changes shape (a scalar reference becomes a
//! collection, or vice versa), the shadow tables keep their old inline
//! foreign-key layout. This engine reverse-engineers the live schema through
//! catalog introspection, classifies each relationship, synthesizes junction
//! tables for collection-valued relationships, migrates the existing rows and
//! promotes legacy foreign-key columns to version-identifier columns - all
//! idempotently, across the MySQL-like and PostgreSQL-like dialect families.
//!
//! ## Example
//!
//! ```rust,no_run
//! use shadow_migrate::{Config, PgBackend, RunContext, ShadowMigrator};
//!
//! #[tokio::main]
//! async fn main() -> shadow_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let backend = PgBackend::connect(&config.database).await?;
//!     let ctx = RunContext::for_dialect(config.database.dialect()?);
//!     let report = ShadowMigrator::new(&backend, ctx).run().await?;
//!     println!("Created {} junction tables", report.junction_tables_created);
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod classify;
pub mod config;
pub mod context;
pub mod dialect;
pub mod error;
pub mod history;
pub mod metadata;
pub mod migrator;
pub mod trash;

// Re-exports for convenient access
pub use catalog::postgres::PgBackend;
pub use catalog::{ForeignKeyRef, SchemaCatalog, StatementRunner};
pub use config::{Config, DatabaseConfig};
pub use context::RunContext;
pub use dialect::{DialectPolicy, MysqlDialect, PostgresDialect};
pub use error::{MigrateError, Result};
pub use history::{HistoryForeignKey, HistoryMigrator, LegacySuffix};
pub use metadata::{EntityRecord, MetadataStore, RelationshipMetadata};
pub use migrator::{MigrationBackend, MigrationReport, ShadowMigrator};
pub use trash::{TrashMigrator, TrashRelationship};

#[cfg(feature = "mysql")]
pub use catalog::mysql::MysqlBackend;
