//! Top-level migration driver.
//!
//! Loads all relationship metadata once, classifies every field, runs the
//! history and trash migrators for each qualifying pair of shadow tables,
//! and finally promotes every legacy foreign key across all history tables
//! uniformly. Per-table and per-foreign-key failures are logged and
//! isolated; the run keeps going to maximize forward progress.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::{SchemaCatalog, StatementRunner};
use crate::classify;
use crate::context::RunContext;
use crate::error::Result;
use crate::history::HistoryMigrator;
use crate::metadata::{MetadataStore, RelationshipMetadata};
use crate::trash::TrashMigrator;

/// Everything the driver needs from a database backend.
pub trait MigrationBackend: SchemaCatalog + StatementRunner + MetadataStore {}

impl<T> MigrationBackend for T where T: SchemaCatalog + StatementRunner + MetadataStore {}

/// Result of one migration run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    /// Unique run identifier.
    pub run_id: String,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    /// Junction tables created by this run.
    pub junction_tables_created: usize,

    /// Rows moved into junction tables by this run.
    pub junction_rows_migrated: u64,

    /// Version-identifier columns added to history tables.
    pub columns_added: usize,

    /// History rows whose version-identifier column was populated.
    pub history_rows_updated: u64,

    /// Human-readable descriptions of isolated failures.
    pub failures: Vec<String>,
}

impl MigrationReport {
    /// Serialize the report as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Duration of the run in seconds.
    pub fn duration_seconds(&self) -> f64 {
        (self.completed_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

/// The migration driver.
pub struct ShadowMigrator<'a> {
    db: &'a dyn MigrationBackend,
    ctx: RunContext,
}

impl<'a> ShadowMigrator<'a> {
    pub fn new(db: &'a dyn MigrationBackend, ctx: RunContext) -> Self {
        Self { db, ctx }
    }

    /// Run the full migration.
    ///
    /// An install with no qualifying relationships is a valid, successful
    /// run. Only failures of the initial metadata load propagate; everything
    /// else is isolated and recorded in the report.
    pub async fn run(self) -> Result<MigrationReport> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        info!("starting shadow-table migration run {}", run_id);

        let mut report = MigrationReport {
            run_id,
            started_at,
            completed_at: started_at,
            junction_tables_created: 0,
            junction_rows_migrated: 0,
            columns_added: 0,
            history_rows_updated: 0,
            failures: Vec::new(),
        };

        let fields = self.db.collection_fields().await?;
        info!("found {} relationship collection fields", fields.len());

        for field in &fields {
            if let Err(e) = self.migrate_field(field, &mut report).await {
                warn!("field {}: {}", field.field_id, e);
                report.failures.push(format!("field {}: {}", field.field_id, e));
            }
        }

        self.promote_history_tables(&mut report).await?;

        report.completed_at = Utc::now();
        info!(
            "migration run {} finished: {} junction tables, {} junction rows, \
             {} columns added, {} history rows updated, {} failures",
            report.run_id,
            report.junction_tables_created,
            report.junction_rows_migrated,
            report.columns_added,
            report.history_rows_updated,
            report.failures.len()
        );

        Ok(report)
    }

    /// Externalize one collection field's history and trash relationships.
    async fn migrate_field(
        &self,
        field: &RelationshipMetadata,
        report: &mut MigrationReport,
    ) -> Result<()> {
        let Some(owning) = self.db.owning_entity(field.field_id).await? else {
            warn!("field {} has no owning entity, skipping", field.field_id);
            return Ok(());
        };
        let Some(related) = self.db.related_entity(field.field_id).await? else {
            warn!("field {} has no related entity, skipping", field.field_id);
            return Ok(());
        };

        let is_list = classify::is_ordered_collection(&field.collection_type);

        // history side
        let source = self
            .ctx
            .fold(&format!("{}{}", owning.base_table_name(), self.ctx.history_table_suffix()));
        let related_table = self
            .ctx
            .fold(&format!("{}{}", related.base_table_name(), self.ctx.history_table_suffix()));

        if self.db.table_exists(&source).await? && self.db.table_exists(&related_table).await? {
            let history = HistoryMigrator::new(self.db, &self.ctx);
            if let Some(fk) = history.find_relationship(&source, &related_table).await? {
                if let Some(rows) = history.externalize(&fk, is_list).await? {
                    report.junction_tables_created += 1;
                    report.junction_rows_migrated += rows;
                }
            }
        }

        // trash side
        let source = self
            .ctx
            .fold(&format!("{}{}", owning.base_table_name(), self.ctx.trash_table_suffix()));
        let related_table = self
            .ctx
            .fold(&format!("{}{}", related.base_table_name(), self.ctx.trash_table_suffix()));

        if self.db.table_exists(&source).await? && self.db.table_exists(&related_table).await? {
            let trash = TrashMigrator::new(self.db, &self.ctx);
            if let Some(rel) = trash.find_relationship(&source, &related_table).await? {
                if let Some(rows) = trash
                    .externalize(&rel, related.simple_class_name(), is_list)
                    .await?
                {
                    report.junction_tables_created += 1;
                    report.junction_rows_migrated += rows;
                }
            }
        }

        Ok(())
    }

    /// Promote every legacy foreign key found on every history table.
    ///
    /// Runs uniformly, including for foreign keys whose collection data was
    /// just externalized, so a scalar pointer to the latest related version
    /// coexists with any junction table.
    async fn promote_history_tables(&self, report: &mut MigrationReport) -> Result<()> {
        let history = HistoryMigrator::new(self.db, &self.ctx);
        let tables = self
            .db
            .list_tables_with_suffix(self.ctx.history_table_suffix())
            .await?;
        info!("promoting legacy foreign keys on {} history tables", tables.len());

        for table in tables {
            let foreign_keys = match history.discover(&table).await {
                Ok(fks) => fks,
                Err(e) => {
                    warn!("table {}: {}", table, e);
                    report.failures.push(format!("table {}: {}", table, e));
                    continue;
                }
            };

            for fk in foreign_keys {
                match history.promote(&fk).await {
                    Ok((added, updated)) => {
                        if added {
                            report.columns_added += 1;
                        }
                        report.history_rows_updated += updated;
                    }
                    Err(e) => {
                        warn!("table {} column {}: {}", table, fk.old_column, e);
                        report
                            .failures
                            .push(format!("table {} column {}: {}", table, fk.old_column, e));
                    }
                }
            }
        }

        Ok(())
    }
}
