//! Trash-table migration.
//!
//! The analogue of the history migrator for soft-delete shadow tables.
//! Trash tables do not version, so there is no version-remapping column to
//! promote; the only job is externalizing collection-valued relationships
//! into junction tables.

use tracing::debug;

use crate::catalog::{SchemaCatalog, StatementRunner};
use crate::classify;
use crate::context::{RunContext, FK_SUFFIX, IDX_COLUMN, KEY_SUFFIX, SUFFIX_ID, SUFFIX_IDX};
use crate::dialect::truncate_identifier;
use crate::error::{MigrateError, Result};
use crate::history::LegacySuffix;

/// One legacy relationship discovered on a trash table.
///
/// Transient, derived from catalog state on every run.
#[derive(Debug, Clone)]
pub struct TrashRelationship {
    /// Trash table holding the legacy column.
    pub source_table: String,
    /// Trash table the foreign key points at.
    pub related_table: String,
    /// The legacy inline foreign-key column.
    pub related_column: String,
    /// Logical name of the collection field.
    pub collection_field: String,
}

/// Name of the junction table generated for a trash relationship.
pub fn junction_table_name(rel: &TrashRelationship) -> String {
    format!("{}_{}", rel.related_table, rel.collection_field)
}

/// Name of the junction column referencing the related trash row, built
/// from the related entity's simple class name.
pub fn related_id_column(ctx: &RunContext, related_class: &str) -> String {
    format!("{}{}", related_class, ctx.trash_id_suffix())
}

/// `CREATE TABLE IF NOT EXISTS` statement for the junction table.
pub fn build_junction_ddl(
    ctx: &RunContext,
    rel: &TrashRelationship,
    related_class: &str,
    is_list: bool,
) -> String {
    let d = ctx.dialect();
    let junction = junction_table_name(rel);
    let id_col = related_id_column(ctx, related_class);
    let field_col = format!("{}{}", rel.collection_field, SUFFIX_ID);
    let short = truncate_identifier(&junction);

    let mut sql = format!(
        "CREATE TABLE IF NOT EXISTS {} ({} {} NOT NULL, {} {} DEFAULT NULL, ",
        d.quote_ident(&junction),
        d.quote_ident(&id_col),
        d.id_column_type(),
        d.quote_ident(&field_col),
        d.id_column_type(),
    );

    if is_list {
        sql.push_str(&format!(
            "{} {} NOT NULL, PRIMARY KEY ({}, {}), ",
            d.quote_ident(IDX_COLUMN),
            d.id_column_type(),
            d.quote_ident(&id_col),
            d.quote_ident(IDX_COLUMN),
        ));
    } else {
        sql.push_str(&format!(
            "PRIMARY KEY ({}, {}), ",
            d.quote_ident(&id_col),
            d.quote_ident(&field_col),
        ));
    }

    let key_clause = d.key_clause_if_needed(&format!("{}{}", short, KEY_SUFFIX), &id_col);
    if !key_clause.is_empty() {
        sql.push_str(&key_clause);
        sql.push(' ');
    }
    sql.push_str(&format!(
        "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}))",
        d.quote_ident(&format!("{}{}", short, FK_SUFFIX)),
        d.quote_ident(&id_col),
        d.quote_ident(&rel.related_table),
        d.quote_ident("id"),
    ));

    sql
}

/// `INSERT INTO ... SELECT` moving the legacy rows into the junction table.
///
/// Trash rows carry their own row id instead of a version identifier.
pub fn build_junction_insert(ctx: &RunContext, rel: &TrashRelationship, is_list: bool) -> String {
    let d = ctx.dialect();
    let junction = junction_table_name(rel);

    let mut selected = format!(
        "{}, {}",
        d.quote_ident(&rel.related_column),
        d.quote_ident("id"),
    );
    if is_list {
        selected.push_str(&format!(
            ", {}",
            d.quote_ident(&format!("{}{}", rel.collection_field, SUFFIX_IDX))
        ));
    }

    format!(
        "INSERT INTO {} SELECT {} FROM {} WHERE {} IS NOT NULL",
        d.quote_ident(&junction),
        selected,
        d.quote_ident(&rel.source_table),
        d.quote_ident(&rel.related_column),
    )
}

/// Migrates one trash table at a time against a live database.
pub struct TrashMigrator<'a, C: ?Sized> {
    db: &'a C,
    ctx: &'a RunContext,
}

impl<'a, C> TrashMigrator<'a, C>
where
    C: SchemaCatalog + StatementRunner + ?Sized,
{
    pub fn new(db: &'a C, ctx: &'a RunContext) -> Self {
        Self { db, ctx }
    }

    /// Find the first legacy foreign key on a trash table that targets the
    /// expected related trash table.
    pub async fn find_relationship(
        &self,
        source_table: &str,
        related_table: &str,
    ) -> Result<Option<TrashRelationship>> {
        let foreign_keys = self.db.list_foreign_keys(source_table).await?;
        let index_column = self
            .db
            .find_column_ending_with(source_table, SUFFIX_IDX)
            .await?;

        for fk in foreign_keys {
            let Some(suffix) = LegacySuffix::of(&fk.source_column) else {
                continue;
            };

            let target = self.ctx.fold(&fk.target_table);
            if !target.ends_with(self.ctx.trash_table_suffix()) {
                continue;
            }
            if !target.eq_ignore_ascii_case(related_table) {
                continue;
            }

            let collection_field =
                classify::collection_field_name(&fk.source_column, suffix, index_column.as_deref());

            return Ok(Some(TrashRelationship {
                source_table: source_table.to_string(),
                related_table: target,
                related_column: fk.source_column,
                collection_field,
            }));
        }

        Ok(None)
    }

    /// Externalize a collection-valued trash relationship into a junction
    /// table. A no-op when the junction table already exists.
    ///
    /// Returns the number of migrated rows, or `None` when nothing was done.
    pub async fn externalize(
        &self,
        rel: &TrashRelationship,
        related_class: &str,
        is_list: bool,
    ) -> Result<Option<u64>> {
        let junction = junction_table_name(rel);
        if self.db.table_exists(&self.ctx.fold(&junction)).await? {
            debug!("junction table {} already exists, skipping", junction);
            return Ok(None);
        }

        debug!("creating junction table {}", junction);
        self.execute(
            &rel.source_table,
            &build_junction_ddl(self.ctx, rel, related_class, is_list),
        )
        .await?;

        let migrated = self
            .execute(
                &rel.source_table,
                &build_junction_insert(self.ctx, rel, is_list),
            )
            .await?;
        debug!("migrated {} rows to junction table {}", migrated, junction);

        Ok(Some(migrated))
    }

    async fn execute(&self, table: &str, sql: &str) -> Result<u64> {
        self.db
            .execute(sql)
            .await
            .map_err(|e| MigrateError::statement(table, e.to_string()))
    }
}
