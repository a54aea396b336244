//! History-table migration.
//!
//! For every history shadow table, discovers the legacy inline foreign keys
//! pointing at other history tables, externalizes collection-valued
//! relationships into generated junction tables, and promotes every legacy
//! foreign-key column with a companion column holding the *version
//! identifier* of the related history row. Legacy columns are relaxed to
//! nullable, never dropped.

use tracing::debug;

use crate::catalog::{SchemaCatalog, StatementRunner};
use crate::classify;
use crate::context::{
    RunContext, FK_SUFFIX, IDX_COLUMN, KEY_SUFFIX, SUFFIX_ID, SUFFIX_IDX, SUFFIX_OID, SUFFIX_OWN,
    VERSION_COLUMN_SUFFIX,
};
use crate::dialect::truncate_identifier;
use crate::error::{MigrateError, Result};

/// Kind of legacy inline foreign-key column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacySuffix {
    /// `_id_OID` - owned-object reference.
    Oid,
    /// `_id_OWN` - ownership-collection back-reference.
    Own,
}

impl LegacySuffix {
    /// The column-name suffix this kind is recognized by.
    pub fn as_str(self) -> &'static str {
        match self {
            LegacySuffix::Oid => SUFFIX_OID,
            LegacySuffix::Own => SUFFIX_OWN,
        }
    }

    /// Classify a column name by its legacy suffix, if it carries one.
    pub fn of(column: &str) -> Option<Self> {
        if column.ends_with(SUFFIX_OID) {
            Some(LegacySuffix::Oid)
        } else if column.ends_with(SUFFIX_OWN) {
            Some(LegacySuffix::Own)
        } else {
            None
        }
    }
}

/// One legacy foreign-key relationship discovered on a history table.
///
/// Built purely from catalog introspection plus naming convention, and
/// rebuilt fresh on every run - never persisted.
#[derive(Debug, Clone)]
pub struct HistoryForeignKey {
    /// History table holding the legacy column.
    pub source_table: String,
    /// History table the foreign key points at.
    pub related_table: String,
    /// The legacy inline foreign-key column.
    pub old_column: String,
    /// Companion column holding the related row's version identifier.
    pub new_column: String,
    /// Whether the companion column already exists on the source table.
    pub new_column_exists: bool,
    /// Version-identifier column of the related history table.
    pub related_version_column: String,
    /// Which legacy suffix the old column carries.
    pub suffix: LegacySuffix,
    /// Version-identifier column of the source history table.
    pub source_version_column: String,
    /// Logical name of the collection field.
    pub collection_field: String,
}

/// Name of the junction table generated for a foreign key.
pub fn junction_table_name(fk: &HistoryForeignKey) -> String {
    format!("{}_{}", fk.related_table, fk.collection_field)
}

/// Name of the junction column referencing the related history row.
///
/// Derived from the related table's version column with the version marker
/// stripped and the first letter upper-cased, plus the run's history-id
/// suffix.
pub fn related_id_column(ctx: &RunContext, fk: &HistoryForeignKey) -> String {
    let column = &fk.related_version_column;
    let base = if column.to_lowercase().ends_with(VERSION_COLUMN_SUFFIX) {
        &column[..column.len() - VERSION_COLUMN_SUFFIX.len()]
    } else {
        column.as_str()
    };

    let mut chars = base.chars();
    let capitalized = match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    };

    format!("{}{}", capitalized, ctx.history_id_suffix())
}

/// `CREATE TABLE IF NOT EXISTS` statement for the junction table.
///
/// List-shaped relationships carry an `IDX` sequence column that joins the
/// primary key; scalar-classified ones key on the field-id column instead.
pub fn build_junction_ddl(ctx: &RunContext, fk: &HistoryForeignKey, is_list: bool) -> String {
    let d = ctx.dialect();
    let junction = junction_table_name(fk);
    let id_col = related_id_column(ctx, fk);
    let field_col = format!("{}{}", fk.collection_field, SUFFIX_ID);
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
        d.quote_ident(&fk.related_table),
        d.quote_ident("id"),
    ));

    sql
}

/// `INSERT INTO ... SELECT` moving the legacy rows into the junction table.
pub fn build_junction_insert(ctx: &RunContext, fk: &HistoryForeignKey, is_list: bool) -> String {
    let d = ctx.dialect();
    let junction = junction_table_name(fk);

    let mut selected = format!(
        "{}, {}",
        d.quote_ident(&fk.old_column),
        d.quote_ident(&fk.source_version_column),
    );
    if is_list {
        selected.push_str(&format!(
            ", {}",
            d.quote_ident(&format!("{}{}", fk.collection_field, SUFFIX_IDX))
        ));
    }

    format!(
        "INSERT INTO {} SELECT {} FROM {} WHERE {} IS NOT NULL",
        d.quote_ident(&junction),
        selected,
        d.quote_ident(&fk.source_table),
        d.quote_ident(&fk.old_column),
    )
}

/// `ALTER TABLE` relaxing the legacy column to nullable.
pub fn build_relax_legacy_column(ctx: &RunContext, fk: &HistoryForeignKey) -> String {
    let d = ctx.dialect();
    format!(
        "ALTER TABLE {} {}",
        d.quote_ident(&fk.source_table),
        d.drop_not_null_clause(&fk.old_column),
    )
}

/// `ALTER TABLE ... ADD COLUMN` for the companion version-identifier column.
pub fn build_add_new_column(ctx: &RunContext, fk: &HistoryForeignKey) -> String {
    let d = ctx.dialect();
    format!(
        "ALTER TABLE {} ADD COLUMN {} {}",
        d.quote_ident(&fk.source_table),
        d.quote_ident(&fk.new_column),
        d.id_column_type(),
    )
}

/// Correlated `UPDATE` filling the companion column with the version
/// identifier of the related history row the legacy column points at.
pub fn build_promote_update(ctx: &RunContext, fk: &HistoryForeignKey) -> String {
    let d = ctx.dialect();
    format!(
        "UPDATE {} SET {} = (SELECT {} FROM {} WHERE {} = {}.{})",
        d.quote_ident(&fk.source_table),
        d.quote_ident(&fk.new_column),
        d.quote_ident(&fk.related_version_column),
        d.quote_ident(&fk.related_table),
        d.quote_ident("id"),
        d.quote_ident(&fk.source_table),
        d.quote_ident(&fk.old_column),
    )
}

/// Migrates one history table at a time against a live database.
pub struct HistoryMigrator<'a, C: ?Sized> {
    db: &'a C,
    ctx: &'a RunContext,
}

impl<'a, C> HistoryMigrator<'a, C>
where
    C: SchemaCatalog + StatementRunner + ?Sized,
{
    pub fn new(db: &'a C, ctx: &'a RunContext) -> Self {
        Self { db, ctx }
    }

    /// Discover the legacy foreign keys on a history table.
    ///
    /// Only keys targeting another history table through a column with a
    /// recognized legacy suffix qualify. A missing version column on either
    /// side disqualifies that one key (logged, skipped); it never aborts the
    /// table.
    pub async fn discover(&self, table: &str) -> Result<Vec<HistoryForeignKey>> {
        let foreign_keys = self.db.list_foreign_keys(table).await?;
        let columns = self.db.list_columns(table).await?;
        let index_column = columns
            .iter()
            .filter(|c| c.ends_with(SUFFIX_IDX))
            .next_back()
            .cloned();

        let mut keys = Vec::new();
        for fk in foreign_keys {
            let Some(suffix) = LegacySuffix::of(&fk.source_column) else {
                continue;
            };

            let related_table = self.ctx.fold(&fk.target_table);
            if !related_table.ends_with(self.ctx.history_table_suffix()) {
                continue;
            }

            let related_version_column = match self.db.find_version_column(&related_table).await {
                Ok(col) => col,
                Err(e) => {
                    tracing::warn!(
                        table,
                        related_table = %related_table,
                        column = %fk.source_column,
                        "skipping foreign key: {}",
                        e
                    );
                    continue;
                }
            };
            let source_version_column = match self.db.find_version_column(table).await {
                Ok(col) => col,
                Err(e) => {
                    tracing::warn!(table, column = %fk.source_column, "skipping foreign key: {}", e);
                    continue;
                }
            };

            let new_column = fk.source_column.replace(suffix.as_str(), SUFFIX_ID);
            let new_column_exists = columns.iter().any(|c| c == &new_column);
            let collection_field =
                classify::collection_field_name(&fk.source_column, suffix, index_column.as_deref());

            keys.push(HistoryForeignKey {
                source_table: table.to_string(),
                related_table,
                old_column: fk.source_column,
                new_column,
                new_column_exists,
                related_version_column,
                suffix,
                source_version_column,
                collection_field,
            });
        }

        Ok(keys)
    }

    /// Find the discovered foreign key whose target matches the expected
    /// related history table, if any.
    pub async fn find_relationship(
        &self,
        source_table: &str,
        related_table: &str,
    ) -> Result<Option<HistoryForeignKey>> {
        Ok(self
            .discover(source_table)
            .await?
            .into_iter()
            .find(|fk| fk.related_table.eq_ignore_ascii_case(related_table)))
    }

    /// Externalize a collection-valued relationship into a junction table.
    ///
    /// Creates the junction table, moves one row per non-null legacy column
    /// value into it, and relaxes the legacy column to nullable. When the
    /// junction table already exists the whole step is a no-op, which keeps
    /// re-runs from duplicating rows.
    ///
    /// Returns the number of migrated rows, or `None` when nothing was done.
    pub async fn externalize(&self, fk: &HistoryForeignKey, is_list: bool) -> Result<Option<u64>> {
        let junction = junction_table_name(fk);
        if self.db.table_exists(&self.ctx.fold(&junction)).await? {
            debug!("junction table {} already exists, skipping", junction);
            return Ok(None);
        }

        debug!("creating junction table {}", junction);
        self.execute(&fk.source_table, &build_junction_ddl(self.ctx, fk, is_list))
            .await?;

        let migrated = self
            .execute(
                &fk.source_table,
                &build_junction_insert(self.ctx, fk, is_list),
            )
            .await?;
        debug!("migrated {} rows to junction table {}", migrated, junction);

        self.execute(&fk.source_table, &build_relax_legacy_column(self.ctx, fk))
            .await?;

        Ok(Some(migrated))
    }

    /// Promote one legacy foreign key to a version-identifier column.
    ///
    /// Adds the companion column when missing and fills every row with the
    /// version identifier of the related history row. Runs for all legacy
    /// keys, including those already externalized, so a scalar pointer to
    /// the latest version coexists with any junction table.
    ///
    /// Returns whether a column was added and the number of updated rows.
    pub async fn promote(&self, fk: &HistoryForeignKey) -> Result<(bool, u64)> {
        let mut added = false;
        if !fk.new_column_exists {
            debug!("adding column {} to {}", fk.new_column, fk.source_table);
            self.execute(&fk.source_table, &build_add_new_column(self.ctx, fk))
                .await?;
            added = true;
        }

        debug!(
            "migrating history field: table {}, old column {}, new column {}, related table {}",
            fk.source_table, fk.old_column, fk.new_column, fk.related_table
        );
        let updated = self
            .execute(&fk.source_table, &build_promote_update(self.ctx, fk))
            .await?;
        debug!("updated {} history rows", updated);

        Ok((added, updated))
    }

    async fn execute(&self, table: &str, sql: &str) -> Result<u64> {
        self.db
            .execute(sql)
            .await
            .map_err(|e| MigrateError::statement(table, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{MysqlDialect, PostgresDialect};
    use std::sync::Arc;

    fn fk() -> HistoryForeignKey {
        HistoryForeignKey {
            source_table: "Foo__HISTORY".to_string(),
            related_table: "Bar__HISTORY".to_string(),
            old_column: "bars_id_OID".to_string(),
            new_column: "bars_ID".to_string(),
            new_column_exists: false,
            related_version_column: "bar__HistoryCurrentVersion".to_string(),
            suffix: LegacySuffix::Oid,
            source_version_column: "foo__HistoryCurrentVersion".to_string(),
            collection_field: "bars".to_string(),
        }
    }

    fn mysql_ctx() -> RunContext {
        RunContext::for_dialect(Arc::new(MysqlDialect))
    }

    fn pg_ctx() -> RunContext {
        RunContext::for_dialect(Arc::new(PostgresDialect))
    }

    #[test]
    fn test_legacy_suffix_of() {
        assert_eq!(LegacySuffix::of("bars_id_OID"), Some(LegacySuffix::Oid));
        assert_eq!(LegacySuffix::of("owner_id_OWN"), Some(LegacySuffix::Own));
        assert_eq!(LegacySuffix::of("plain_column"), None);
    }

    #[test]
    fn test_related_id_column() {
        assert_eq!(
            related_id_column(&mysql_ctx(), &fk()),
            "Bar__History_ID"
        );
        // postgres-folded version column resolves through the
        // case-insensitive marker suffix
        let mut folded = fk();
        folded.related_version_column = "bar__historycurrentversion".to_string();
        assert_eq!(related_id_column(&pg_ctx(), &folded), "Bar__history_ID");
    }

    #[test]
    fn test_junction_ddl_list_mysql() {
        let sql = build_junction_ddl(&mysql_ctx(), &fk(), true);
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS `Bar__HISTORY_bars` \
             (`Bar__History_ID` bigint(20) NOT NULL, \
             `bars_ID` bigint(20) DEFAULT NULL, \
             `IDX` bigint(20) NOT NULL, \
             PRIMARY KEY (`Bar__History_ID`, `IDX`), \
             KEY `Bar__HISTORY_bars_N49` (`Bar__History_ID`), \
             CONSTRAINT `Bar__HISTORY_bars_FK1` FOREIGN KEY (`Bar__History_ID`) \
             REFERENCES `Bar__HISTORY` (`id`))"
        );
    }

    #[test]
    fn test_junction_ddl_scalar_pg_keys_on_field_column() {
        let mut scalar = fk();
        scalar.related_table = "bar__history".to_string();
        scalar.source_table = "foo__history".to_string();
        let sql = build_junction_ddl(&pg_ctx(), &scalar, false);
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"bar__history_bars\""));
        assert!(sql.contains("PRIMARY KEY (\"Bar__history_ID\", \"bars_ID\")"));
        assert!(!sql.contains("IDX"));
        assert!(!sql.contains("KEY \""));
        assert!(sql.contains(
            "CONSTRAINT \"bar__history_bars_FK1\" FOREIGN KEY (\"Bar__history_ID\") \
             REFERENCES \"bar__history\" (\"id\")"
        ));
    }

    #[test]
    fn test_junction_ddl_truncates_long_constraint_names() {
        let mut long = fk();
        long.related_table = format!("{}__HISTORY", "X".repeat(70));
        let sql = build_junction_ddl(&mysql_ctx(), &long, true);
        let junction = junction_table_name(&long);
        let base = truncate_identifier(&junction);
        assert_eq!(base.len(), 58);
        assert!(sql.contains(&format!("`{}_N49`", base)));
        assert!(sql.contains(&format!("`{}_FK1`", base)));
    }

    #[test]
    fn test_junction_insert_list() {
        let sql = build_junction_insert(&mysql_ctx(), &fk(), true);
        assert_eq!(
            sql,
            "INSERT INTO `Bar__HISTORY_bars` SELECT `bars_id_OID`, \
             `foo__HistoryCurrentVersion`, `bars_INTEGER_IDX` FROM `Foo__HISTORY` \
             WHERE `bars_id_OID` IS NOT NULL"
        );
    }

    #[test]
    fn test_junction_insert_scalar_has_no_index_column() {
        let sql = build_junction_insert(&pg_ctx(), &fk(), false);
        assert_eq!(
            sql,
            "INSERT INTO \"Bar__HISTORY_bars\" SELECT \"bars_id_OID\", \
             \"foo__HistoryCurrentVersion\" FROM \"Foo__HISTORY\" \
             WHERE \"bars_id_OID\" IS NOT NULL"
        );
    }

    #[test]
    fn test_relax_legacy_column() {
        assert_eq!(
            build_relax_legacy_column(&pg_ctx(), &fk()),
            "ALTER TABLE \"Foo__HISTORY\" ALTER COLUMN \"bars_id_OID\" DROP NOT NULL"
        );
        assert_eq!(
            build_relax_legacy_column(&mysql_ctx(), &fk()),
            "ALTER TABLE `Foo__HISTORY` MODIFY COLUMN `bars_id_OID` bigint(20) DEFAULT NULL"
        );
    }

    #[test]
    fn test_add_new_column() {
        assert_eq!(
            build_add_new_column(&pg_ctx(), &fk()),
            "ALTER TABLE \"Foo__HISTORY\" ADD COLUMN \"bars_ID\" bigint"
        );
    }

    #[test]
    fn test_promote_update_is_correlated_on_related_id() {
        assert_eq!(
            build_promote_update(&pg_ctx(), &fk()),
            "UPDATE \"Foo__HISTORY\" SET \"bars_ID\" = \
             (SELECT \"bar__HistoryCurrentVersion\" FROM \"Bar__HISTORY\" \
             WHERE \"id\" = \"Foo__HISTORY\".\"bars_id_OID\")"
        );
    }

    #[test]
    fn test_dialect_symmetry_of_junction_ddl() {
        // same abstract scenario, both dialects under identical case
        // folding: identical shape, only quoting/type/secondary-index
        // presence differ
        let pg = build_junction_ddl(&pg_ctx(), &fk(), true);
        let my = build_junction_ddl(
            &RunContext::with_case_folding(Arc::new(MysqlDialect), true),
            &fk(),
            true,
        );
        let normalize = |s: &str| {
            s.replace('"', "")
                .replace('`', "")
                .replace("bigint(20)", "bigint")
                .replace("KEY Bar__HISTORY_bars_N49 (Bar__history_ID), ", "")
        };
        assert_eq!(normalize(&pg), normalize(&my));
    }
}
