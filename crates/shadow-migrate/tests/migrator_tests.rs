//! Engine-level tests driving the full migration against an in-memory
//! mock backend that records executed statements and applies their
//! structural effects.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use shadow_migrate::catalog::{ForeignKeyRef, SchemaCatalog, StatementRunner};
use shadow_migrate::error::{MigrateError, Result};
use shadow_migrate::metadata::{EntityRecord, MetadataStore, RelationshipMetadata};
use shadow_migrate::{PostgresDialect, RunContext, ShadowMigrator};

#[derive(Default, Clone)]
struct MockTable {
    columns: Vec<String>,
    foreign_keys: Vec<ForeignKeyRef>,
}

/// In-memory stand-in for a live database.
///
/// `execute` records every statement and applies the structural effects the
/// engine relies on (created tables appear in the catalog, added columns
/// appear in the column list), so idempotence is observable across runs.
#[derive(Default)]
struct MockDb {
    tables: Mutex<BTreeMap<String, MockTable>>,
    fields: Vec<RelationshipMetadata>,
    owning: BTreeMap<i64, EntityRecord>,
    related: BTreeMap<i64, EntityRecord>,
    executed: Mutex<Vec<String>>,
    insert_rows: u64,
    update_rows: u64,
    fail_on: Option<String>,
}

impl MockDb {
    fn new() -> Self {
        Self {
            insert_rows: 3,
            update_rows: 5,
            ..Default::default()
        }
    }

    fn add_table(&self, name: &str, columns: &[&str], foreign_keys: Vec<ForeignKeyRef>) {
        self.tables.lock().unwrap().insert(
            name.to_string(),
            MockTable {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                foreign_keys,
            },
        );
    }

    fn add_field(&mut self, field_id: i64, collection_type: &str, owning: &str, related: &str) {
        self.fields.push(RelationshipMetadata {
            field_id,
            collection_type: collection_type.to_string(),
        });
        self.owning.insert(field_id, entity(owning));
        self.related.insert(field_id, entity(related));
    }

    fn statements(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    fn statements_matching(&self, needle: &str) -> Vec<String> {
        self.statements()
            .into_iter()
            .filter(|s| s.contains(needle))
            .collect()
    }
}

fn entity(simple_name: &str) -> EntityRecord {
    EntityRecord {
        id: 1,
        class_name: format!("org.example.{}", simple_name),
        module: None,
        namespace: None,
        table_name: Some(simple_name.to_string()),
    }
}

fn fk(column: &str, target: &str) -> ForeignKeyRef {
    ForeignKeyRef {
        source_column: column.to_string(),
        target_table: target.to_string(),
    }
}

/// Substrings between double quotes, in order.
fn quoted(sql: &str) -> Vec<String> {
    sql.split('"')
        .enumerate()
        .filter(|(i, _)| i % 2 == 1)
        .map(|(_, s)| s.to_string())
        .collect()
}

#[async_trait]
impl SchemaCatalog for MockDb {
    async fn table_exists(&self, name: &str) -> Result<bool> {
        Ok(self.tables.lock().unwrap().contains_key(name))
    }

    async fn list_tables_with_suffix(&self, suffix: &str) -> Result<Vec<String>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .keys()
            .filter(|t| t.ends_with(suffix))
            .cloned()
            .collect())
    }

    async fn list_foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyRef>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .get(table)
            .map(|t| t.foreign_keys.clone())
            .unwrap_or_default())
    }

    async fn list_columns(&self, table: &str) -> Result<Vec<String>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .get(table)
            .map(|t| t.columns.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl StatementRunner for MockDb {
    async fn execute(&self, sql: &str) -> Result<u64> {
        if let Some(needle) = &self.fail_on {
            if sql.contains(needle) {
                return Err(MigrateError::schema(format!("injected failure: {}", needle)));
            }
        }

        self.executed.lock().unwrap().push(sql.to_string());
        let names = quoted(sql);

        if sql.starts_with("CREATE TABLE IF NOT EXISTS") {
            let mut tables = self.tables.lock().unwrap();
            tables.entry(names[0].clone()).or_default();
            return Ok(0);
        }
        if sql.starts_with("ALTER TABLE") && sql.contains("ADD COLUMN") {
            let mut tables = self.tables.lock().unwrap();
            if let Some(table) = tables.get_mut(&names[0]) {
                table.columns.push(names[1].clone());
            }
            return Ok(0);
        }
        if sql.starts_with("INSERT INTO") {
            return Ok(self.insert_rows);
        }
        if sql.starts_with("UPDATE") {
            return Ok(self.update_rows);
        }
        Ok(0)
    }
}

#[async_trait]
impl MetadataStore for MockDb {
    async fn collection_fields(&self) -> Result<Vec<RelationshipMetadata>> {
        Ok(self.fields.clone())
    }

    async fn owning_entity(&self, field_id: i64) -> Result<Option<EntityRecord>> {
        Ok(self.owning.get(&field_id).cloned())
    }

    async fn related_entity(&self, field_id: i64) -> Result<Option<EntityRecord>> {
        Ok(self.related.get(&field_id).cloned())
    }
}

fn pg_ctx() -> RunContext {
    RunContext::for_dialect(Arc::new(PostgresDialect))
}

/// A history schema with one list-shaped collection field.
fn list_scenario() -> MockDb {
    let mut db = MockDb::new();
    db.add_field(1, "java.util.List", "Foo", "Bar");
    db.add_table(
        "foo__history",
        &[
            "id",
            "bars_id_OID",
            "bars_INTEGER_IDX",
            "foo__historycurrentversion",
        ],
        vec![fk("bars_id_OID", "bar__history")],
    );
    db.add_table(
        "bar__history",
        &["id", "bar__historycurrentversion"],
        vec![],
    );
    db
}

#[tokio::test]
async fn list_collection_field_is_externalized_and_promoted() {
    let db = list_scenario();
    let report = ShadowMigrator::new(&db, pg_ctx()).run().await.unwrap();

    assert!(report.failures.is_empty());
    assert_eq!(report.junction_tables_created, 1);
    assert_eq!(report.junction_rows_migrated, 3);
    assert_eq!(report.columns_added, 1);
    assert_eq!(report.history_rows_updated, 5);

    let creates = db.statements_matching("CREATE TABLE");
    assert_eq!(creates.len(), 1);
    let create = &creates[0];
    assert!(create.contains("\"bar__history_bars\""));
    assert!(create.contains("\"IDX\" bigint NOT NULL"));
    assert!(create.contains("PRIMARY KEY (\"Bar__history_ID\", \"IDX\")"));
    assert!(create.contains("REFERENCES \"bar__history\" (\"id\")"));

    let inserts = db.statements_matching("INSERT INTO");
    assert_eq!(inserts.len(), 1);
    assert_eq!(
        inserts[0],
        "INSERT INTO \"bar__history_bars\" SELECT \"bars_id_OID\", \
         \"foo__historycurrentversion\", \"bars_INTEGER_IDX\" FROM \"foo__history\" \
         WHERE \"bars_id_OID\" IS NOT NULL"
    );

    assert_eq!(
        db.statements_matching("DROP NOT NULL"),
        vec!["ALTER TABLE \"foo__history\" ALTER COLUMN \"bars_id_OID\" DROP NOT NULL"]
    );

    assert_eq!(
        db.statements_matching("ADD COLUMN"),
        vec!["ALTER TABLE \"foo__history\" ADD COLUMN \"bars_ID\" bigint"]
    );

    assert_eq!(
        db.statements_matching("UPDATE"),
        vec![
            "UPDATE \"foo__history\" SET \"bars_ID\" = \
             (SELECT \"bar__historycurrentversion\" FROM \"bar__history\" \
             WHERE \"id\" = \"foo__history\".\"bars_id_OID\")"
        ]
    );
}

#[tokio::test]
async fn second_run_executes_no_structural_statement() {
    let db = list_scenario();
    ShadowMigrator::new(&db, pg_ctx()).run().await.unwrap();
    let first_run = db.statements().len();

    let report = ShadowMigrator::new(&db, pg_ctx()).run().await.unwrap();
    assert!(report.failures.is_empty());
    assert_eq!(report.junction_tables_created, 0);
    assert_eq!(report.junction_rows_migrated, 0);
    assert_eq!(report.columns_added, 0);

    let second_run: Vec<_> = db.statements().split_off(first_run);
    assert!(!second_run.is_empty());
    for sql in &second_run {
        assert!(
            sql.starts_with("UPDATE"),
            "unexpected structural statement on re-run: {}",
            sql
        );
    }
}

#[tokio::test]
async fn scalar_foreign_key_gets_version_column() {
    let db = MockDb::new();
    db.add_table(
        "foo__history",
        &["id", "owner_id_OID", "foo__historycurrentversion"],
        vec![fk("owner_id_OID", "bar__history")],
    );
    db.add_table(
        "bar__history",
        &["id", "bar__historycurrentversion"],
        vec![],
    );

    let report = ShadowMigrator::new(&db, pg_ctx()).run().await.unwrap();

    assert!(report.failures.is_empty());
    assert_eq!(report.junction_tables_created, 0);
    assert_eq!(report.columns_added, 1);
    assert_eq!(report.history_rows_updated, 5);

    assert!(db.statements_matching("CREATE TABLE").is_empty());
    assert_eq!(
        db.statements_matching("ADD COLUMN"),
        vec!["ALTER TABLE \"foo__history\" ADD COLUMN \"owner_ID\" bigint"]
    );
    assert_eq!(
        db.statements_matching("UPDATE"),
        vec![
            "UPDATE \"foo__history\" SET \"owner_ID\" = \
             (SELECT \"bar__historycurrentversion\" FROM \"bar__history\" \
             WHERE \"id\" = \"foo__history\".\"owner_id_OID\")"
        ]
    );
}

#[tokio::test]
async fn trash_relationship_is_externalized_without_promotion() {
    let mut db = MockDb::new();
    db.add_field(1, "java.util.List", "Foo", "Bar");
    db.add_table(
        "foo__trash",
        &["id", "bars_id_OID", "bars_INTEGER_IDX"],
        vec![fk("bars_id_OID", "bar__trash")],
    );
    db.add_table("bar__trash", &["id"], vec![]);

    let report = ShadowMigrator::new(&db, pg_ctx()).run().await.unwrap();

    assert!(report.failures.is_empty());
    assert_eq!(report.junction_tables_created, 1);
    assert_eq!(report.columns_added, 0);
    assert_eq!(report.history_rows_updated, 0);

    let creates = db.statements_matching("CREATE TABLE");
    assert_eq!(creates.len(), 1);
    assert!(creates[0].contains("\"bar__trash_bars\""));
    assert!(creates[0].contains("\"Bar__trash_ID\" bigint NOT NULL"));

    assert_eq!(
        db.statements_matching("INSERT INTO"),
        vec![
            "INSERT INTO \"bar__trash_bars\" SELECT \"bars_id_OID\", \"id\", \
             \"bars_INTEGER_IDX\" FROM \"foo__trash\" WHERE \"bars_id_OID\" IS NOT NULL"
        ]
    );

    // trash tables do not version: no column promotion
    assert!(db.statements_matching("ADD COLUMN").is_empty());
    assert!(db.statements_matching("UPDATE").is_empty());
}

#[tokio::test]
async fn missing_shadow_tables_are_skipped_silently() {
    let mut db = MockDb::new();
    db.add_field(1, "java.util.List", "Foo", "Bar");

    let report = ShadowMigrator::new(&db, pg_ctx()).run().await.unwrap();

    assert!(report.failures.is_empty());
    assert_eq!(report.junction_tables_created, 0);
    assert!(db.statements().is_empty());
}

#[tokio::test]
async fn missing_version_column_skips_that_foreign_key_only() {
    let db = MockDb::new();
    // two independent foreign keys; the related table of the first has no
    // version column
    db.add_table(
        "foo__history",
        &["id", "owner_id_OID", "boss_id_OID", "foo__historycurrentversion"],
        vec![
            fk("owner_id_OID", "broken__history"),
            fk("boss_id_OID", "bar__history"),
        ],
    );
    db.add_table("broken__history", &["id"], vec![]);
    db.add_table(
        "bar__history",
        &["id", "bar__historycurrentversion"],
        vec![],
    );

    let report = ShadowMigrator::new(&db, pg_ctx()).run().await.unwrap();

    assert!(report.failures.is_empty());
    assert_eq!(report.columns_added, 1);
    assert_eq!(
        db.statements_matching("ADD COLUMN"),
        vec!["ALTER TABLE \"foo__history\" ADD COLUMN \"boss_ID\" bigint"]
    );
}

#[tokio::test]
async fn statement_failure_is_isolated_to_its_table() {
    let mut db = MockDb::new();
    db.fail_on = Some("bad__history".to_string());
    db.add_table(
        "bad__history",
        &["id", "owner_id_OID", "bad__historycurrentversion"],
        vec![fk("owner_id_OID", "bar__history")],
    );
    db.add_table(
        "good__history",
        &["id", "owner_id_OID", "good__historycurrentversion"],
        vec![fk("owner_id_OID", "bar__history")],
    );
    db.add_table(
        "bar__history",
        &["id", "bar__historycurrentversion"],
        vec![],
    );

    let report = ShadowMigrator::new(&db, pg_ctx()).run().await.unwrap();

    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].contains("bad__history"));
    // the healthy table still got its promotion
    assert_eq!(
        db.statements_matching("ADD COLUMN"),
        vec!["ALTER TABLE \"good__history\" ADD COLUMN \"owner_ID\" bigint"]
    );
    assert_eq!(report.history_rows_updated, 5);
}
