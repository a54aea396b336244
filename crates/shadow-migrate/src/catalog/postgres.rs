//! PostgreSQL-family backend.
//!
//! Implements catalog introspection over `information_schema`, statement
//! execution, and the metadata-store queries against the entity metadata
//! tables, all through a deadpool-postgres connection pool.

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use tokio_postgres::{Config as PgConfig, NoTls};
use tracing::info;

use crate::catalog::{ForeignKeyRef, SchemaCatalog, StatementRunner};
use crate::config::DatabaseConfig;
use crate::error::{MigrateError, Result};
use crate::metadata::{
    EntityRecord, MetadataStore, RelationshipMetadata, COLLECTION_TYPE_KEY, RELATED_CLASS_KEY,
};

/// PostgreSQL backend for the migration engine.
pub struct PgBackend {
    pool: Pool,
    schema: String,
}

impl PgBackend {
    /// Connect to the database described by the configuration.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
        let pool = Pool::builder(mgr)
            .max_size(config.max_connections)
            .build()
            .map_err(|e| MigrateError::pool(e, "creating PostgreSQL pool"))?;

        let backend = Self {
            pool,
            schema: config.schema.clone(),
        };
        backend.test_connection().await?;

        info!(
            "Connected to PostgreSQL: {}:{}/{}",
            config.host, config.port, config.database
        );

        Ok(backend)
    }

    /// Verify the connection is usable.
    pub async fn test_connection(&self) -> Result<()> {
        let client = self.client().await?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }

    async fn client(&self) -> Result<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, "getting PostgreSQL connection"))
    }

    async fn entity_by_query(&self, sql: &str, field_id: i64) -> Result<Option<EntityRecord>> {
        let client = self.client().await?;
        let rows = client.query(sql, &[&field_id]).await?;

        Ok(rows.first().map(|row| EntityRecord {
            id: row.get(0),
            class_name: row.get(1),
            module: row.get(2),
            namespace: row.get(3),
            table_name: row.get(4),
        }))
    }
}

#[async_trait]
impl SchemaCatalog for PgBackend {
    async fn table_exists(&self, name: &str) -> Result<bool> {
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT 1 FROM information_schema.tables \
                 WHERE table_schema = $1 AND table_name = $2",
                &[&self.schema, &name],
            )
            .await?;
        Ok(!rows.is_empty())
    }

    async fn list_tables_with_suffix(&self, suffix: &str) -> Result<Vec<String>> {
        let client = self.client().await?;
        let pattern = format!("%{}", suffix);
        let rows = client
            .query(
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = $1 AND table_name LIKE $2 \
                 ORDER BY table_name",
                &[&self.schema, &pattern],
            )
            .await?;
        Ok(rows.iter().map(|r| r.get(0)).collect())
    }

    async fn list_foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyRef>> {
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT kcu.column_name, ccu.table_name \
                 FROM information_schema.table_constraints tc \
                 JOIN information_schema.key_column_usage kcu \
                   ON tc.constraint_name = kcu.constraint_name \
                  AND tc.table_schema = kcu.table_schema \
                 JOIN information_schema.constraint_column_usage ccu \
                   ON tc.constraint_name = ccu.constraint_name \
                  AND tc.table_schema = ccu.table_schema \
                 WHERE tc.constraint_type = 'FOREIGN KEY' \
                   AND tc.table_schema = $1 AND tc.table_name = $2",
                &[&self.schema, &table],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|r| ForeignKeyRef {
                source_column: r.get(0),
                target_table: r.get(1),
            })
            .collect())
    }

    async fn list_columns(&self, table: &str) -> Result<Vec<String>> {
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT column_name FROM information_schema.columns \
                 WHERE table_schema = $1 AND table_name = $2 \
                 ORDER BY ordinal_position",
                &[&self.schema, &table],
            )
            .await?;
        Ok(rows.iter().map(|r| r.get(0)).collect())
    }
}

#[async_trait]
impl StatementRunner for PgBackend {
    async fn execute(&self, sql: &str) -> Result<u64> {
        let client = self.client().await?;
        Ok(client.execute(sql, &[]).await?)
    }
}

#[async_trait]
impl MetadataStore for PgBackend {
    async fn collection_fields(&self) -> Result<Vec<RelationshipMetadata>> {
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT \"field_id_OID\", \"value\" FROM \"FieldMetadata\" \
                 WHERE \"key\" = $1",
                &[&COLLECTION_TYPE_KEY],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|r| RelationshipMetadata {
                field_id: r.get(0),
                collection_type: r.get::<_, Option<String>>(1).unwrap_or_default(),
            })
            .collect())
    }

    async fn owning_entity(&self, field_id: i64) -> Result<Option<EntityRecord>> {
        self.entity_by_query(
            "SELECT \"id\", \"className\", \"module\", \"namespace\", \"tableName\" \
             FROM \"Entity\" WHERE \"id\" IN \
             (SELECT \"entity_id_OID\" FROM \"Field\" WHERE \"id\" = $1) LIMIT 1",
            field_id,
        )
        .await
    }

    async fn related_entity(&self, field_id: i64) -> Result<Option<EntityRecord>> {
        let sql = format!(
            "SELECT \"id\", \"className\", \"module\", \"namespace\", \"tableName\" \
             FROM \"Entity\" WHERE \"className\" IN \
             (SELECT \"value\" FROM \"FieldMetadata\" \
              WHERE \"key\" = '{}' AND \"field_id_OID\" = $1) LIMIT 1",
            RELATED_CLASS_KEY
        );
        self.entity_by_query(&sql, field_id).await
    }
}
