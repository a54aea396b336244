//! MySQL-family backend (cargo feature `mysql`).
//!
//! Mirrors the PostgreSQL backend over a mysql_async connection pool, with
//! introspection against `information_schema` scoped to the configured
//! database.

use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Opts, OptsBuilder, Pool};
use tracing::info;

use crate::catalog::{ForeignKeyRef, SchemaCatalog, StatementRunner};
use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::metadata::{
    EntityRecord, MetadataStore, RelationshipMetadata, COLLECTION_TYPE_KEY, RELATED_CLASS_KEY,
};

/// MySQL backend for the migration engine.
pub struct MysqlBackend {
    pool: Pool,
    database: String,
}

impl MysqlBackend {
    /// Connect to the database described by the configuration.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let opts: Opts = OptsBuilder::default()
            .ip_or_hostname(config.host.clone())
            .tcp_port(config.port)
            .db_name(Some(config.database.clone()))
            .user(Some(config.user.clone()))
            .pass(Some(config.password.clone()))
            .into();

        let pool = Pool::new(opts);
        let backend = Self {
            pool,
            database: config.database.clone(),
        };
        backend.test_connection().await?;

        info!(
            "Connected to MySQL: {}:{}/{}",
            config.host, config.port, config.database
        );

        Ok(backend)
    }

    /// Verify the connection is usable.
    pub async fn test_connection(&self) -> Result<()> {
        let mut conn = self.pool.get_conn().await?;
        conn.query_drop("SELECT 1").await?;
        Ok(())
    }

    async fn entity_by_query(&self, sql: &str, field_id: i64) -> Result<Option<EntityRecord>> {
        let mut conn = self.pool.get_conn().await?;
        let rows: Vec<(i64, String, Option<String>, Option<String>, Option<String>)> =
            conn.exec(sql, (field_id,)).await?;

        Ok(rows
            .into_iter()
            .next()
            .map(|(id, class_name, module, namespace, table_name)| EntityRecord {
                id,
                class_name,
                module,
                namespace,
                table_name,
            }))
    }
}

#[async_trait]
impl SchemaCatalog for MysqlBackend {
    async fn table_exists(&self, name: &str) -> Result<bool> {
        let mut conn = self.pool.get_conn().await?;
        let rows: Vec<u8> = conn
            .exec(
                "SELECT 1 FROM information_schema.tables \
                 WHERE table_schema = ? AND table_name = ?",
                (&self.database, name),
            )
            .await?;
        Ok(!rows.is_empty())
    }

    async fn list_tables_with_suffix(&self, suffix: &str) -> Result<Vec<String>> {
        let mut conn = self.pool.get_conn().await?;
        let pattern = format!("%{}", suffix);
        let rows: Vec<String> = conn
            .exec(
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = ? AND table_name LIKE ? \
                 ORDER BY table_name",
                (&self.database, pattern),
            )
            .await?;
        Ok(rows)
    }

    async fn list_foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyRef>> {
        let mut conn = self.pool.get_conn().await?;
        let rows: Vec<(String, String)> = conn
            .exec(
                "SELECT column_name, referenced_table_name \
                 FROM information_schema.key_column_usage \
                 WHERE table_schema = ? AND table_name = ? \
                   AND referenced_table_name IS NOT NULL",
                (&self.database, table),
            )
            .await?;

        Ok(rows
            .into_iter()
            .map(|(source_column, target_table)| ForeignKeyRef {
                source_column,
                target_table,
            })
            .collect())
    }

    async fn list_columns(&self, table: &str) -> Result<Vec<String>> {
        let mut conn = self.pool.get_conn().await?;
        let rows: Vec<String> = conn
            .exec(
                "SELECT column_name FROM information_schema.columns \
                 WHERE table_schema = ? AND table_name = ? \
                 ORDER BY ordinal_position",
                (&self.database, table),
            )
            .await?;
        Ok(rows)
    }
}

#[async_trait]
impl StatementRunner for MysqlBackend {
    async fn execute(&self, sql: &str) -> Result<u64> {
        let mut conn = self.pool.get_conn().await?;
        conn.query_drop(sql).await?;
        Ok(conn.affected_rows())
    }
}

#[async_trait]
impl MetadataStore for MysqlBackend {
    async fn collection_fields(&self) -> Result<Vec<RelationshipMetadata>> {
        let mut conn = self.pool.get_conn().await?;
        let rows: Vec<(i64, Option<String>)> = conn
            .exec(
                "SELECT `field_id_OID`, `value` FROM `FieldMetadata` WHERE `key` = ?",
                (COLLECTION_TYPE_KEY,),
            )
            .await?;

        Ok(rows
            .into_iter()
            .map(|(field_id, collection_type)| RelationshipMetadata {
                field_id,
                collection_type: collection_type.unwrap_or_default(),
            })
            .collect())
    }

    async fn owning_entity(&self, field_id: i64) -> Result<Option<EntityRecord>> {
        self.entity_by_query(
            "SELECT `id`, `className`, `module`, `namespace`, `tableName` \
             FROM `Entity` WHERE `id` IN \
             (SELECT `entity_id_OID` FROM `Field` WHERE `id` = ?) LIMIT 1",
            field_id,
        )
        .await
    }

    async fn related_entity(&self, field_id: i64) -> Result<Option<EntityRecord>> {
        let sql = format!(
            "SELECT `id`, `className`, `module`, `namespace`, `tableName` \
             FROM `Entity` WHERE `className` IN \
             (SELECT `value` FROM `FieldMetadata` \
              WHERE `key` = '{}' AND `field_id_OID` = ?) LIMIT 1",
            RELATED_CLASS_KEY
        );
        self.entity_by_query(&sql, field_id).await
    }
}
