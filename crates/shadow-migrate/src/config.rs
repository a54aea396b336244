//! Configuration loading and validation.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dialect::{DialectPolicy, MysqlDialect, PostgresDialect};
use crate::error::{MigrateError, Result};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Target database connection.
    pub database: DatabaseConfig,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        self.database.normalized_type()?;
        if self.database.host.is_empty() {
            return Err(MigrateError::Config("database.host is required".into()));
        }
        if self.database.database.is_empty() {
            return Err(MigrateError::Config("database.database is required".into()));
        }
        Ok(())
    }
}

/// Connection settings for the database under migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database family: "postgres" or "mysql".
    #[serde(default = "default_postgres")]
    pub r#type: String,

    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(skip_serializing, default)]
    pub password: String,

    /// Schema to introspect (PostgreSQL only, default: "public").
    #[serde(default = "default_public_schema")]
    pub schema: String,

    /// Maximum connection pool size (default: 4).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl DatabaseConfig {
    /// Canonical database family for the configured type.
    pub fn normalized_type(&self) -> Result<&'static str> {
        match self.r#type.to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok("postgres"),
            "mysql" | "mariadb" => Ok("mysql"),
            other => Err(MigrateError::Config(format!(
                "Unknown database type: '{}'. Supported types: postgres, mysql",
                other
            ))),
        }
    }

    /// The dialect policy for the configured family.
    pub fn dialect(&self) -> Result<Arc<dyn DialectPolicy>> {
        match self.normalized_type()? {
            "postgres" => Ok(Arc::new(PostgresDialect)),
            "mysql" => Ok(Arc::new(MysqlDialect)),
            _ => unreachable!(),
        }
    }
}

fn default_postgres() -> String {
    "postgres".to_string()
}

fn default_pg_port() -> u16 {
    5432
}

fn default_public_schema() -> String {
    "public".to_string()
}

fn default_max_connections() -> usize {
    4
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
database:
  type: postgres
  host: localhost
  database: entity_data
  user: mds
  password: secret
"#;

    #[test]
    fn test_from_yaml_with_defaults() {
        let config = Config::from_yaml(YAML).unwrap();
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.database.schema, "public");
        assert_eq!(config.database.max_connections, 4);
        assert_eq!(config.database.normalized_type().unwrap(), "postgres");
    }

    #[test]
    fn test_unknown_type_rejected() {
        let yaml = YAML.replace("postgres", "oracle");
        assert!(Config::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_dialect_selection() {
        let config = Config::from_yaml(YAML).unwrap();
        assert_eq!(config.database.dialect().unwrap().name(), "postgres");

        let yaml = YAML.replace("type: postgres", "type: mariadb");
        let config = Config::from_yaml(&yaml).unwrap();
        assert_eq!(config.database.dialect().unwrap().name(), "mysql");
    }

    #[test]
    fn test_password_not_serialized() {
        let config = Config::from_yaml(YAML).unwrap();
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(!yaml.contains("secret"));
    }
}
