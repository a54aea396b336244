//! SQL dialect policy (Strategy pattern).
//!
//! All quoting, type-literal and index-clause decisions for the two supported
//! database families route through [`DialectPolicy`], injected into the
//! migrators instead of branched inline. The functions here are pure: no I/O.

use std::fmt;

/// Hard identifier limit of the stricter dialect family (MySQL).
const IDENTIFIER_LIMIT: usize = 64;

/// Characters reserved for the fixed `_N49` / `_FK1` name suffixes.
const SUFFIX_RESERVE: usize = 4;

/// SQL syntax strategy for one database family.
pub trait DialectPolicy: Send + Sync {
    /// Dialect identifier (e.g. "postgres", "mysql").
    fn name(&self) -> &str;

    /// Quote an identifier (table name, column name, constraint name).
    ///
    /// - PostgreSQL: `"identifier"`
    /// - MySQL: `` `identifier` ``
    fn quote_ident(&self, name: &str) -> String;

    /// Dialect-specific 64-bit integer id column type literal.
    fn id_column_type(&self) -> &str;

    /// Secondary index clause for a foreign-key column, including the
    /// trailing comma, for the dialect that does not auto-index foreign
    /// keys. Empty string otherwise.
    fn key_clause_if_needed(&self, key_name: &str, column: &str) -> String;

    /// Column clause for an `ALTER TABLE` that relaxes a legacy id column
    /// to nullable without dropping it.
    fn drop_not_null_clause(&self, column: &str) -> String;

    /// Whether the catalog stores unquoted identifiers folded to lowercase.
    ///
    /// This is the family default; the per-run [`RunContext`] may carry an
    /// override derived from the live connection.
    ///
    /// [`RunContext`]: crate::context::RunContext
    fn folds_identifiers_lowercase(&self) -> bool;
}

impl fmt::Debug for dyn DialectPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DialectPolicy({})", self.name())
    }
}

/// PostgreSQL-like dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl DialectPolicy for PostgresDialect {
    fn name(&self) -> &str {
        "postgres"
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn id_column_type(&self) -> &str {
        "bigint"
    }

    fn key_clause_if_needed(&self, _key_name: &str, _column: &str) -> String {
        // PostgreSQL does not require an explicit secondary index here
        String::new()
    }

    fn drop_not_null_clause(&self, column: &str) -> String {
        format!("ALTER COLUMN {} DROP NOT NULL", self.quote_ident(column))
    }

    fn folds_identifiers_lowercase(&self) -> bool {
        true
    }
}

/// MySQL-like dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlDialect;

impl DialectPolicy for MysqlDialect {
    fn name(&self) -> &str {
        "mysql"
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn id_column_type(&self) -> &str {
        "bigint(20)"
    }

    fn key_clause_if_needed(&self, key_name: &str, column: &str) -> String {
        format!(
            "KEY {} ({}),",
            self.quote_ident(key_name),
            self.quote_ident(column)
        )
    }

    fn drop_not_null_clause(&self, column: &str) -> String {
        format!(
            "MODIFY COLUMN {} {} DEFAULT NULL",
            self.quote_ident(column),
            self.id_column_type()
        )
    }

    fn folds_identifiers_lowercase(&self) -> bool {
        false
    }
}

/// Truncate a generated table/constraint base name so that the fixed
/// 4-character suffix still fits the 64-character identifier limit.
///
/// Applied on both dialect families, so generated scripts stay portable
/// to the stricter one.
pub fn truncate_identifier(name: &str) -> &str {
    if name.len() < IDENTIFIER_LIMIT - SUFFIX_RESERVE {
        return name;
    }
    // back off to a char boundary so multi-byte names cannot split
    let mut cut = IDENTIFIER_LIMIT - SUFFIX_RESERVE - 2;
    while !name.is_char_boundary(cut) {
        cut -= 1;
    }
    &name[..cut]
}
