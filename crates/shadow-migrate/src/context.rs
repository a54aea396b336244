//! Per-run migration context.
//!
//! One [`RunContext`] is built at the start of a migration run and passed by
//! reference into every migrator call. It pins the dialect policy and the
//! case-folding behaviour for the whole run, and derives from them the
//! naming-convention suffixes the shadow tables use. Nothing in here is
//! cached across runs.

use std::sync::Arc;

use crate::dialect::DialectPolicy;

/// Case-insensitive marker suffix of the version column on history tables.
pub const VERSION_COLUMN_SUFFIX: &str = "__historycurrentversion";

/// Legacy inline foreign-key column suffix for owned-object references.
pub const SUFFIX_OID: &str = "_id_OID";

/// Legacy inline foreign-key column suffix for ownership back-references.
pub const SUFFIX_OWN: &str = "_id_OWN";

/// Suffix of the promoted version-identifier column.
pub const SUFFIX_ID: &str = "_ID";

/// Suffix of the ordered-collection index column.
pub const SUFFIX_IDX: &str = "_INTEGER_IDX";

/// Name of the sequence column inside generated junction tables.
pub const IDX_COLUMN: &str = "IDX";

/// Fixed 4-character suffix of the generated secondary index name.
pub const KEY_SUFFIX: &str = "_N49";

/// Fixed 4-character suffix of the generated foreign-key constraint name.
pub const FK_SUFFIX: &str = "_FK1";

/// Dialect state fixed for the duration of one migration run.
#[derive(Clone)]
pub struct RunContext {
    dialect: Arc<dyn DialectPolicy>,
    folds_lowercase: bool,
}

impl RunContext {
    /// Build a context from a dialect, taking the family's default
    /// case-folding behaviour.
    pub fn for_dialect(dialect: Arc<dyn DialectPolicy>) -> Self {
        let folds_lowercase = dialect.folds_identifiers_lowercase();
        Self {
            dialect,
            folds_lowercase,
        }
    }

    /// Build a context with an explicit case-folding flag, as reported by
    /// the live connection's catalog metadata.
    pub fn with_case_folding(dialect: Arc<dyn DialectPolicy>, folds_lowercase: bool) -> Self {
        Self {
            dialect,
            folds_lowercase,
        }
    }

    /// The dialect policy for this run.
    pub fn dialect(&self) -> &dyn DialectPolicy {
        self.dialect.as_ref()
    }

    /// Whether the catalog folds unquoted identifiers to lowercase.
    pub fn folds_lowercase(&self) -> bool {
        self.folds_lowercase
    }

    /// Fold a table name the way the catalog stores it.
    pub fn fold(&self, name: &str) -> String {
        if self.folds_lowercase {
            name.to_lowercase()
        } else {
            name.to_string()
        }
    }

    /// Table-name suffix of history shadow tables.
    pub fn history_table_suffix(&self) -> &'static str {
        if self.folds_lowercase {
            "__history"
        } else {
            "__HISTORY"
        }
    }

    /// Table-name suffix of trash shadow tables.
    pub fn trash_table_suffix(&self) -> &'static str {
        if self.folds_lowercase {
            "__trash"
        } else {
            "__TRASH"
        }
    }

    /// Column suffix for the history-id column of generated junction tables.
    pub fn history_id_suffix(&self) -> &'static str {
        if self.folds_lowercase {
            "__history_ID"
        } else {
            "__History_ID"
        }
    }

    /// Column suffix for the trash-id column of generated junction tables.
    pub fn trash_id_suffix(&self) -> &'static str {
        if self.folds_lowercase {
            "__trash_ID"
        } else {
            "__Trash_ID"
        }
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("dialect", &self.dialect.name())
            .field("folds_lowercase", &self.folds_lowercase)
            .finish()
    }
}
