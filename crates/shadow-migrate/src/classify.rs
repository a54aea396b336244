//! Relationship classification.
//!
//! Decides, from metadata alone, whether a relationship is scalar (inline
//! foreign key) or collection-valued (externalized into a junction table),
//! and extracts the collection field's logical name from the shadow table's
//! column naming conventions.

use crate::context::{SUFFIX_IDX, SUFFIX_OID};
use crate::history::LegacySuffix;

/// Whether the stored collection-type value denotes the ordered-collection
/// ("List"-shaped) type. Anything else is treated as scalar.
pub fn is_ordered_collection(collection_type: &str) -> bool {
    collection_type
        .rsplit('.')
        .next()
        .is_some_and(|simple| simple == "List")
}

/// Derive the collection field's logical name.
///
/// When the source table carries an ordered-collection index column and the
/// legacy suffix is the owned-object kind, the name comes from that index
/// column; otherwise it is the foreign-key column with its legacy suffix
/// stripped. The fallback also covers collection fields with no index column
/// found; that is documented legacy behaviour, not validated further.
pub fn collection_field_name(
    fk_column: &str,
    suffix: LegacySuffix,
    index_column: Option<&str>,
) -> String {
    match index_column {
        Some(idx) if suffix.as_str() == SUFFIX_OID => idx.replace(SUFFIX_IDX, ""),
        _ => fk_column.replace(suffix.as_str(), ""),
    }
}
