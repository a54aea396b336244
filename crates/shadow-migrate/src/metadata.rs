//! Entity/field metadata records consumed by the classifier.
//!
//! The metadata store (entity definitions, fields, field-metadata key/value
//! pairs) is an external collaborator; the engine only reads the handful of
//! records below through [`MetadataStore`]. The classifier itself never
//! inspects anything but these already-resolved records.

use async_trait::async_trait;

use crate::error::Result;

/// Field-metadata key holding the fully-qualified class of the related entity.
pub const RELATED_CLASS_KEY: &str = "related.class";

/// Field-metadata key holding the relationship's collection type, if any.
pub const COLLECTION_TYPE_KEY: &str = "relationship.collectionType";

/// One relationship-bearing field, as stored in the metadata tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipMetadata {
    /// Id of the field in the metadata store.
    pub field_id: i64,
    /// Stored collection-type value (a class name); empty for scalars.
    pub collection_type: String,
}

/// One entity definition, as stored in the metadata tables.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EntityRecord {
    pub id: i64,
    pub class_name: String,
    pub module: Option<String>,
    pub namespace: Option<String>,
    pub table_name: Option<String>,
}

impl EntityRecord {
    /// Simple (unqualified) class name of the entity.
    pub fn simple_class_name(&self) -> &str {
        match self.class_name.rfind('.') {
            Some(idx) => &self.class_name[idx + 1..],
            None => &self.class_name,
        }
    }

    /// Physical base table name of the entity.
    ///
    /// An explicit table name from the metadata wins. Otherwise the name is
    /// derived deterministically as `MODULE_NAMESPACE_SIMPLECLASSNAME`, with
    /// the module defaulting to `MDS`, spaces and hyphens replaced by
    /// underscores and the whole name upper-cased - the same naming function
    /// the rest of the platform uses.
    pub fn base_table_name(&self) -> String {
        if let Some(table) = non_blank(self.table_name.as_deref()) {
            return table.to_string();
        }

        let module = non_blank(self.module.as_deref()).unwrap_or("MDS");
        let mut name = String::from(module);
        if let Some(namespace) = non_blank(self.namespace.as_deref()) {
            name.push('_');
            name.push_str(namespace);
        }
        name.push('_');
        name.push_str(self.simple_class_name());

        name.replace([' ', '-'], "_").to_uppercase()
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Read-only query surface over the external metadata store.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// All fields that carry a relationship collection type.
    async fn collection_fields(&self) -> Result<Vec<RelationshipMetadata>>;

    /// The entity that owns the given field.
    async fn owning_entity(&self, field_id: i64) -> Result<Option<EntityRecord>>;

    /// The entity on the other side of the field's relationship, resolved
    /// through the field's related-class metadata.
    async fn related_entity(&self, field_id: i64) -> Result<Option<EntityRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(class_name: &str) -> EntityRecord {
        EntityRecord {
            id: 1,
            class_name: class_name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_simple_class_name() {
        assert_eq!(entity("org.example.domain.Foo").simple_class_name(), "Foo");
        assert_eq!(entity("Foo").simple_class_name(), "Foo");
    }

    #[test]
    fn test_explicit_table_name_wins() {
        let mut e = entity("org.example.Foo");
        e.table_name = Some("Foo".to_string());
        assert_eq!(e.base_table_name(), "Foo");
    }

    #[test]
    fn test_derived_table_name() {
        let mut e = entity("org.example.Visit");
        e.module = Some("appointments".to_string());
        e.namespace = Some("clinic".to_string());
        assert_eq!(e.base_table_name(), "APPOINTMENTS_CLINIC_VISIT");
    }

    #[test]
    fn test_derived_table_name_defaults_module() {
        let e = entity("org.example.Visit");
        assert_eq!(e.base_table_name(), "MDS_VISIT");
    }

    #[test]
    fn test_derived_table_name_sanitizes() {
        let mut e = entity("org.example.Visit");
        e.module = Some("mobile forms".to_string());
        assert_eq!(e.base_table_name(), "MOBILE_FORMS_VISIT");
    }

    #[test]
    fn test_blank_table_name_falls_through() {
        let mut e = entity("org.example.Visit");
        e.table_name = Some("  ".to_string());
        assert_eq!(e.base_table_name(), "MDS_VISIT");
    }
}
