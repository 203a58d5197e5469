//! Resolved type schemas.

use super::StorageType;
use serde::Serialize;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

/// Field name to storage type mapping for one twin or relationship type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TypeSchema {
    fields: BTreeMap<String, StorageType>,
}

impl TypeSchema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the storage type of a field, replacing any previous entry.
    pub fn insert(&mut self, field: impl Into<String>, storage_type: StorageType) {
        self.fields.insert(field.into(), storage_type);
    }

    /// Adds a field unless it is already declared.
    ///
    /// Returns `true` if the field was added.
    pub fn insert_if_absent(&mut self, field: &str, storage_type: StorageType) -> bool {
        match self.fields.entry(field.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(storage_type);
                true
            },
            Entry::Occupied(_) => false,
        }
    }

    /// Extends this schema with every field of `ancestor` not already declared.
    pub fn inherit_from(&mut self, ancestor: &Self) {
        for (field, storage_type) in &ancestor.fields {
            self.insert_if_absent(field, *storage_type);
        }
    }

    /// Looks up a field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<StorageType> {
        self.fields.get(field).copied()
    }

    /// Iterates fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, StorageType)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the schema has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, StorageType)> for TypeSchema {
    fn from_iter<I: IntoIterator<Item = (K, StorageType)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// A twin type in the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    /// Flattened schema (own fields plus inherited ones).
    pub schema: TypeSchema,
    /// Short names of the direct parent types.
    pub parents: Vec<String>,
}

/// Resolved schemas for every twin and relationship type of a run.
///
/// Twin types and relationship types live in separate namespaces, so a
/// relationship named like a model does not shadow it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TypeCatalog {
    /// Twin types by short name.
    pub twins: BTreeMap<String, CatalogEntry>,
    /// Relationship types by name.
    pub relationships: BTreeMap<String, TypeSchema>,
}

impl TypeCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the flattened schema of a twin type.
    #[must_use]
    pub fn twin_schema(&self, type_name: &str) -> Option<&TypeSchema> {
        self.twins.get(type_name).map(|entry| &entry.schema)
    }

    /// Returns the schema of a relationship type.
    #[must_use]
    pub fn relationship_schema(&self, name: &str) -> Option<&TypeSchema> {
        self.relationships.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inherit_keeps_own_fields() {
        let mut child: TypeSchema = [("capacity", StorageType::Double), ("owner", StorageType::Long)]
            .into_iter()
            .collect();
        let parent: TypeSchema = [("owner", StorageType::String), ("site", StorageType::String)]
            .into_iter()
            .collect();

        child.inherit_from(&parent);

        assert_eq!(child.len(), 3);
        assert_eq!(child.get("owner"), Some(StorageType::Long));
        assert_eq!(child.get("site"), Some(StorageType::String));
    }

    #[test]
    fn test_insert_if_absent() {
        let mut schema = TypeSchema::new();
        assert!(schema.insert_if_absent("a", StorageType::Integer));
        assert!(!schema.insert_if_absent("a", StorageType::String));
        assert_eq!(schema.get("a"), Some(StorageType::Integer));
    }

    #[test]
    fn test_catalog_serializes_as_tags() {
        let mut catalog = TypeCatalog::new();
        catalog.twins.insert(
            "Asset".to_string(),
            CatalogEntry {
                schema: [("owner", StorageType::String)].into_iter().collect(),
                parents: Vec::new(),
            },
        );
        let json = serde_json::to_value(&catalog).unwrap();
        assert_eq!(json["twins"]["Asset"]["schema"]["owner"], "STRING");
    }
}
