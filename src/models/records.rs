//! Records extracted from the twin graph.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Canonical identifier field.
pub const ID_FIELD: &str = "id";
/// Canonical relationship source field.
pub const SOURCE_FIELD: &str = "src";
/// Canonical relationship destination field.
pub const DEST_FIELD: &str = "dest";

/// A twin with its non-reserved properties.
#[derive(Debug, Clone, PartialEq)]
pub struct TwinRecord {
    /// Twin type short name.
    pub type_name: String,
    /// Twin identifier (`$dtId`).
    pub id: String,
    /// Non-reserved properties, copied verbatim.
    pub properties: Map<String, Value>,
}

impl TwinRecord {
    /// Creates a record without properties.
    #[must_use]
    pub fn new(type_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            id: id.into(),
            properties: Map::new(),
        }
    }

    /// Adds a property.
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }
}

/// A relationship instance with its non-reserved properties.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipRecord {
    /// Relationship type name (`$relationshipName`).
    pub type_name: String,
    /// Relationship identifier (`$relationshipId`).
    pub id: String,
    /// Source twin identifier (`$sourceId`).
    pub src: String,
    /// Destination twin identifier (`$targetId`).
    pub dest: String,
    /// Non-reserved properties, copied verbatim.
    pub properties: Map<String, Value>,
}

impl RelationshipRecord {
    /// Creates a record without properties.
    #[must_use]
    pub fn new(
        type_name: impl Into<String>,
        id: impl Into<String>,
        src: impl Into<String>,
        dest: impl Into<String>,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            id: id.into(),
            src: src.into(),
            dest: dest.into(),
            properties: Map::new(),
        }
    }

    /// Adds a property.
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }
}

/// Everything extracted in one run, grouped by type name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedGraph {
    /// Twins by type short name.
    pub twins: BTreeMap<String, Vec<TwinRecord>>,
    /// Relationships by relationship name.
    pub relationships: BTreeMap<String, Vec<RelationshipRecord>>,
}

impl ExtractedGraph {
    /// Adds a twin under its type.
    pub fn push_twin(&mut self, twin: TwinRecord) {
        self.twins
            .entry(twin.type_name.clone())
            .or_default()
            .push(twin);
    }

    /// Adds a relationship under its type.
    pub fn push_relationship(&mut self, relationship: RelationshipRecord) {
        self.relationships
            .entry(relationship.type_name.clone())
            .or_default()
            .push(relationship);
    }

    /// Total number of twins.
    #[must_use]
    pub fn twin_count(&self) -> usize {
        self.twins.values().map(Vec::len).sum()
    }

    /// Total number of relationships.
    #[must_use]
    pub fn relationship_count(&self) -> usize {
        self.relationships.values().map(Vec::len).sum()
    }
}
