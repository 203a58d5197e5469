//! Twin and relationship extraction.
//!
//! Reserved fields start with `$`. Only `$dtId`, `$relationshipId`,
//! `$sourceId` and `$targetId` survive, renamed to the canonical `id`, `src`
//! and `dest`; `$metadata.$model` and `$relationshipName` decide the grouping
//! key. Everything else reserved is dropped.

use crate::adt::TwinQuery;
use crate::models::{
    DEST_FIELD, ExtractedGraph, ID_FIELD, RelationshipRecord, SOURCE_FIELD, TwinRecord, short_name,
};
use crate::{Error, Result};
use serde_json::{Map, Value};
use std::time::Instant;
use tracing::instrument;

/// Query selecting every twin.
pub const TWINS_QUERY: &str = "SELECT * FROM digitaltwins";

/// Query selecting every relationship.
pub const RELATIONSHIPS_QUERY: &str = "SELECT * FROM relationships";

const RESERVED_PREFIX: char = '$';

/// Reads the whole twin graph from a query interface.
pub struct Extractor<'a, Q: TwinQuery + ?Sized> {
    source: &'a Q,
}

impl<'a, Q: TwinQuery + ?Sized> Extractor<'a, Q> {
    /// Creates an extractor over `source`.
    pub const fn new(source: &'a Q) -> Self {
        Self { source }
    }

    /// Extracts all twins, then all relationships.
    ///
    /// Both queries are consumed completely before returning.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Extraction`] if either query fails or a result lacks
    /// a required reserved field. Nothing is retried.
    #[instrument(skip(self), fields(operation = "extract"))]
    pub fn extract(&self) -> Result<ExtractedGraph> {
        let mut graph = ExtractedGraph::default();

        let start = Instant::now();
        let twins = self.extract_twins(&mut graph)?;
        tracing::debug!(
            twins,
            elapsed_ms = start.elapsed().as_millis(),
            "Extracted twins"
        );

        let start = Instant::now();
        let relationships = self.extract_relationships(&mut graph)?;
        tracing::debug!(
            relationships,
            elapsed_ms = start.elapsed().as_millis(),
            "Extracted relationships"
        );

        tracing::info!(
            twins,
            twin_types = graph.twins.len(),
            relationships,
            relationship_types = graph.relationships.len(),
            "Extraction complete"
        );
        Ok(graph)
    }

    fn extract_twins(&self, graph: &mut ExtractedGraph) -> Result<usize> {
        let mut count = 0;
        for result in self.source.query(TWINS_QUERY)? {
            let document = result?;
            count += 1;
            let twin = twin_from_document(&document)
                .map_err(|cause| Error::extraction(TWINS_QUERY, format!("result {count}: {cause}")))?;
            graph.push_twin(twin);
        }
        Ok(count)
    }

    fn extract_relationships(&self, graph: &mut ExtractedGraph) -> Result<usize> {
        let mut count = 0;
        for result in self.source.query(RELATIONSHIPS_QUERY)? {
            let document = result?;
            count += 1;
            let relationship = relationship_from_document(&document).map_err(|cause| {
                Error::extraction(RELATIONSHIPS_QUERY, format!("result {count}: {cause}"))
            })?;
            graph.push_relationship(relationship);
        }
        Ok(count)
    }
}

/// Normalizes one twin query result.
///
/// # Errors
///
/// Returns a description of the problem if the document is not an object or
/// lacks `$dtId` or `$metadata.$model`.
pub fn twin_from_document(document: &Value) -> std::result::Result<TwinRecord, String> {
    let object = as_object(document)?;
    let id = reserved_str(object, "$dtId")?;
    let model = object
        .get("$metadata")
        .and_then(|metadata| metadata.get("$model"))
        .and_then(Value::as_str)
        .ok_or_else(|| format!("twin '{id}' has no $metadata.$model"))?;

    let mut twin = TwinRecord::new(short_name(model), id);
    twin.properties = user_fields(object, &[ID_FIELD]);
    Ok(twin)
}

/// Normalizes one relationship query result.
///
/// # Errors
///
/// Returns a description of the problem if the document is not an object or
/// lacks one of `$relationshipId`, `$sourceId`, `$targetId` or
/// `$relationshipName`.
pub fn relationship_from_document(
    document: &Value,
) -> std::result::Result<RelationshipRecord, String> {
    let object = as_object(document)?;
    let mut relationship = RelationshipRecord::new(
        reserved_str(object, "$relationshipName")?,
        reserved_str(object, "$relationshipId")?,
        reserved_str(object, "$sourceId")?,
        reserved_str(object, "$targetId")?,
    );
    relationship.properties = user_fields(object, &[ID_FIELD, SOURCE_FIELD, DEST_FIELD]);
    Ok(relationship)
}

fn as_object(document: &Value) -> std::result::Result<&Map<String, Value>, String> {
    document
        .as_object()
        .ok_or_else(|| format!("expected a JSON object, got {document}"))
}

fn reserved_str<'v>(
    object: &'v Map<String, Value>,
    field: &str,
) -> std::result::Result<&'v str, String> {
    object
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("missing {field}"))
}

/// Copies non-reserved fields, skipping names taken by canonical fields.
fn user_fields(object: &Map<String, Value>, canonical: &[&str]) -> Map<String, Value> {
    object
        .iter()
        .filter(|(name, _)| !name.starts_with(RESERVED_PREFIX))
        .filter(|(name, _)| {
            let shadowed = canonical.contains(&name.as_str());
            if shadowed {
                tracing::debug!(field = %name, "Dropping property shadowed by a canonical field");
            }
            !shadowed
        })
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adt::InMemorySource;
    use serde_json::json;

    #[test]
    fn test_twin_normalization() {
        let twin = twin_from_document(&json!({
            "$dtId": "w1",
            "$etag": "W/\"abc\"",
            "$metadata": {"$model": "dtmi:com:example:Warehouse;1", "capacity": {}},
            "capacity": 120.5,
            "tags": ["cold", "north"]
        }))
        .unwrap();

        assert_eq!(twin.type_name, "Warehouse");
        assert_eq!(twin.id, "w1");
        assert_eq!(twin.properties.len(), 2);
        assert_eq!(twin.properties["capacity"], json!(120.5));
        assert!(!twin.properties.contains_key("$etag"));
    }

    #[test]
    fn test_canonical_id_wins() {
        let twin = twin_from_document(&json!({
            "$dtId": "w1",
            "$metadata": {"$model": "dtmi:x:Warehouse;1"},
            "id": "user-defined"
        }))
        .unwrap();
        assert_eq!(twin.id, "w1");
        assert!(twin.properties.is_empty());
    }

    #[test]
    fn test_relationship_normalization() {
        let relationship = relationship_from_document(&json!({
            "$relationshipId": "R1",
            "$sourceId": "A",
            "$targetId": "B",
            "$relationshipName": "contains",
            "$etag": "x",
            "since": "2024-01-01"
        }))
        .unwrap();

        assert_eq!(relationship.type_name, "contains");
        assert_eq!(relationship.id, "R1");
        assert_eq!(relationship.src, "A");
        assert_eq!(relationship.dest, "B");
        assert_eq!(relationship.properties.len(), 1);
        assert!(!relationship.properties.contains_key("$relationshipName"));
    }

    #[test]
    fn test_missing_reserved_fields() {
        assert!(twin_from_document(&json!({"$metadata": {"$model": "dtmi:x:A;1"}})).is_err());
        assert!(twin_from_document(&json!({"$dtId": "a"})).is_err());
        assert!(twin_from_document(&json!("a")).is_err());
        let err = relationship_from_document(&json!({
            "$relationshipId": "R1",
            "$sourceId": "A",
            "$relationshipName": "contains"
        }))
        .unwrap_err();
        assert_eq!(err, "missing $targetId");
    }

    #[test]
    fn test_extract_groups_by_type() {
        let source = InMemorySource::new()
            .with_twin(json!({"$dtId": "w1", "$metadata": {"$model": "dtmi:x:Warehouse;1"}}))
            .with_twin(json!({"$dtId": "w2", "$metadata": {"$model": "dtmi:x:Warehouse;2"}}))
            .with_twin(json!({"$dtId": "a1", "$metadata": {"$model": "dtmi:x:Asset;1"}}))
            .with_relationship(json!({
                "$relationshipId": "R1",
                "$sourceId": "w1",
                "$targetId": "a1",
                "$relationshipName": "contains"
            }));

        let graph = Extractor::new(&source).extract().unwrap();
        assert_eq!(graph.twins["Warehouse"].len(), 2);
        assert_eq!(graph.twins["Asset"].len(), 1);
        assert_eq!(graph.relationship_count(), 1);
        assert_eq!(graph.relationships["contains"][0].dest, "a1");
    }

    #[test]
    fn test_extract_failures() {
        let failing = InMemorySource::new().failing("401 Unauthorized");
        let err = Extractor::new(&failing).extract().unwrap_err();
        assert!(matches!(err, Error::Extraction { ref query, .. } if query == TWINS_QUERY));

        let malformed = InMemorySource::new().with_twin(json!({"$dtId": "w1"}));
        let err = Extractor::new(&malformed).extract().unwrap_err();
        assert!(err.to_string().contains("result 1"));
    }
}
