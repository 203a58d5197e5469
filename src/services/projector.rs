//! Record projection.
//!
//! Column layout of a projected table:
//!
//! | Table | Forced prefix | Remaining columns |
//! |-------|---------------|-------------------|
//! | twin | `id:ID` | union of property names, sorted |
//! | relationship | `src:START_ID`, `dest:END_ID` | `id:STRING` and property names, sorted |
//!
//! Every row has one cell per column; fields a record does not carry are
//! empty cells.

use crate::io::{DefaultValueFormatter, ValueFormatter, coerce};
use crate::models::{
    CacheBatch, Column, DEST_FIELD, ExtractedGraph, ID_FIELD, ProjectedRow, ProjectedTable,
    RelationshipRecord, SOURCE_FIELD, StorageType, TableKind, TwinRecord, TypeCatalog, TypeSchema,
};
use crate::{Error, Result};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::instrument;

/// Projects extracted records onto their type schemas.
#[derive(Debug, Clone, Default)]
pub struct RecordProjector<F: ValueFormatter = DefaultValueFormatter> {
    formatter: F,
}

impl RecordProjector {
    /// Creates a projector with the default value formatter.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            formatter: DefaultValueFormatter,
        }
    }
}

impl<F: ValueFormatter> RecordProjector<F> {
    /// Creates a projector with a custom value formatter.
    pub const fn with_formatter(formatter: F) -> Self {
        Self { formatter }
    }

    /// Projects the twins of one type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Projection`] if a twin carries a property that
    /// `schema` does not declare.
    pub fn project_twins(
        &self,
        type_name: &str,
        records: &[TwinRecord],
        schema: &TypeSchema,
    ) -> Result<ProjectedTable> {
        let mut columns = vec![Column::new(ID_FIELD, StorageType::Id)];
        columns.extend(property_columns(
            type_name,
            records.iter().map(|r| &r.properties),
            schema,
            &[],
        )?);

        let rows = records
            .iter()
            .map(|record| {
                let mut values = Vec::with_capacity(columns.len());
                values.push(record.id.clone());
                values.extend(self.property_cells(&columns[1..], &record.properties));
                ProjectedRow { values }
            })
            .collect();

        Ok(ProjectedTable {
            type_name: type_name.to_string(),
            kind: TableKind::Twin,
            columns,
            rows,
        })
    }

    /// Projects the relationships of one type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Projection`] if a relationship carries a property
    /// that `schema` does not declare.
    pub fn project_relationships(
        &self,
        type_name: &str,
        records: &[RelationshipRecord],
        schema: &TypeSchema,
    ) -> Result<ProjectedTable> {
        let mut columns = vec![
            Column::new(SOURCE_FIELD, StorageType::StartId),
            Column::new(DEST_FIELD, StorageType::EndId),
        ];
        columns.extend(property_columns(
            type_name,
            records.iter().map(|r| &r.properties),
            schema,
            &[Column::new(ID_FIELD, StorageType::String)],
        )?);

        let rows = records
            .iter()
            .map(|record| {
                let values = columns
                    .iter()
                    .map(|column| match column.name.as_str() {
                        SOURCE_FIELD => record.src.clone(),
                        DEST_FIELD => record.dest.clone(),
                        ID_FIELD => record.id.clone(),
                        name => coerce(
                            record.properties.get(name),
                            column.storage_type,
                            &self.formatter,
                        ),
                    })
                    .collect();
                ProjectedRow { values }
            })
            .collect();

        Ok(ProjectedTable {
            type_name: type_name.to_string(),
            kind: TableKind::Relationship,
            columns,
            rows,
        })
    }

    fn property_cells<'a>(
        &'a self,
        columns: &'a [Column],
        properties: &'a Map<String, Value>,
    ) -> impl Iterator<Item = String> + 'a {
        columns.iter().map(move |column| {
            coerce(
                properties.get(&column.name),
                column.storage_type,
                &self.formatter,
            )
        })
    }
}

/// Sorted property columns with their declared types.
///
/// `fixed` columns take their given type regardless of the schema and are
/// sorted together with the property columns.
fn property_columns<'a>(
    type_name: &str,
    records: impl Iterator<Item = &'a Map<String, Value>>,
    schema: &TypeSchema,
    fixed: &[Column],
) -> Result<Vec<Column>> {
    let mut names: BTreeSet<&str> = BTreeSet::new();
    for properties in records {
        names.extend(properties.keys().map(String::as_str));
    }
    for column in fixed {
        names.insert(column.name.as_str());
    }

    names
        .into_iter()
        .map(|name| {
            if let Some(column) = fixed.iter().find(|c| c.name == name) {
                return Ok(column.clone());
            }
            schema
                .get(name)
                .map(|storage_type| Column::new(name, storage_type))
                .ok_or_else(|| Error::Projection {
                    type_name: type_name.to_string(),
                    column: name.to_string(),
                    cause: "no storage type declared for this field".to_string(),
                })
        })
        .collect()
}

/// Projects a whole extraction into a [`CacheBatch`].
///
/// Types without a catalog entry are projected against an empty schema, so
/// they only succeed when their records carry no properties.
///
/// # Errors
///
/// Returns [`Error::Projection`] for the first field without a resolvable
/// storage type.
#[instrument(skip_all, fields(operation = "project", rotation = rotation))]
pub fn build_batch<F: ValueFormatter>(
    catalog: &TypeCatalog,
    extracted: &ExtractedGraph,
    rotation: u32,
    projector: &RecordProjector<F>,
) -> Result<CacheBatch> {
    let start = Instant::now();
    let empty = TypeSchema::new();

    let twins = extracted
        .twins
        .iter()
        .map(|(type_name, records)| {
            let schema = catalog.twin_schema(type_name).unwrap_or_else(|| {
                tracing::warn!(type_name = %type_name, "Twin type missing from model catalog");
                &empty
            });
            projector.project_twins(type_name, records, schema)
        })
        .collect::<Result<Vec<_>>>()?;

    let relationships = extracted
        .relationships
        .iter()
        .map(|(type_name, records)| {
            let schema = catalog.relationship_schema(type_name).unwrap_or_else(|| {
                tracing::warn!(
                    type_name = %type_name,
                    "Relationship type missing from model catalog"
                );
                &empty
            });
            projector.project_relationships(type_name, records, schema)
        })
        .collect::<Result<Vec<_>>>()?;

    let batch = CacheBatch {
        twins,
        relationships,
        rotation,
    };
    tracing::info!(
        twin_rows = batch.twin_rows(),
        relationship_rows = batch.relationship_rows(),
        elapsed_ms = start.elapsed().as_millis(),
        "Projected records"
    );
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn warehouse_schema() -> TypeSchema {
        [
            ("capacity", StorageType::Double),
            ("owner", StorageType::String),
            ("tags", StorageType::Array),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_twin_columns_and_rows() {
        let records = vec![
            TwinRecord::new("Warehouse", "w1")
                .with_property("owner", "acme")
                .with_property("capacity", 120.5),
            TwinRecord::new("Warehouse", "w2").with_property("tags", json!(["cold"])),
        ];
        let table = RecordProjector::new()
            .project_twins("Warehouse", &records, &warehouse_schema())
            .unwrap();

        assert_eq!(
            table.annotated_header(),
            vec!["id:ID", "capacity:DOUBLE", "owner:STRING", "tags:ARRAY"]
        );
        assert_eq!(table.rows[0].values, vec!["w1", "120.5", "acme", ""]);
        assert_eq!(table.rows[1].values, vec!["w2", "", "", "['cold']"]);
    }

    #[test]
    fn test_relationship_columns() {
        let schema: TypeSchema = [("since", StorageType::String), ("weight", StorageType::Long)]
            .into_iter()
            .collect();
        let records = vec![
            RelationshipRecord::new("contains", "R1", "A", "B").with_property("weight", 3),
            RelationshipRecord::new("contains", "R2", "A", "C").with_property("since", "2024"),
        ];
        let table = RecordProjector::new()
            .project_relationships("contains", &records, &schema)
            .unwrap();

        assert_eq!(
            table.annotated_header(),
            vec![
                "src:START_ID",
                "dest:END_ID",
                "id:STRING",
                "since:STRING",
                "weight:LONG"
            ]
        );
        assert_eq!(table.rows[0].values, vec!["A", "B", "R1", "", "3"]);
        assert_eq!(table.rows[1].values, vec!["A", "C", "R2", "2024", ""]);
    }

    #[test]
    fn test_relationship_without_properties() {
        let records = vec![RelationshipRecord::new("contains", "R1", "A", "B")];
        let table = RecordProjector::new()
            .project_relationships("contains", &records, &TypeSchema::new())
            .unwrap();
        assert_eq!(table.plain_header(), vec!["src", "dest", "id"]);
        assert_eq!(table.rows[0].values, vec!["A", "B", "R1"]);
    }

    #[test]
    fn test_undeclared_field_fails() {
        let records = vec![TwinRecord::new("Warehouse", "w1").with_property("color", "red")];
        let err = RecordProjector::new()
            .project_twins("Warehouse", &records, &warehouse_schema())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Projection { ref type_name, ref column, .. }
                if type_name == "Warehouse" && column == "color"
        ));
    }

    #[test]
    fn test_build_batch() {
        let mut catalog = TypeCatalog::new();
        catalog.twins.insert(
            "Warehouse".to_string(),
            crate::models::CatalogEntry {
                schema: warehouse_schema(),
                parents: Vec::new(),
            },
        );
        let mut extracted = ExtractedGraph::default();
        extracted.push_twin(TwinRecord::new("Warehouse", "w1").with_property("owner", "acme"));
        extracted.push_twin(TwinRecord::new("Unknown", "u1"));
        extracted.push_relationship(RelationshipRecord::new("contains", "R1", "w1", "u1"));

        let batch = build_batch(&catalog, &extracted, 3, &RecordProjector::new()).unwrap();
        assert_eq!(batch.rotation, 3);
        assert_eq!(batch.twins.len(), 2);
        assert_eq!(batch.twin_rows(), 2);
        assert_eq!(batch.relationship_rows(), 1);

        extracted.push_twin(TwinRecord::new("Unknown", "u2").with_property("x", 1));
        assert!(build_batch(&catalog, &extracted, 3, &RecordProjector::new()).is_err());
    }
}
