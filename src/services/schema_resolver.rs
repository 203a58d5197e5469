//! Schema resolution service.
//!
//! Turns the DTDL model catalog into a [`TypeCatalog`] in two phases:
//!
//! 1. every model's own property and relationship declarations are mapped to
//!    storage types;
//! 2. twin schemas are flattened over the `extends` graph depth first, so a
//!    type is only flattened after all of its parents.
//!
//! The result does not depend on the order in which models are listed.

use crate::adt::ModelCatalog;
use crate::models::{
    CatalogEntry, ComplexSchema, ContentDeclaration, ModelDefinition, PropertyDeclaration,
    SchemaDescriptor, StorageType, TypeCatalog, TypeSchema, short_name,
};
use crate::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;
use tracing::instrument;

/// Nesting limit for complex and reusable schemas.
const MAX_SCHEMA_DEPTH: usize = 8;

/// Maps a DTDL primitive schema name to its storage type.
///
/// | DTDL schema | Storage type |
/// |-------------|--------------|
/// | `boolean` | `BOOLEAN` |
/// | `date`, `dateTime`, `duration`, `time`, `string` | `STRING` |
/// | `double` | `DOUBLE` |
/// | `float` | `FLOAT` |
/// | `integer` | `INTEGER` |
/// | `long` | `LONG` |
#[must_use]
pub fn primitive_storage_type(name: &str) -> Option<StorageType> {
    match name {
        "boolean" => Some(StorageType::Boolean),
        "date" | "dateTime" | "duration" | "time" | "string" => Some(StorageType::String),
        "double" => Some(StorageType::Double),
        "float" => Some(StorageType::Float),
        "integer" => Some(StorageType::Integer),
        "long" => Some(StorageType::Long),
        _ => None,
    }
}

/// Reusable schemas declared in model `schemas` sections, by DTMI.
type ReusableSchemas<'a> = HashMap<&'a str, &'a ComplexSchema>;

/// Resolves a schema descriptor to a storage type.
///
/// `Array` maps to `ARRAY` once its element schema resolves, `Map` and
/// `Object` are stored as serialized strings, and `Enum` takes the type of
/// its value schema.
fn resolve_descriptor(
    descriptor: &SchemaDescriptor,
    reusable: &ReusableSchemas<'_>,
    depth: usize,
) -> std::result::Result<StorageType, String> {
    if depth > MAX_SCHEMA_DEPTH {
        return Err(format!("schema nesting exceeds {MAX_SCHEMA_DEPTH} levels"));
    }
    match descriptor {
        SchemaDescriptor::Primitive(name) => primitive_storage_type(name).map_or_else(
            || {
                reusable.get(name.as_str()).map_or_else(
                    || Err(format!("unknown schema '{name}'")),
                    |complex| resolve_complex(complex, reusable, depth + 1),
                )
            },
            Ok,
        ),
        SchemaDescriptor::Complex(complex) => resolve_complex(complex, reusable, depth + 1),
    }
}

fn resolve_complex(
    complex: &ComplexSchema,
    reusable: &ReusableSchemas<'_>,
    depth: usize,
) -> std::result::Result<StorageType, String> {
    match complex.kind.as_str() {
        "Array" => complex.element_schema.as_ref().map_or_else(
            || Err("Array without elementSchema".to_string()),
            |element| resolve_descriptor(element, reusable, depth).map(|_| StorageType::Array),
        ),
        "Map" | "Object" => Ok(StorageType::String),
        "Enum" => complex.value_schema.as_ref().map_or_else(
            || Err("Enum without valueSchema".to_string()),
            |value| resolve_descriptor(value, reusable, depth),
        ),
        other => Err(format!("unknown complex schema '{other}'")),
    }
}

/// A model's own declarations before flattening.
#[derive(Debug, Default)]
struct OwnSchema {
    schema: TypeSchema,
    parents: Vec<String>,
}

/// Builds the [`TypeCatalog`] of a run.
#[derive(Debug, Default, Clone, Copy)]
pub struct SchemaResolver;

impl SchemaResolver {
    /// Creates a resolver.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Lists every model of `source` and resolves them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaResolution`] if the catalog cannot be listed
    /// or any model cannot be resolved.
    #[instrument(skip_all, fields(operation = "schema.resolve"))]
    pub fn resolve_catalog<C: ModelCatalog + ?Sized>(&self, source: &C) -> Result<TypeCatalog> {
        let start = Instant::now();
        let models = source.list_models()?;
        let catalog = self.resolve(&models)?;

        tracing::info!(
            models = models.len(),
            twin_types = catalog.twins.len(),
            relationship_types = catalog.relationships.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "Resolved type catalog"
        );
        Ok(catalog)
    }

    /// Resolves a set of model definitions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaResolution`] naming the model when a property
    /// schema is unknown, a parent is missing, or inheritance is cyclic.
    pub fn resolve(&self, models: &[ModelDefinition]) -> Result<TypeCatalog> {
        let reusable: ReusableSchemas<'_> = models
            .iter()
            .flat_map(|model| model.schemas.iter())
            .filter_map(|schema| schema.id.as_deref().map(|id| (id, schema)))
            .collect();

        let mut own: BTreeMap<String, OwnSchema> = BTreeMap::new();
        let mut relationships: BTreeMap<String, TypeSchema> = BTreeMap::new();

        for model in models {
            let name = model.short_name().to_string();
            let entry = own.entry(name.clone()).or_default();
            let mut declared = TypeSchema::new();

            for content in &model.contents {
                match content {
                    ContentDeclaration::Property(property) => {
                        let storage_type = resolve_property(model, property, &reusable)?;
                        declared.insert(&property.name, storage_type);
                    },
                    ContentDeclaration::Relationship { name: rel, properties } => {
                        let schema = relationships.entry(rel.clone()).or_default();
                        for property in properties {
                            let storage_type = resolve_property(model, property, &reusable)?;
                            schema.insert_if_absent(&property.name, storage_type);
                        }
                    },
                    ContentDeclaration::Other => {},
                }
            }

            for (field, storage_type) in declared.iter() {
                if !entry.schema.insert_if_absent(field, storage_type) {
                    tracing::warn!(
                        model = %model.id,
                        field,
                        "Field already declared by another version of this type; keeping first"
                    );
                }
            }
            for parent in &model.extends {
                let parent = short_name(parent).to_string();
                if !entry.parents.contains(&parent) {
                    entry.parents.push(parent);
                }
            }
        }

        let mut twins = BTreeMap::new();
        let mut path = Vec::new();
        for name in own.keys() {
            flatten(name, &own, &mut twins, &mut path)?;
        }

        Ok(TypeCatalog {
            twins,
            relationships,
        })
    }
}

fn resolve_property(
    model: &ModelDefinition,
    property: &PropertyDeclaration,
    reusable: &ReusableSchemas<'_>,
) -> Result<StorageType> {
    resolve_descriptor(&property.schema, reusable, 0)
        .map_err(|cause| Error::schema(&model.id, format!("property '{}': {cause}", property.name)))
}

/// Flattens `name` after its parents. `path` holds the types currently being
/// flattened and detects cycles.
fn flatten(
    name: &str,
    own: &BTreeMap<String, OwnSchema>,
    done: &mut BTreeMap<String, CatalogEntry>,
    path: &mut Vec<String>,
) -> Result<()> {
    if done.contains_key(name) {
        return Ok(());
    }
    if let Some(start) = path.iter().position(|visited| visited == name) {
        let mut cycle = path[start..].to_vec();
        cycle.push(name.to_string());
        return Err(Error::schema(
            name,
            format!("inheritance cycle: {}", cycle.join(" -> ")),
        ));
    }
    let Some(declared) = own.get(name) else {
        return Err(Error::schema(name, "model is not in the catalog"));
    };

    path.push(name.to_string());
    let mut schema = declared.schema.clone();
    for parent in &declared.parents {
        if !own.contains_key(parent) {
            return Err(Error::schema(
                name,
                format!("parent '{parent}' is not in the catalog"),
            ));
        }
        flatten(parent, own, done, path)?;
        if let Some(resolved) = done.get(parent) {
            schema.inherit_from(&resolved.schema);
        }
    }
    path.pop();

    done.insert(
        name.to_string(),
        CatalogEntry {
            schema,
            parents: declared.parents.clone(),
        },
    );
    Ok(())
}
