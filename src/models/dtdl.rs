//! DTDL model definitions as served by the model catalog.
//!
//! Only the parts of DTDL v2/v3 interfaces that feed schema resolution are
//! decoded: the interface identifier, its `extends` list, reusable `schemas`,
//! and `Property`/`Relationship` contents. Telemetry, commands and components
//! are kept as [`ContentDeclaration::Other`] and ignored.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Returns the canonical short name of a DTMI.
///
/// Takes the segment after the last `:` and strips the `;version` suffix.
///
/// ```rust
/// use adt_twincache::models::short_name;
///
/// assert_eq!(short_name("dtmi:com:example:Warehouse;1"), "Warehouse");
/// assert_eq!(short_name("dtmi:com:example:Warehouse"), "Warehouse");
/// ```
#[must_use]
pub fn short_name(dtmi: &str) -> &str {
    let tail = dtmi.rsplit(':').next().unwrap_or(dtmi);
    tail.split(';').next().unwrap_or(tail)
}

/// A value that DTDL allows as either a single item or an array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    /// Single item.
    One(T),
    /// Several items.
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    /// Flattens into a vector.
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::One(item) => vec![item],
            Self::Many(items) => items,
        }
    }
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

/// A property schema: either a primitive name or a complex descriptor.
///
/// Primitive names may also be DTMIs referring to a reusable schema declared
/// in some model's `schemas` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SchemaDescriptor {
    /// Primitive schema name such as `double` or a schema DTMI.
    Primitive(String),
    /// Complex schema (`Array`, `Enum`, `Map`, `Object`).
    Complex(Box<ComplexSchema>),
}

/// Complex schema descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexSchema {
    /// Identifier, present on reusable schemas.
    #[serde(rename = "@id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Complex kind, e.g. `Enum`.
    #[serde(rename = "@type")]
    pub kind: String,
    /// Value schema of an `Enum`.
    #[serde(
        rename = "valueSchema",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub value_schema: Option<SchemaDescriptor>,
    /// Element schema of an `Array`.
    #[serde(
        rename = "elementSchema",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub element_schema: Option<SchemaDescriptor>,
}

/// A property declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDeclaration {
    /// Property name.
    pub name: String,
    /// Property schema.
    pub schema: SchemaDescriptor,
}

/// A declaration found in an interface's `contents`.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentDeclaration {
    /// A twin property.
    Property(PropertyDeclaration),
    /// A relationship with its own (possibly empty) property list.
    Relationship {
        /// Relationship name.
        name: String,
        /// Properties carried by relationship instances.
        properties: Vec<PropertyDeclaration>,
    },
    /// Telemetry, command, component or anything else.
    Other,
}

/// A DTDL interface.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDefinition {
    /// Namespaced identifier (`dtmi:...;N`).
    pub id: String,
    /// Namespaced identifiers of the parent interfaces.
    pub extends: Vec<String>,
    /// Reusable schemas declared by this interface.
    pub schemas: Vec<ComplexSchema>,
    /// Property and relationship declarations.
    pub contents: Vec<ContentDeclaration>,
}

impl ModelDefinition {
    /// Creates an empty definition.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            extends: Vec::new(),
            schemas: Vec::new(),
            contents: Vec::new(),
        }
    }

    /// Adds a parent interface.
    #[must_use]
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.extends.push(parent.into());
        self
    }

    /// Adds a primitive property.
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, schema: impl Into<String>) -> Self {
        self.contents
            .push(ContentDeclaration::Property(PropertyDeclaration {
                name: name.into(),
                schema: SchemaDescriptor::Primitive(schema.into()),
            }));
        self
    }

    /// Adds a relationship.
    #[must_use]
    pub fn with_relationship(
        mut self,
        name: impl Into<String>,
        properties: Vec<PropertyDeclaration>,
    ) -> Self {
        self.contents.push(ContentDeclaration::Relationship {
            name: name.into(),
            properties,
        });
        self
    }

    /// Returns the canonical short name.
    #[must_use]
    pub fn short_name(&self) -> &str {
        short_name(&self.id)
    }

    /// Decodes an interface from its DTDL JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaResolution`] if the document is not a DTDL
    /// interface.
    pub fn from_dtdl(document: &serde_json::Value) -> Result<Self> {
        let raw: RawInterface = serde_json::from_value(document.clone()).map_err(|e| {
            let id = document
                .get("@id")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("<unknown>");
            Error::schema(id, format!("invalid DTDL interface: {e}"))
        })?;
        Ok(raw.into())
    }
}

#[derive(Debug, Deserialize)]
struct RawInterface {
    #[serde(rename = "@id")]
    id: String,
    #[serde(default)]
    extends: OneOrMany<String>,
    #[serde(default)]
    schemas: OneOrMany<ComplexSchema>,
    #[serde(default)]
    contents: Vec<RawContent>,
}

#[derive(Debug, Deserialize)]
struct RawContent {
    #[serde(rename = "@type")]
    kind: OneOrMany<String>,
    name: String,
    #[serde(default)]
    schema: Option<SchemaDescriptor>,
    #[serde(default)]
    properties: Vec<PropertyDeclaration>,
}

impl From<RawInterface> for ModelDefinition {
    fn from(raw: RawInterface) -> Self {
        let contents = raw
            .contents
            .into_iter()
            .map(ContentDeclaration::from)
            .collect();
        Self {
            id: raw.id,
            extends: raw.extends.into_vec(),
            schemas: raw.schemas.into_vec(),
            contents,
        }
    }
}

impl From<RawContent> for ContentDeclaration {
    fn from(raw: RawContent) -> Self {
        let kinds = raw.kind.into_vec();
        if kinds.iter().any(|k| k == "Relationship") {
            return Self::Relationship {
                name: raw.name,
                properties: raw.properties,
            };
        }
        match (kinds.iter().any(|k| k == "Property"), raw.schema) {
            (true, Some(schema)) => Self::Property(PropertyDeclaration {
                name: raw.name,
                schema,
            }),
            _ => Self::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_short_name() {
        assert_eq!(short_name("dtmi:com:example:Warehouse;1"), "Warehouse");
        assert_eq!(short_name("dtmi:com:example:Warehouse"), "Warehouse");
        assert_eq!(short_name("Warehouse;2"), "Warehouse");
        assert_eq!(short_name("Warehouse"), "Warehouse");
    }

    #[test]
    fn test_from_dtdl_interface() {
        let doc = json!({
            "@id": "dtmi:com:example:Warehouse;1",
            "@type": "Interface",
            "@context": "dtmi:dtdl:context;2",
            "extends": "dtmi:com:example:Asset;1",
            "contents": [
                {"@type": "Property", "name": "capacity", "schema": "double"},
                {"@type": ["Property", "Temperature"], "name": "temp", "schema": "float", "unit": "degreeCelsius"},
                {"@type": "Telemetry", "name": "load", "schema": "double"},
                {"@type": "Relationship", "name": "contains", "target": "dtmi:com:example:Pallet;1",
                 "properties": [{"@type": "Property", "name": "since", "schema": "dateTime"}]},
                {"@type": "Property", "name": "tags",
                 "schema": {"@type": "Array", "elementSchema": "string"}}
            ]
        });

        let model = ModelDefinition::from_dtdl(&doc).unwrap();
        assert_eq!(model.short_name(), "Warehouse");
        assert_eq!(model.extends, vec!["dtmi:com:example:Asset;1"]);
        assert_eq!(model.contents.len(), 5);
        assert!(matches!(model.contents[2], ContentDeclaration::Other));
        match &model.contents[3] {
            ContentDeclaration::Relationship { name, properties } => {
                assert_eq!(name, "contains");
                assert_eq!(properties.len(), 1);
                assert_eq!(properties[0].name, "since");
            },
            other => panic!("unexpected declaration: {other:?}"),
        }
        match &model.contents[4] {
            ContentDeclaration::Property(p) => {
                assert!(matches!(p.schema, SchemaDescriptor::Complex(_)));
            },
            other => panic!("unexpected declaration: {other:?}"),
        }
    }

    #[test]
    fn test_from_dtdl_multiple_parents() {
        let doc = json!({
            "@id": "dtmi:com:example:Hub;1",
            "@type": "Interface",
            "extends": ["dtmi:com:example:A;1", "dtmi:com:example:B;1"]
        });
        let model = ModelDefinition::from_dtdl(&doc).unwrap();
        assert_eq!(model.extends.len(), 2);
        assert!(model.contents.is_empty());
    }

    #[test]
    fn test_from_dtdl_rejects_missing_id() {
        let err = ModelDefinition::from_dtdl(&json!({"@type": "Interface"})).unwrap_err();
        assert!(matches!(err, Error::SchemaResolution { .. }));
    }
}
