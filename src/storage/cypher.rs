//! Cypher text builders.
//!
//! Labels, relationship types and property keys are always backtick-quoted.
//! String values are single-quoted with `\` and `'` escaped. Cells are turned
//! into literals according to their declared [`StorageType`], which is where
//! the annotated artifact schema is enforced.

use crate::models::StorageType;
use std::fmt;

/// Quotes an identifier with backticks, doubling embedded backticks.
#[must_use]
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Quotes a string literal.
#[must_use]
pub fn quote_string(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '\'' => quoted.push_str("\\'"),
            _ => quoted.push(c),
        }
    }
    quoted.push('\'');
    quoted
}

/// Converts a cell into a literal of the declared type.
///
/// Empty cells have no literal and return `Ok(None)`.
///
/// # Errors
///
/// Returns a description of the mismatch when the cell does not parse as
/// `storage_type`.
pub fn literal(cell: &str, storage_type: StorageType) -> Result<Option<String>, String> {
    if cell.is_empty() {
        return Ok(None);
    }

    let invalid = || format!("'{cell}' is not a valid {storage_type}");
    let rendered = if storage_type.is_integral() {
        cell.parse::<i64>().map_err(|_| invalid())?.to_string()
    } else if storage_type.is_floating() {
        let value = cell
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .ok_or_else(invalid)?;
        float_literal(value)
    } else if storage_type.is_identifier() {
        quote_string(cell)
    } else {
        match storage_type {
            StorageType::Boolean => match cell.to_ascii_lowercase().as_str() {
                "true" => "true".to_string(),
                "false" => "false".to_string(),
                _ => return Err(invalid()),
            },
            StorageType::Array => {
                if !(cell.starts_with('[') && cell.ends_with(']')) {
                    return Err(format!("'{cell}' is not a list literal"));
                }
                cell.to_string()
            },
            _ => quote_string(cell),
        }
    };
    Ok(Some(rendered))
}

/// Renders a finite double so Cypher always reads it back as a float.
///
/// Magnitudes that `serde_json` writes with an exponent keep one, since
/// their plain form would read as an integer and may not fit in 64 bits.
fn float_literal(value: f64) -> String {
    let magnitude = value.abs();
    if magnitude != 0.0 && !(1e-7..1e16).contains(&magnitude) {
        format!("{value:e}")
    } else if value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

/// Map literal of quoted keys and rendered values, e.g. ``{`id`: 'w1'}``.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyMap {
    entries: Vec<(String, String)>,
}

impl PropertyMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry. `value` must already be a rendered literal or
    /// expression.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), value.into()));
    }

    /// Builds a map whose values read the same-named fields of `var`.
    pub fn projection<'a>(var: &str, keys: impl IntoIterator<Item = &'a str>) -> Self {
        let mut map = Self::new();
        for key in keys {
            map.push(key, format!("{var}.{}", quote_identifier(key)));
        }
        map
    }

    /// Returns true if the map has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for PropertyMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (key, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {value}", quote_identifier(key))?;
        }
        f.write_str("}")
    }
}

fn map_clause(map: &PropertyMap) -> String {
    if map.is_empty() {
        String::new()
    } else {
        format!(" {map}")
    }
}

fn unwind(rows: &[PropertyMap]) -> String {
    let rendered: Vec<String> = rows.iter().map(ToString::to_string).collect();
    format!("UNWIND [{}] AS row", rendered.join(", "))
}

/// `UNWIND [...] AS row CREATE (:Label {...})`, one node per row.
#[must_use]
pub fn create_nodes<'a>(
    label: &str,
    properties: impl IntoIterator<Item = &'a str>,
    rows: &[PropertyMap],
) -> String {
    let body = PropertyMap::projection("row", properties);
    format!(
        "{} CREATE (:{}{})",
        unwind(rows),
        quote_identifier(label),
        map_clause(&body)
    )
}

/// Batched relationship creation between nodes matched by `id`.
///
/// Each row carries the endpoint ids under `src` and `dest` next to the
/// relationship's own properties.
#[must_use]
pub fn create_edges<'a>(
    relationship: &str,
    source_label: &str,
    target_label: &str,
    properties: impl IntoIterator<Item = &'a str>,
    rows: &[PropertyMap],
) -> String {
    let body = PropertyMap::projection("row", properties);
    format!(
        "{} MATCH (a:{} {{`id`: row.`src`}}), (b:{} {{`id`: row.`dest`}}) CREATE (a)-[:{}{}]->(b)",
        unwind(rows),
        quote_identifier(source_label),
        quote_identifier(target_label),
        quote_identifier(relationship),
        map_clause(&body)
    )
}

/// `CREATE (:Label {...})` for a single node.
#[must_use]
pub fn create_node(label: &str, properties: &PropertyMap) -> String {
    format!(
        "CREATE (:{}{})",
        quote_identifier(label),
        map_clause(properties)
    )
}

/// Single relationship between nodes matched by their `id` literals.
#[must_use]
pub fn create_edge(
    relationship: &str,
    source: (&str, &str),
    target: (&str, &str),
    properties: &PropertyMap,
) -> String {
    format!(
        "MATCH (a:{} {{`id`: {}}}), (b:{} {{`id`: {}}}) CREATE (a)-[:{}{}]->(b)",
        quote_identifier(source.0),
        quote_string(source.1),
        quote_identifier(target.0),
        quote_string(target.1),
        quote_identifier(relationship),
        map_clause(properties)
    )
}

/// Exact-match index on a node property.
#[must_use]
pub fn create_index(label: &str, property: &str) -> String {
    format!(
        "CREATE INDEX ON :{}({})",
        quote_identifier(label),
        quote_identifier(property)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("Warehouse"), "`Warehouse`");
        assert_eq!(quote_identifier("we`ird"), "`we``ird`");
    }

    #[test]
    fn test_quote_string_escapes() {
        assert_eq!(quote_string("plain"), "'plain'");
        assert_eq!(quote_string("it's"), r"'it\'s'");
        assert_eq!(quote_string(r"C:\dir"), r"'C:\\dir'");
    }

    #[test_case("42", StorageType::Integer, "42" ; "integer")]
    #[test_case("-7", StorageType::Long, "-7" ; "long")]
    #[test_case("12.5", StorageType::Double, "12.5" ; "double")]
    #[test_case("3", StorageType::Float, "3.0" ; "whole float")]
    #[test_case("1e+16", StorageType::Double, "1e16" ; "large exponent")]
    #[test_case("1e20", StorageType::Double, "1e20" ; "beyond i64")]
    #[test_case("-2.5E+21", StorageType::Float, "-2.5e21" ; "negative exponent form")]
    #[test_case("1e-9", StorageType::Double, "1e-9" ; "tiny")]
    #[test_case("1e3", StorageType::Double, "1000.0" ; "small exponent")]
    #[test_case("0", StorageType::Double, "0.0" ; "zero")]
    #[test_case("TRUE", StorageType::Boolean, "true" ; "boolean")]
    #[test_case("['a',1]", StorageType::Array, "['a',1]" ; "array")]
    #[test_case("w1", StorageType::Id, "'w1'" ; "id")]
    #[test_case("it's", StorageType::String, r"'it\'s'" ; "string")]
    fn test_literal(cell: &str, storage_type: StorageType, expected: &str) {
        assert_eq!(literal(cell, storage_type).unwrap().as_deref(), Some(expected));
    }

    #[test_case("abc", StorageType::Integer ; "text as integer")]
    #[test_case("1.5", StorageType::Long ; "fraction as long")]
    #[test_case("NaN", StorageType::Double ; "nan")]
    #[test_case("maybe", StorageType::Boolean ; "text as boolean")]
    #[test_case("a,b", StorageType::Array ; "unbracketed array")]
    fn test_literal_rejects(cell: &str, storage_type: StorageType) {
        assert!(literal(cell, storage_type).is_err());
    }

    #[test]
    fn test_literal_empty_is_none() {
        assert_eq!(literal("", StorageType::Integer).unwrap(), None);
    }

    #[test]
    fn test_create_nodes() {
        let mut row = PropertyMap::new();
        row.push("id", "'w1'");
        row.push("capacity", "12.5");
        let statement = create_nodes("Warehouse", ["id", "capacity"], &[row]);
        assert_eq!(
            statement,
            "UNWIND [{`id`: 'w1', `capacity`: 12.5}] AS row \
             CREATE (:`Warehouse` {`id`: row.`id`, `capacity`: row.`capacity`})"
        );
    }

    #[test]
    fn test_create_edges() {
        let mut row = PropertyMap::new();
        row.push("src", "'A'");
        row.push("dest", "'B'");
        row.push("id", "'R1'");
        let statement = create_edges("contains", "Warehouse", "Asset", ["id"], &[row]);
        assert_eq!(
            statement,
            "UNWIND [{`src`: 'A', `dest`: 'B', `id`: 'R1'}] AS row \
             MATCH (a:`Warehouse` {`id`: row.`src`}), (b:`Asset` {`id`: row.`dest`}) \
             CREATE (a)-[:`contains` {`id`: row.`id`}]->(b)"
        );
    }

    #[test]
    fn test_single_statements() {
        let mut props = PropertyMap::new();
        props.push("id", "'R1'");
        assert_eq!(
            create_edge("contains", ("Warehouse", "A"), ("Asset", "B"), &props),
            "MATCH (a:`Warehouse` {`id`: 'A'}), (b:`Asset` {`id`: 'B'}) \
             CREATE (a)-[:`contains` {`id`: 'R1'}]->(b)"
        );
        assert_eq!(create_node("Asset", &PropertyMap::new()), "CREATE (:`Asset`)");
        assert_eq!(create_index("Asset", "id"), "CREATE INDEX ON :`Asset`(`id`)");
    }
}
