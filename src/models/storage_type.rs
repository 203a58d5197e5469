//! Storage type tags understood by the twin cache bulk loader.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Declared storage type of a column.
///
/// The tag is written into the annotated artifact header (`name:TAG`) and
/// drives value coercion when rows are loaded with schema enforcement.
///
/// | Tag | Cypher literal | Used for |
/// |-----|----------------|----------|
/// | `INTEGER`, `LONG` | integer | DTDL `integer`, `long`, integer enums |
/// | `DOUBLE`, `FLOAT` | float | DTDL `double`, `float` |
/// | `BOOLEAN` | `true`/`false` | DTDL `boolean` |
/// | `STRING` | quoted string | strings, temporal values, maps, objects |
/// | `ARRAY` | list | DTDL `Array` |
/// | `ID` | quoted string | twin identifier |
/// | `START_ID`, `END_ID` | quoted string | relationship endpoints |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StorageType {
    /// 64-bit signed integer.
    Integer,
    /// Double precision float.
    Double,
    /// Single precision float (stored as a double by the cache).
    Float,
    /// 64-bit signed integer.
    Long,
    /// Boolean.
    Boolean,
    /// UTF-8 string.
    String,
    /// Heterogeneous list.
    Array,
    /// Twin identifier.
    Id,
    /// Relationship source identifier.
    StartId,
    /// Relationship destination identifier.
    EndId,
}

impl StorageType {
    /// Returns every storage type.
    #[must_use]
    pub const fn all() -> [Self; 10] {
        [
            Self::Integer,
            Self::Double,
            Self::Float,
            Self::Long,
            Self::Boolean,
            Self::String,
            Self::Array,
            Self::Id,
            Self::StartId,
            Self::EndId,
        ]
    }

    /// Returns the header tag for this type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Double => "DOUBLE",
            Self::Float => "FLOAT",
            Self::Long => "LONG",
            Self::Boolean => "BOOLEAN",
            Self::String => "STRING",
            Self::Array => "ARRAY",
            Self::Id => "ID",
            Self::StartId => "START_ID",
            Self::EndId => "END_ID",
        }
    }

    /// Whether values of this type are whole numbers.
    #[must_use]
    pub const fn is_integral(&self) -> bool {
        matches!(self, Self::Integer | Self::Long)
    }

    /// Whether values of this type are floating point numbers.
    #[must_use]
    pub const fn is_floating(&self) -> bool {
        matches!(self, Self::Double | Self::Float)
    }

    /// Whether this type marks a referential column.
    #[must_use]
    pub const fn is_identifier(&self) -> bool {
        matches!(self, Self::Id | Self::StartId | Self::EndId)
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::all()
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::Config(format!("unknown storage type: {s}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_type_tags_roundtrip() {
        for t in StorageType::all() {
            assert_eq!(StorageType::from_str(t.as_str()).unwrap(), t);
        }
        assert_eq!(
            StorageType::from_str("start_id").unwrap(),
            StorageType::StartId
        );
        assert!(StorageType::from_str("GEO").is_err());
    }

    #[test]
    fn test_storage_type_serde_uses_tags() {
        let json = serde_json::to_string(&StorageType::EndId).unwrap();
        assert_eq!(json, "\"END_ID\"");
    }

    #[test]
    fn test_storage_type_classes() {
        assert!(StorageType::Long.is_integral());
        assert!(StorageType::Float.is_floating());
        assert!(StorageType::StartId.is_identifier());
        assert!(!StorageType::String.is_identifier());
    }
}
