//! # ADT Twin Cache
//!
//! Resynchronizes an Azure Digital Twins instance into a RedisGraph twin cache.
//!
//! Each run performs a full resync:
//!
//! 1. **Schema resolution**: DTDL models are read from the model catalog and
//!    flattened into per-type field schemas (inheritance included).
//! 2. **Extraction**: all twins and relationships are queried and grouped by
//!    type, with reserved `$` fields normalized to `id`, `src` and `dest`.
//! 3. **Projection**: records are shaped into rectangular, typed rows with the
//!    referential columns first.
//! 4. **Materialization**: rows are staged as CSV artifacts and bulk loaded
//!    (or written directly) into a new cache generation.
//!
//! ## Example
//!
//! ```rust,ignore
//! use adt_twincache::{ConnectorConfig, TwinCacheConnector};
//!
//! let config = ConnectorConfig::from_env()?;
//! let report = TwinCacheConnector::connect(&config)?.run()?;
//! println!("loaded {} twins into {}", report.twins, report.graph);
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod adt;
pub mod cache;
pub mod config;
pub mod io;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;

pub use cache::{BulkMaterializer, LoadReport};
pub use config::{ConnectorConfig, StoreStrategy, TwinCacheConfig};
pub use models::{
    CacheBatch, ExtractedGraph, ProjectedRow, ProjectedTable, RelationshipRecord, StorageType,
    TwinRecord, TypeCatalog, TypeSchema,
};
pub use services::{
    Extractor, RecordProjector, RunReport, SchemaResolver, TwinCacheConnector, build_batch,
};
pub use storage::{GraphStore, InMemoryGraphStore, RedisGraphStore};

/// Error type for connector runs.
///
/// Every variant is terminal for the run. There is no local recovery and no
/// partial success.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `SchemaResolution` | Unknown DTDL schema, missing parent model, inheritance cycle, model listing fails |
/// | `Extraction` | Twin/relationship query fails (transport, auth, malformed payload) |
/// | `Projection` | A record carries a field the type schema cannot resolve |
/// | `Load` | Writing or bulk loading an artifact into the cache fails |
/// | `Config` | Required configuration keys are missing or malformed |
/// | `OperationFailed` | Ambient I/O such as logging setup or scratch directories |
#[derive(Debug, ThisError)]
pub enum Error {
    /// A model could not be resolved into a type schema.
    ///
    /// Raised when:
    /// - A property declares a schema name outside the storage type table
    /// - A model extends a parent that is not in the catalog
    /// - The `extends` graph contains a cycle
    /// - The model catalog cannot be listed or decoded
    #[error("schema resolution failed for '{model}': {cause}")]
    SchemaResolution {
        /// Model identifier (or catalog operation) that failed.
        model: String,
        /// The underlying cause.
        cause: String,
    },

    /// Querying the twin graph failed.
    ///
    /// Raised when:
    /// - The token endpoint rejects the credential
    /// - The query endpoint returns a non-success status or is unreachable
    /// - A twin lacks `$dtId` or `$metadata.$model`
    /// - A relationship lacks one of its reserved endpoint fields
    #[error("extraction failed for query '{query}': {cause}")]
    Extraction {
        /// The query being consumed.
        query: String,
        /// The underlying cause.
        cause: String,
    },

    /// A record could not be projected onto its type schema.
    #[error("projection failed for type '{type_name}', column '{column}': {cause}")]
    Projection {
        /// Twin or relationship type name.
        type_name: String,
        /// Column without a resolvable storage type.
        column: String,
        /// The underlying cause.
        cause: String,
    },

    /// Writing or loading an artifact into the cache failed.
    #[error("load failed for artifact '{artifact}': {cause}")]
    Load {
        /// Artifact (or graph) being written.
        artifact: String,
        /// The underlying cause.
        cause: String,
    },

    /// Configuration is incomplete or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// An ambient operation failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Builds a schema resolution error.
    pub fn schema(model: impl Into<String>, cause: impl ToString) -> Self {
        Self::SchemaResolution {
            model: model.into(),
            cause: cause.to_string(),
        }
    }

    /// Builds an extraction error.
    pub fn extraction(query: impl Into<String>, cause: impl ToString) -> Self {
        Self::Extraction {
            query: query.into(),
            cause: cause.to_string(),
        }
    }

    /// Builds a load error.
    pub fn load(artifact: impl Into<String>, cause: impl ToString) -> Self {
        Self::Load {
            artifact: artifact.into(),
            cause: cause.to_string(),
        }
    }

    /// Builds an ambient operation error.
    pub fn operation(operation: impl Into<String>, cause: impl ToString) -> Self {
        Self::OperationFailed {
            operation: operation.into(),
            cause: cause.to_string(),
        }
    }

    /// Short kind label used for metrics and logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SchemaResolution { .. } => "schema_resolution",
            Self::Extraction { .. } => "extraction",
            Self::Projection { .. } => "projection",
            Self::Load { .. } => "load",
            Self::Config(_) => "config",
            Self::OperationFailed { .. } => "operation_failed",
        }
    }
}

/// Result type alias for connector operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::schema("dtmi:com:example:Site;1", "unknown schema 'geo'");
        assert_eq!(
            err.to_string(),
            "schema resolution failed for 'dtmi:com:example:Site;1': unknown schema 'geo'"
        );

        let err = Error::Projection {
            type_name: "Warehouse".to_string(),
            column: "colour".to_string(),
            cause: "no schema entry".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "projection failed for type 'Warehouse', column 'colour': no schema entry"
        );

        let err = Error::load("nodes/Warehouse.csv", "connection refused");
        assert_eq!(
            err.to_string(),
            "load failed for artifact 'nodes/Warehouse.csv': connection refused"
        );
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(Error::extraction("SELECT 1", "x").kind(), "extraction");
        assert_eq!(Error::Config("x".to_string()).kind(), "config");
        assert_eq!(Error::operation("x", "y").kind(), "operation_failed");
    }
}
