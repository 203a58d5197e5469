//! Pipeline services.
//!
//! Schema resolution and extraction are independent of each other; both feed
//! projection, which feeds the materializer. [`TwinCacheConnector`] wires
//! them together for a run.

mod connector;
mod extractor;
mod projector;
mod schema_resolver;

pub use connector::{ConnectorSettings, RunReport, TwinCacheConnector};
pub use extractor::{
    Extractor, RELATIONSHIPS_QUERY, TWINS_QUERY, relationship_from_document, twin_from_document,
};
pub use projector::{RecordProjector, build_batch};
pub use schema_resolver::{SchemaResolver, primitive_storage_type};
