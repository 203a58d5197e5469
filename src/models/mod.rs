//! Data models for the connector.
//!
//! This module contains the data structures passed between pipeline stages:
//! DTDL model definitions, resolved type schemas, extracted records and
//! projected rows.

mod catalog;
pub mod dtdl;
mod records;
mod rows;
mod storage_type;

pub use catalog::{CatalogEntry, TypeCatalog, TypeSchema};
pub use dtdl::{
    ComplexSchema, ContentDeclaration, ModelDefinition, PropertyDeclaration, SchemaDescriptor,
    short_name,
};
pub use records::{
    DEST_FIELD, ExtractedGraph, ID_FIELD, RelationshipRecord, SOURCE_FIELD, TwinRecord,
};
pub use rows::{CacheBatch, Column, ProjectedRow, ProjectedTable, TableKind};
pub use storage_type::StorageType;
