//! Azure Digital Twins access.
//!
//! The pipeline only depends on two narrow traits:
//!
//! | Trait | Used by | Implementations |
//! |-------|---------|-----------------|
//! | [`TwinQuery`] | extractor | [`AdtClient`], [`InMemorySource`] |
//! | [`ModelCatalog`] | schema resolver | [`AdtClient`], [`InMemorySource`] |
//!
//! Neither retries; resilience is left to the HTTP layer.

mod auth;
mod client;
mod memory;

pub use auth::{ClientSecretCredential, DIGITAL_TWINS_SCOPE, StaticToken, TokenProvider};
pub use client::{API_VERSION, AdtClient};
pub use memory::InMemorySource;

use crate::Result;
use crate::models::ModelDefinition;
use serde_json::Value;

/// Lazy sequence of query results.
pub type QueryResults<'a> = Box<dyn Iterator<Item = Result<Value>> + 'a>;

/// Twin graph query interface.
pub trait TwinQuery {
    /// Runs a query and returns its results lazily.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Extraction`] if the query cannot be issued.
    /// Later pages may also yield extraction errors.
    fn query<'a>(&'a self, query: &'a str) -> Result<QueryResults<'a>>;
}

/// Model definition catalog.
pub trait ModelCatalog {
    /// Lists every model, decommissioned ones included.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::SchemaResolution`] if the catalog cannot be
    /// read or a definition cannot be decoded.
    fn list_models(&self) -> Result<Vec<ModelDefinition>>;
}
