//! In-memory twin source for testing and offline runs.

use super::{ModelCatalog, QueryResults, TwinQuery};
use crate::models::ModelDefinition;
use crate::{Error, Result};
use serde_json::Value;

/// Twin source backed by fixed documents.
///
/// Recognizes the two queries the extractor issues; any other query fails.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    models: Vec<ModelDefinition>,
    twins: Vec<Value>,
    relationships: Vec<Value>,
    failure: Option<String>,
}

impl InMemorySource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a model.
    #[must_use]
    pub fn with_model(mut self, model: ModelDefinition) -> Self {
        self.models.push(model);
        self
    }

    /// Adds a twin document.
    #[must_use]
    pub fn with_twin(mut self, twin: Value) -> Self {
        self.twins.push(twin);
        self
    }

    /// Adds a relationship document.
    #[must_use]
    pub fn with_relationship(mut self, relationship: Value) -> Self {
        self.relationships.push(relationship);
        self
    }

    /// Makes every query and model listing fail with the given cause.
    #[must_use]
    pub fn failing(mut self, cause: impl Into<String>) -> Self {
        self.failure = Some(cause.into());
        self
    }
}

impl TwinQuery for InMemorySource {
    fn query<'a>(&'a self, query: &'a str) -> Result<QueryResults<'a>> {
        if let Some(cause) = &self.failure {
            return Err(Error::extraction(query, cause));
        }
        let source = match query.trim().to_lowercase().as_str() {
            "select * from digitaltwins" => &self.twins,
            "select * from relationships" => &self.relationships,
            _ => return Err(Error::extraction(query, "unsupported query")),
        };
        Ok(Box::new(source.iter().cloned().map(Ok)))
    }
}

impl ModelCatalog for InMemorySource {
    fn list_models(&self) -> Result<Vec<ModelDefinition>> {
        if let Some(cause) = &self.failure {
            return Err(Error::schema("list_models", cause));
        }
        Ok(self.models.clone())
    }
}
