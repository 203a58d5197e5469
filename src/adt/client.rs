//! Azure Digital Twins data-plane client.

use super::auth::TokenProvider;
use super::{ModelCatalog, QueryResults, TwinQuery};
use crate::models::ModelDefinition;
use crate::{Error, Result};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// Data-plane API version.
pub const API_VERSION: &str = "2020-10-31";

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
    #[serde(rename = "continuationToken", skip_serializing_if = "Option::is_none")]
    continuation_token: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct QueryPage {
    #[serde(default)]
    value: Vec<Value>,
    #[serde(rename = "continuationToken", default)]
    continuation_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelPage {
    #[serde(default)]
    value: Vec<ModelData>,
    #[serde(rename = "nextLink", default)]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelData {
    id: String,
    #[serde(default)]
    model: Option<Value>,
    #[serde(default)]
    decommissioned: bool,
}

impl ModelPage {
    /// Decodes every definition on the page.
    ///
    /// Decommissioned models stay: existing twins and derived models still
    /// depend on their declarations.
    fn definitions(self) -> Result<Vec<ModelDefinition>> {
        self.value
            .into_iter()
            .map(|data| {
                if data.decommissioned {
                    tracing::debug!(model = %data.id, "Resolving decommissioned model");
                }
                let document = data.model.ok_or_else(|| {
                    Error::schema(&data.id, "model listing did not include the definition")
                })?;
                ModelDefinition::from_dtdl(&document)
            })
            .collect()
    }
}

/// Blocking client for the Digital Twins query and model APIs.
pub struct AdtClient {
    endpoint: String,
    http: reqwest::blocking::Client,
    credential: Arc<dyn TokenProvider>,
}

impl AdtClient {
    /// Creates a client for an instance URL.
    #[must_use]
    pub fn new(
        endpoint: impl Into<String>,
        http: reqwest::blocking::Client,
        credential: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            http,
            credential,
        }
    }

    /// Builds the HTTP client shared by the query client and the credential.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn http_client() -> Result<reqwest::blocking::Client> {
        reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::operation("http_client_build", e))
    }

    fn query_url(&self) -> String {
        format!("{}/query?api-version={API_VERSION}", self.endpoint)
    }

    fn models_url(&self) -> String {
        format!(
            "{}/models?api-version={API_VERSION}&includeModelDefinition=true",
            self.endpoint
        )
    }

    fn fetch_query_page(&self, query: &str, continuation: Option<&str>) -> Result<QueryPage> {
        let token = self
            .credential
            .token()
            .map_err(|e| Error::extraction(query, e))?;
        let response = self
            .http
            .post(self.query_url())
            .bearer_auth(token.expose_secret())
            .json(&QueryRequest {
                query,
                continuation_token: continuation,
            })
            .send()
            .map_err(|e| Error::extraction(query, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(Error::extraction(
                query,
                format!("API returned status: {status} - {body}"),
            ));
        }

        response.json().map_err(|e| Error::extraction(query, e))
    }

    fn fetch_model_page(&self, url: &str) -> Result<ModelPage> {
        let token = self
            .credential
            .token()
            .map_err(|e| Error::schema("list_models", e))?;
        let response = self
            .http
            .get(url)
            .bearer_auth(token.expose_secret())
            .send()
            .map_err(|e| Error::schema("list_models", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(Error::schema(
                "list_models",
                format!("API returned status: {status} - {body}"),
            ));
        }

        response.json().map_err(|e| Error::schema("list_models", e))
    }
}

impl TwinQuery for AdtClient {
    fn query<'a>(&'a self, query: &'a str) -> Result<QueryResults<'a>> {
        let first = self.fetch_query_page(query, None)?;
        Ok(Box::new(QueryPager {
            client: self,
            query,
            buffer: first.value.into(),
            continuation: first.continuation_token,
            failed: false,
        }))
    }
}

impl ModelCatalog for AdtClient {
    fn list_models(&self) -> Result<Vec<ModelDefinition>> {
        let mut models = Vec::new();
        let mut next = Some(self.models_url());

        while let Some(url) = next {
            let mut page = self.fetch_model_page(&url)?;
            next = page.next_link.take();
            models.extend(page.definitions()?);
        }

        Ok(models)
    }
}

/// Lazily follows continuation tokens of a query.
struct QueryPager<'a> {
    client: &'a AdtClient,
    query: &'a str,
    buffer: VecDeque<Value>,
    continuation: Option<String>,
    failed: bool,
}

impl Iterator for QueryPager<'_> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok(item));
            }
            if self.failed {
                return None;
            }
            let token = self.continuation.take()?;
            match self.client.fetch_query_page(self.query, Some(&token)) {
                Ok(page) => {
                    self.buffer = page.value.into();
                    self.continuation = page.continuation_token;
                },
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                },
            }
        }
    }
}
