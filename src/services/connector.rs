//! End-to-end connector run.
//!
//! A run resolves the type catalog, extracts the twin graph, projects it and
//! materializes it into a new cache generation. Each phase is timed and
//! counted; a failure in any phase fails the whole run.

use super::{Extractor, RecordProjector, SchemaResolver, build_batch};
use crate::Result;
use crate::adt::{AdtClient, ClientSecretCredential, ModelCatalog, TwinQuery};
use crate::cache::{BulkMaterializer, MaterializerSettings};
use crate::config::{ConnectorConfig, StoreStrategy};
use crate::io::{ArtifactSet, write_batch};
use crate::models::{CacheBatch, ExtractedGraph, TypeCatalog};
use crate::storage::{GraphStore, RedisGraphStore};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Settings of a connector run.
#[derive(Debug, Clone)]
pub struct ConnectorSettings {
    /// Twin cache name.
    pub cache_name: String,
    /// Generations to keep (0 replaces in place).
    pub rotation: u32,
    /// Load strategy.
    pub strategy: StoreStrategy,
    /// Directory for staged artifacts.
    pub scratch_dir: PathBuf,
    /// Rows per bulk statement.
    pub batch_size: usize,
    /// Source instance, recorded in the cache metadata.
    pub source_url: String,
    /// Keep staged artifacts after a successful load.
    pub keep_artifacts: bool,
}

impl ConnectorSettings {
    /// Derives run settings from a validated configuration.
    #[must_use]
    pub fn from_config(config: &ConnectorConfig) -> Self {
        Self {
            cache_name: config.cache.name.clone(),
            rotation: config.cache.rotation,
            strategy: config.strategy,
            scratch_dir: config.scratch_dir.clone(),
            batch_size: config.batch_size,
            source_url: config.adt.url.clone(),
            keep_artifacts: false,
        }
    }
}

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Run identifier.
    pub run_id: String,
    /// Graph that was loaded.
    pub graph: String,
    /// Published generation version.
    pub version: u64,
    /// Twins loaded.
    pub twins: usize,
    /// Relationships loaded.
    pub relationships: usize,
    /// Twin types seen.
    pub twin_types: usize,
    /// Relationship types seen.
    pub relationship_types: usize,
    /// Statements sent to the cache.
    pub statements: usize,
    /// Generations removed by rotation.
    pub pruned: Vec<String>,
    /// Wall-clock duration.
    pub elapsed_ms: u64,
}

/// Connector from a twin source to a twin cache.
///
/// # Example
///
/// ```rust
/// use adt_twincache::adt::InMemorySource;
/// use adt_twincache::models::ModelDefinition;
/// use adt_twincache::services::ConnectorSettings;
/// use adt_twincache::{InMemoryGraphStore, StoreStrategy, TwinCacheConnector};
/// use serde_json::json;
///
/// let source = InMemorySource::new()
///     .with_model(ModelDefinition::new("dtmi:x:Asset;1").with_property("owner", "string"))
///     .with_twin(json!({"$dtId": "a1", "$metadata": {"$model": "dtmi:x:Asset;1"}, "owner": "acme"}));
/// let settings = ConnectorSettings {
///     cache_name: "plant".to_string(),
///     rotation: 1,
///     strategy: StoreStrategy::DirectQuery,
///     scratch_dir: std::env::temp_dir(),
///     batch_size: 100,
///     source_url: "https://adt.example.net".to_string(),
///     keep_artifacts: false,
/// };
///
/// let connector = TwinCacheConnector::new(source, InMemoryGraphStore::new(), settings);
/// let report = connector.run().unwrap();
/// assert_eq!(report.graph, "plant:1");
/// assert_eq!(report.twins, 1);
/// ```
pub struct TwinCacheConnector<Q, S> {
    source: Q,
    store: S,
    settings: ConnectorSettings,
    run_id: String,
}

impl TwinCacheConnector<AdtClient, RedisGraphStore> {
    /// Builds a connector for the configured Digital Twins instance and
    /// `RedisGraph` cache.
    ///
    /// No network call is made until the run starts.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client or the cache URL cannot be built.
    pub fn connect(config: &ConnectorConfig) -> Result<Self> {
        let http = AdtClient::http_client()?;
        let credential = Arc::new(ClientSecretCredential::new(&config.adt, http.clone()));
        let source = AdtClient::new(&config.adt.url, http, credential);
        let store = RedisGraphStore::from_config(&config.cache)?;
        Ok(Self::new(source, store, ConnectorSettings::from_config(config)))
    }
}

impl<Q, S> TwinCacheConnector<Q, S>
where
    Q: TwinQuery + ModelCatalog,
    S: GraphStore,
{
    /// Creates a connector with a fresh run identifier.
    pub fn new(source: Q, store: S, settings: ConnectorSettings) -> Self {
        Self {
            source,
            store,
            settings,
            run_id: uuid::Uuid::now_v7().to_string(),
        }
    }

    /// Overrides the settings.
    #[must_use]
    pub fn with_settings(mut self, settings: ConnectorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Run identifier, also the artifact subdirectory.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Run settings.
    #[must_use]
    pub const fn settings(&self) -> &ConnectorSettings {
        &self.settings
    }

    /// The cache store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Resolves the type catalog from the source's models.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::SchemaResolution`] on any resolution failure.
    pub fn resolve_schema(&self) -> Result<TypeCatalog> {
        timed("resolve", || SchemaResolver::new().resolve_catalog(&self.source))
    }

    /// Extracts every twin and relationship.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Extraction`] if a query fails.
    pub fn extract(&self) -> Result<ExtractedGraph> {
        let graph = timed("extract", || Extractor::new(&self.source).extract())?;
        metrics::counter!("twin_cache_records_extracted_total", "kind" => "twin")
            .increment(graph.twin_count() as u64);
        metrics::counter!("twin_cache_records_extracted_total", "kind" => "relationship")
            .increment(graph.relationship_count() as u64);
        Ok(graph)
    }

    /// Resolves, extracts and projects, without touching the cache.
    ///
    /// The catalog is resolved first so an unusable model set fails before
    /// any twin is read.
    ///
    /// # Errors
    ///
    /// Returns the first resolution, extraction or projection error.
    pub fn prepare(&self) -> Result<CacheBatch> {
        let catalog = self.resolve_schema()?;
        let extracted = self.extract()?;
        let batch = timed("project", || {
            build_batch(
                &catalog,
                &extracted,
                self.settings.rotation,
                &RecordProjector::new(),
            )
        })?;
        metrics::counter!("twin_cache_rows_projected_total", "kind" => "twin")
            .increment(batch.twin_rows() as u64);
        metrics::counter!("twin_cache_rows_projected_total", "kind" => "relationship")
            .increment(batch.relationship_rows() as u64);
        Ok(batch)
    }

    /// Writes the CSV artifacts of a fresh projection to `dir` without
    /// loading them.
    ///
    /// # Errors
    ///
    /// Returns the first pipeline error or [`crate::Error::Load`] if an
    /// artifact cannot be written.
    #[instrument(skip(self), fields(operation = "connector.export", run_id = %self.run_id))]
    pub fn export(&self, dir: &Path) -> Result<ArtifactSet> {
        let batch = self.prepare()?;
        let artifacts = timed("export", || write_batch(&batch, dir))?;
        tracing::info!(
            dir = %dir.display(),
            artifacts = artifacts.iter().count(),
            "Exported artifacts"
        );
        Ok(artifacts)
    }

    /// Performs a full resync.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing phase. The cache keeps serving
    /// the previous generation.
    #[instrument(
        skip(self),
        fields(
            operation = "connector.run",
            run_id = %self.run_id,
            cache = %self.settings.cache_name,
            strategy = self.settings.strategy.as_str()
        )
    )]
    pub fn run(&self) -> Result<RunReport> {
        let start = Instant::now();
        tracing::info!(rotation = self.settings.rotation, "Run start");

        let result = self.run_phases(start);

        let (status, error_kind) = match &result {
            Ok(_) => ("success", "none"),
            Err(e) => ("error", e.kind()),
        };
        metrics::counter!(
            "twin_cache_runs_total",
            "status" => status,
            "error_kind" => error_kind
        )
        .increment(1);
        metrics::histogram!("twin_cache_run_duration_ms", "status" => status)
            .record(start.elapsed().as_secs_f64() * 1000.0);

        match &result {
            Ok(report) => tracing::info!(
                graph = %report.graph,
                twins = report.twins,
                relationships = report.relationships,
                elapsed_ms = report.elapsed_ms,
                "Run complete"
            ),
            Err(e) => tracing::error!(error = %e, kind = e.kind(), "Run failed"),
        }
        result
    }

    fn run_phases(&self, start: Instant) -> Result<RunReport> {
        let batch = self.prepare()?;

        let materializer = BulkMaterializer::new(
            &self.store,
            &self.settings.cache_name,
            MaterializerSettings {
                strategy: self.settings.strategy,
                batch_size: self.settings.batch_size,
                scratch_dir: self.settings.scratch_dir.clone(),
                run_id: self.run_id.clone(),
                keep_artifacts: self.settings.keep_artifacts,
            },
        )
        .with_source_url(&self.settings.source_url);
        let load = timed("load", || materializer.materialize(&batch))?;

        metrics::counter!("twin_cache_rows_loaded_total", "kind" => "twin")
            .increment(load.nodes as u64);
        metrics::counter!("twin_cache_rows_loaded_total", "kind" => "relationship")
            .increment(load.edges as u64);

        Ok(RunReport {
            run_id: self.run_id.clone(),
            graph: load.graph,
            version: load.version,
            twins: load.nodes,
            relationships: load.edges,
            twin_types: batch.twins.len(),
            relationship_types: batch.relationships.len(),
            statements: load.statements,
            pruned: load.pruned,
            elapsed_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        })
    }
}

/// Runs one phase and records its duration.
fn timed<T>(phase: &'static str, f: impl FnOnce() -> Result<T>) -> Result<T> {
    let start = Instant::now();
    let result = f();
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    metrics::histogram!("twin_cache_phase_duration_ms", "phase" => phase).record(elapsed_ms);
    tracing::debug!(phase, elapsed_ms, ok = result.is_ok(), "Phase finished");
    result
}
