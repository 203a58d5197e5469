//! Cache materialization.
//!
//! Writes a [`CacheBatch`] into a new cache generation using one of two
//! strategies:
//!
//! - [`StoreStrategy::BulkLoad`]: stage CSV artifacts, then load them in
//!   batched `UNWIND` statements.
//! - [`StoreStrategy::DirectQuery`]: one statement per row, no artifacts.
//!
//! Either way the run is all or nothing: the generation is only committed
//! after every table has loaded, otherwise it is dropped.

mod bulk;
mod direct;

use crate::config::StoreStrategy;
use crate::io::artifact;
use crate::models::{CacheBatch, Column};
use crate::storage::cypher::{PropertyMap, literal};
use crate::storage::{GenerationManager, GraphStore};
use crate::{Error, Result};
use std::path::PathBuf;
use std::time::Instant;
use tracing::instrument;

/// Loader settings.
#[derive(Debug, Clone)]
pub struct MaterializerSettings {
    /// Load strategy.
    pub strategy: StoreStrategy,
    /// Rows per `UNWIND` statement.
    pub batch_size: usize,
    /// Directory for staged artifacts.
    pub scratch_dir: PathBuf,
    /// Run identifier, used as the artifact subdirectory.
    pub run_id: String,
    /// Keep staged artifacts after a successful load.
    pub keep_artifacts: bool,
}

/// Outcome of a materialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    /// Graph now serving the cache.
    pub graph: String,
    /// Generation version published.
    pub version: u64,
    /// Strategy used.
    pub strategy: StoreStrategy,
    /// Twins written.
    pub nodes: usize,
    /// Relationships written.
    pub edges: usize,
    /// Statements sent to the store.
    pub statements: usize,
    /// Generations deleted by rotation.
    pub pruned: Vec<String>,
    /// Location of retained artifacts.
    pub artifacts: Option<PathBuf>,
}

/// Counters accumulated by a loader.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct LoadCounts {
    nodes: usize,
    edges: usize,
    statements: usize,
}

/// Writes batches into the twin cache.
pub struct BulkMaterializer<'a, S: GraphStore + ?Sized> {
    store: &'a S,
    cache_name: String,
    source_url: Option<String>,
    settings: MaterializerSettings,
}

impl<'a, S: GraphStore + ?Sized> BulkMaterializer<'a, S> {
    /// Creates a materializer for the cache `cache_name`.
    pub fn new(store: &'a S, cache_name: impl Into<String>, settings: MaterializerSettings) -> Self {
        Self {
            store,
            cache_name: cache_name.into(),
            source_url: None,
            settings,
        }
    }

    /// Records the source instance in the cache metadata.
    #[must_use]
    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    /// Loads `batch` into a new generation and publishes it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Load`] naming the failing artifact. The partially
    /// loaded generation is dropped and the cache metadata is unchanged.
    #[instrument(
        skip(self, batch),
        fields(
            operation = "cache.materialize",
            strategy = self.settings.strategy.as_str(),
            rotation = batch.rotation
        )
    )]
    pub fn materialize(&self, batch: &CacheBatch) -> Result<LoadReport> {
        let start = Instant::now();
        let mut manager = GenerationManager::new(self.store, &self.cache_name, batch.rotation);
        if let Some(url) = &self.source_url {
            manager = manager.with_source_url(url);
        }

        let generation = manager.begin()?;
        let loaded = match self.settings.strategy {
            StoreStrategy::BulkLoad => self.bulk_load(batch, &generation.graph),
            StoreStrategy::DirectQuery => direct::DirectWriter::new(self.store, &generation.graph)
                .write(batch)
                .map(|counts| (counts, None)),
        };

        let (counts, artifacts) = match loaded {
            Ok(loaded) => loaded,
            Err(e) => {
                tracing::error!(graph = %generation.graph, error = %e, "Load failed");
                manager.abort(&generation);
                return Err(e);
            },
        };
        let pruned = manager.commit(&generation)?;
        let graph = if batch.rotation == 0 {
            self.cache_name.clone()
        } else {
            generation.graph
        };

        tracing::info!(
            graph = %graph,
            nodes = counts.nodes,
            edges = counts.edges,
            statements = counts.statements,
            elapsed_ms = start.elapsed().as_millis(),
            "Materialized cache generation"
        );

        Ok(LoadReport {
            graph,
            version: generation.version,
            strategy: self.settings.strategy,
            nodes: counts.nodes,
            edges: counts.edges,
            statements: counts.statements,
            pruned,
            artifacts,
        })
    }

    fn bulk_load(&self, batch: &CacheBatch, graph: &str) -> Result<(LoadCounts, Option<PathBuf>)> {
        let dir = self.settings.scratch_dir.join(&self.settings.run_id);
        let artifacts = artifact::write_batch(batch, &dir)?;
        tracing::debug!(dir = %dir.display(), "Staged artifacts");

        let counts = bulk::BulkLoader::new(self.store, graph, self.settings.batch_size)
            .load(&artifacts)?;

        if self.settings.keep_artifacts {
            return Ok((counts, Some(dir)));
        }
        if let Err(e) = std::fs::remove_dir_all(&dir) {
            tracing::warn!(dir = %dir.display(), error = %e, "Failed to remove staged artifacts");
        }
        Ok((counts, None))
    }
}

/// Renders one row as a property map, enforcing each column's type.
///
/// Empty cells are left out of the map.
fn row_literals(
    columns: &[Column],
    cells: &[String],
    row: usize,
) -> std::result::Result<PropertyMap, String> {
    if cells.len() != columns.len() {
        return Err(format!(
            "row {row} has {} cells, expected {}",
            cells.len(),
            columns.len()
        ));
    }
    let mut map = PropertyMap::new();
    for (column, cell) in columns.iter().zip(cells) {
        let rendered = literal(cell, column.storage_type)
            .map_err(|cause| format!("row {row} column {}: {cause}", column.name))?;
        if let Some(value) = rendered {
            map.push(&column.name, value);
        }
    }
    Ok(map)
}

/// Error for a row that refers to a twin that was not loaded.
fn dangling(artifact: &str, row: usize, id: &str) -> Error {
    Error::load(
        artifact,
        format!("row {row}: relationship endpoint '{id}' is not a loaded twin"),
    )
}
