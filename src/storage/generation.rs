//! Cache generations and rotation.
//!
//! Every run loads into a fresh graph and only becomes visible once the
//! metadata hash `{name}MetaData` is advanced to it:
//!
//! | rotation | load target | on commit |
//! |----------|-------------|-----------|
//! | `0` | `{name}:staging` | renamed over `{name}` |
//! | `n >= 1` | `{name}:{lastVersion + 1}` | metadata advanced, generations older than the newest `n` deleted |
//!
//! An aborted run deletes its target graph and leaves the metadata as it was.

use super::GraphStore;
use crate::{Error, Result};
use chrono::Utc;

/// Suffix of the metadata hash key.
pub const METADATA_SUFFIX: &str = "MetaData";

/// Version suffix of the staging graph used with rotation 0.
pub const STAGING_SUFFIX: &str = "staging";

const LAST_VERSION: &str = "lastVersion";
const GRAPH_NAME: &str = "graphName";
const GRAPH_ROTATION: &str = "graphRotation";
const LAST_MODIFIED: &str = "lastModifiedDate";
const SOURCE_URL: &str = "sourceUrl";

/// Target of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    /// Graph the run loads into.
    pub graph: String,
    /// Version the metadata advances to on commit.
    pub version: u64,
}

/// Opens, commits and aborts cache generations.
pub struct GenerationManager<'a, S: GraphStore + ?Sized> {
    store: &'a S,
    name: String,
    rotation: u32,
    source_url: Option<String>,
}

impl<'a, S: GraphStore + ?Sized> GenerationManager<'a, S> {
    /// Creates a manager for the cache `name`.
    pub fn new(store: &'a S, name: impl Into<String>, rotation: u32) -> Self {
        Self {
            store,
            name: name.into(),
            rotation,
            source_url: None,
        }
    }

    /// Records the source instance in the metadata on commit.
    #[must_use]
    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    /// Key of the metadata hash.
    #[must_use]
    pub fn metadata_key(&self) -> String {
        format!("{}{METADATA_SUFFIX}", self.name)
    }

    /// Version of the current generation, `0` before the first commit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Load`] if the metadata cannot be read or holds a
    /// non-numeric version.
    pub fn last_version(&self) -> Result<u64> {
        let key = self.metadata_key();
        let metadata = self
            .store
            .read_metadata(&key)
            .map_err(|e| Error::load(&key, e))?;
        metadata.get(LAST_VERSION).map_or(Ok(0), |value| {
            value
                .parse()
                .map_err(|_| Error::load(&key, format!("invalid {LAST_VERSION}: '{value}'")))
        })
    }

    /// Opens the next generation.
    ///
    /// A leftover graph with the target name, e.g. from a crashed run, is
    /// deleted first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Load`] if the metadata cannot be read or the leftover
    /// graph cannot be deleted.
    pub fn begin(&self) -> Result<Generation> {
        let version = self.last_version()? + 1;
        let graph = if self.rotation == 0 {
            format!("{}:{STAGING_SUFFIX}", self.name)
        } else {
            format!("{}:{version}", self.name)
        };

        if self
            .store
            .delete_graph(&graph)
            .map_err(|e| Error::load(&graph, e))?
        {
            tracing::warn!(graph = %graph, "Deleted leftover graph from an earlier run");
        }

        tracing::info!(graph = %graph, version, rotation = self.rotation, "Opened generation");
        Ok(Generation { graph, version })
    }

    /// Publishes a fully loaded generation.
    ///
    /// Returns the names of the generations pruned afterwards. Pruning is
    /// best effort and never fails the commit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Load`] if the generation cannot be published.
    pub fn commit(&self, generation: &Generation) -> Result<Vec<String>> {
        let published = if self.rotation == 0 {
            self.replace_live(generation)?;
            self.name.clone()
        } else {
            generation.graph.clone()
        };

        let mut fields = vec![
            (LAST_VERSION.to_string(), generation.version.to_string()),
            (GRAPH_NAME.to_string(), published.clone()),
            (GRAPH_ROTATION.to_string(), self.rotation.to_string()),
            (LAST_MODIFIED.to_string(), Utc::now().to_rfc3339()),
        ];
        if let Some(url) = &self.source_url {
            fields.push((SOURCE_URL.to_string(), url.clone()));
        }
        let key = self.metadata_key();
        self.store
            .write_metadata(&key, &fields)
            .map_err(|e| Error::load(&key, e))?;

        tracing::info!(graph = %published, version = generation.version, "Committed generation");

        if self.rotation == 0 {
            return Ok(Vec::new());
        }
        Ok(self.prune(generation.version))
    }

    /// Drops a generation that failed to load.
    pub fn abort(&self, generation: &Generation) {
        match self.store.delete_graph(&generation.graph) {
            Ok(_) => {
                tracing::warn!(graph = %generation.graph, "Dropped partially loaded generation");
            },
            Err(e) => {
                tracing::error!(
                    graph = %generation.graph,
                    error = %e,
                    "Failed to drop partially loaded generation"
                );
            },
        }
    }

    fn replace_live(&self, generation: &Generation) -> Result<()> {
        let staged = self
            .store
            .list_graphs(&generation.graph)
            .map_err(|e| Error::load(&generation.graph, e))?
            .contains(&generation.graph);

        if staged {
            self.store
                .rename_graph(&generation.graph, &self.name)
                .map_err(|e| Error::load(&generation.graph, e))
        } else {
            // Nothing was written, so the replacement is an empty cache.
            self.store
                .delete_graph(&self.name)
                .map(|_| ())
                .map_err(|e| Error::load(&self.name, e))
        }
    }

    /// Deletes numbered generations that fell out of the rotation window.
    fn prune(&self, current: u64) -> Vec<String> {
        let prefix = format!("{}:", self.name);
        let graphs = match self.store.list_graphs(&prefix) {
            Ok(graphs) => graphs,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list generations for pruning");
                return Vec::new();
            },
        };

        let mut pruned = Vec::new();
        for graph in graphs {
            let Some(version) = graph
                .strip_prefix(&prefix)
                .and_then(|suffix| suffix.parse::<u64>().ok())
            else {
                continue;
            };
            if version + u64::from(self.rotation) > current {
                continue;
            }
            match self.store.delete_graph(&graph) {
                Ok(_) => {
                    tracing::debug!(graph = %graph, "Pruned generation");
                    pruned.push(graph);
                },
                Err(e) => tracing::warn!(graph = %graph, error = %e, "Failed to prune generation"),
            }
        }
        pruned
    }
}
