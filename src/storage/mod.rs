//! Graph cache storage.
//!
//! The cache is a set of named graphs plus a metadata hash describing which
//! graph is the current generation. [`GraphStore`] is the seam between the
//! loaders and the backing server:
//!
//! - [`RedisGraphStore`]: `RedisGraph`-compatible server (`GRAPH.QUERY`)
//! - [`InMemoryGraphStore`]: statement recorder for tests
//!
//! [`GenerationManager`] layers rotation on top of any store.

// Allow significant_drop_tightening - holding the connection lock for a whole
// command is intended.
#![allow(clippy::significant_drop_tightening)]

pub mod cypher;
mod generation;
mod memory;
mod redis;

pub use generation::{Generation, GenerationManager, METADATA_SUFFIX, STAGING_SUFFIX};
pub use memory::InMemoryGraphStore;
pub use self::redis::RedisGraphStore;

use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;

/// Backing store of the twin cache.
///
/// Implementations must be thread-safe (`Send + Sync`).
pub trait GraphStore: Send + Sync {
    /// Runs a write statement against `graph`, creating the graph if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement is rejected or the server is
    /// unreachable.
    fn execute(&self, graph: &str, statement: &str) -> Result<()>;

    /// Deletes a graph.
    ///
    /// Returns `false` if the graph did not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletion fails.
    fn delete_graph(&self, graph: &str) -> Result<bool>;

    /// Renames a graph, replacing any graph already named `to`.
    ///
    /// # Errors
    ///
    /// Returns an error if `from` does not exist or the rename fails.
    fn rename_graph(&self, from: &str, to: &str) -> Result<()>;

    /// Lists graph names starting with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key space cannot be scanned.
    fn list_graphs(&self, prefix: &str) -> Result<Vec<String>>;

    /// Reads a metadata hash. Missing hashes read as empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the hash cannot be read.
    fn read_metadata(&self, key: &str) -> Result<HashMap<String, String>>;

    /// Writes fields of a metadata hash.
    ///
    /// # Errors
    ///
    /// Returns an error if the hash cannot be written.
    fn write_metadata(&self, key: &str, fields: &[(String, String)]) -> Result<()>;
}

impl<T: GraphStore + ?Sized> GraphStore for Arc<T> {
    fn execute(&self, graph: &str, statement: &str) -> Result<()> {
        (**self).execute(graph, statement)
    }

    fn delete_graph(&self, graph: &str) -> Result<bool> {
        (**self).delete_graph(graph)
    }

    fn rename_graph(&self, from: &str, to: &str) -> Result<()> {
        (**self).rename_graph(from, to)
    }

    fn list_graphs(&self, prefix: &str) -> Result<Vec<String>> {
        (**self).list_graphs(prefix)
    }

    fn read_metadata(&self, key: &str) -> Result<HashMap<String, String>> {
        (**self).read_metadata(key)
    }

    fn write_metadata(&self, key: &str, fields: &[(String, String)]) -> Result<()> {
        (**self).write_metadata(key, fields)
    }
}
