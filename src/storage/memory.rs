//! In-memory graph store for testing.
//!
//! Records every statement per graph instead of interpreting it, so tests can
//! assert on exactly what a loader sent. Failures can be injected by
//! statement substring.

use super::GraphStore;
use crate::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

/// In-memory graph store.
///
/// # Example
///
/// ```rust
/// use adt_twincache::storage::{GraphStore, InMemoryGraphStore};
///
/// let store = InMemoryGraphStore::new();
/// store.execute("plant:1", "CREATE (:`Asset`)").unwrap();
/// assert_eq!(store.statements("plant:1").len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    graphs: RwLock<BTreeMap<String, Vec<String>>>,
    metadata: RwLock<HashMap<String, HashMap<String, String>>>,
    fail_on: Option<String>,
}

impl InMemoryGraphStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every statement containing `fragment` fail.
    #[must_use]
    pub fn failing_on(mut self, fragment: impl Into<String>) -> Self {
        self.fail_on = Some(fragment.into());
        self
    }

    /// Statements executed against `graph`, in order.
    #[must_use]
    pub fn statements(&self, graph: &str) -> Vec<String> {
        self.graphs
            .read()
            .map(|graphs| graphs.get(graph).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Names of all existing graphs, sorted.
    #[must_use]
    pub fn graph_names(&self) -> Vec<String> {
        self.graphs
            .read()
            .map(|graphs| graphs.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns true if `graph` exists.
    #[must_use]
    pub fn contains_graph(&self, graph: &str) -> bool {
        self.graphs
            .read()
            .map(|graphs| graphs.contains_key(graph))
            .unwrap_or(false)
    }

    /// Creates an empty graph, e.g. to simulate an orphan from a crashed run.
    pub fn insert_graph(&self, graph: impl Into<String>) {
        if let Ok(mut graphs) = self.graphs.write() {
            graphs.entry(graph.into()).or_default();
        }
    }

    fn lock_error(e: impl ToString) -> Error {
        Error::operation("memory_store_lock", e)
    }
}

impl GraphStore for InMemoryGraphStore {
    fn execute(&self, graph: &str, statement: &str) -> Result<()> {
        if let Some(fragment) = &self.fail_on {
            if statement.contains(fragment.as_str()) {
                return Err(Error::operation(
                    "graph_query",
                    format!("injected failure on '{fragment}'"),
                ));
            }
        }
        let mut graphs = self.graphs.write().map_err(Self::lock_error)?;
        graphs
            .entry(graph.to_string())
            .or_default()
            .push(statement.to_string());
        Ok(())
    }

    fn delete_graph(&self, graph: &str) -> Result<bool> {
        let mut graphs = self.graphs.write().map_err(Self::lock_error)?;
        Ok(graphs.remove(graph).is_some())
    }

    fn rename_graph(&self, from: &str, to: &str) -> Result<()> {
        let mut graphs = self.graphs.write().map_err(Self::lock_error)?;
        let statements = graphs
            .remove(from)
            .ok_or_else(|| Error::operation("graph_rename", format!("no such graph: {from}")))?;
        graphs.insert(to.to_string(), statements);
        Ok(())
    }

    fn list_graphs(&self, prefix: &str) -> Result<Vec<String>> {
        let graphs = self.graphs.read().map_err(Self::lock_error)?;
        Ok(graphs
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn read_metadata(&self, key: &str) -> Result<HashMap<String, String>> {
        let metadata = self.metadata.read().map_err(Self::lock_error)?;
        Ok(metadata.get(key).cloned().unwrap_or_default())
    }

    fn write_metadata(&self, key: &str, fields: &[(String, String)]) -> Result<()> {
        let mut metadata = self.metadata.write().map_err(Self::lock_error)?;
        let hash = metadata.entry(key.to_string()).or_default();
        for (field, value) in fields {
            hash.insert(field.clone(), value.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_records_statements() {
        let store = InMemoryGraphStore::new();
        store.execute("g", "CREATE (:`A`)").unwrap();
        store.execute("g", "CREATE (:`B`)").unwrap();
        assert_eq!(store.statements("g"), vec!["CREATE (:`A`)", "CREATE (:`B`)"]);
        assert!(store.statements("other").is_empty());
    }

    #[test]
    fn test_failure_injection() {
        let store = InMemoryGraphStore::new().failing_on("`B`");
        assert!(store.execute("g", "CREATE (:`A`)").is_ok());
        assert!(store.execute("g", "CREATE (:`B`)").is_err());
        assert_eq!(store.statements("g").len(), 1);
    }

    #[test]
    fn test_rename_replaces_target() {
        let store = InMemoryGraphStore::new();
        store.execute("plant", "old").unwrap();
        store.execute("plant:staging", "new").unwrap();
        store.rename_graph("plant:staging", "plant").unwrap();
        assert_eq!(store.statements("plant"), vec!["new"]);
        assert!(!store.contains_graph("plant:staging"));
        assert!(store.rename_graph("missing", "plant").is_err());
    }

    #[test]
    fn test_list_and_delete() {
        let store = InMemoryGraphStore::new();
        store.insert_graph("plant:1");
        store.insert_graph("plant:2");
        store.insert_graph("other:1");
        assert_eq!(store.list_graphs("plant:").unwrap(), vec!["plant:1", "plant:2"]);
        assert!(store.delete_graph("plant:1").unwrap());
        assert!(!store.delete_graph("plant:1").unwrap());
    }

    #[test]
    fn test_metadata_merges_fields() {
        let store = InMemoryGraphStore::new();
        assert!(store.read_metadata("m").unwrap().is_empty());
        store
            .write_metadata("m", &[("a".to_string(), "1".to_string())])
            .unwrap();
        store
            .write_metadata("m", &[("b".to_string(), "2".to_string())])
            .unwrap();
        let hash = store.read_metadata("m").unwrap();
        assert_eq!(hash.get("a").map(String::as_str), Some("1"));
        assert_eq!(hash.get("b").map(String::as_str), Some("2"));
    }
}
