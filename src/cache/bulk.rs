//! Bulk loader for staged artifacts.
//!
//! Twin artifacts are loaded first. Their `ID` column builds the id → label
//! index used to match relationship endpoints, so relationship rows are
//! grouped per (source label, target label) pair before being sent.

use super::{LoadCounts, dangling, row_literals};
use crate::io::{Artifact, ArtifactReader, ArtifactSet};
use crate::models::{ID_FIELD, StorageType};
use crate::storage::GraphStore;
use crate::storage::cypher::{self, PropertyMap};
use crate::{Error, Result};
use std::collections::{BTreeMap, HashMap};

pub(super) struct BulkLoader<'a, S: GraphStore + ?Sized> {
    store: &'a S,
    graph: &'a str,
    batch_size: usize,
}

impl<'a, S: GraphStore + ?Sized> BulkLoader<'a, S> {
    pub(super) fn new(store: &'a S, graph: &'a str, batch_size: usize) -> Self {
        Self {
            store,
            graph,
            batch_size: batch_size.max(1),
        }
    }

    pub(super) fn load(&self, artifacts: &ArtifactSet) -> Result<LoadCounts> {
        let mut counts = LoadCounts::default();
        let mut labels = HashMap::new();

        for artifact in &artifacts.nodes {
            self.load_nodes(artifact, &mut labels, &mut counts)?;
        }
        for artifact in &artifacts.edges {
            self.load_edges(artifact, &labels, &mut counts)?;
        }
        Ok(counts)
    }

    fn send(&self, artifact: &Artifact, statement: &str, counts: &mut LoadCounts) -> Result<()> {
        self.store
            .execute(self.graph, statement)
            .map_err(|e| Error::load(artifact.name(), e))?;
        counts.statements += 1;
        Ok(())
    }

    fn load_nodes(
        &self,
        artifact: &Artifact,
        labels: &mut HashMap<String, String>,
        counts: &mut LoadCounts,
    ) -> Result<()> {
        let name = artifact.name();
        let mut reader = ArtifactReader::open(artifact)?;
        let columns = reader.columns().to_vec();
        if columns.first().map(|c| c.storage_type) != Some(StorageType::Id) {
            return Err(Error::load(&name, "first column must be declared as ID"));
        }
        let properties: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();

        if artifact.rows > 0 {
            self.send(
                artifact,
                &cypher::create_index(&artifact.type_name, ID_FIELD),
                counts,
            )?;
        }

        let mut pending = Vec::with_capacity(self.batch_size);
        let mut row = 0;
        while let Some(cells) = reader.next_row().map_err(|e| Error::load(&name, e))? {
            row += 1;
            let id = cells.first().map(String::as_str).unwrap_or_default();
            if id.is_empty() {
                return Err(Error::load(&name, format!("row {row}: empty twin id")));
            }
            let map = row_literals(&columns, &cells, row).map_err(|cause| Error::load(&name, cause))?;
            if let Some(previous) = labels.insert(id.to_string(), artifact.type_name.clone()) {
                return Err(Error::load(
                    &name,
                    format!("row {row}: twin id '{id}' already loaded as {previous}"),
                ));
            }
            pending.push(map);

            if pending.len() == self.batch_size {
                self.flush_nodes(artifact, &properties, &mut pending, counts)?;
            }
        }
        self.flush_nodes(artifact, &properties, &mut pending, counts)?;

        tracing::debug!(artifact = %name, rows = row, "Loaded twin artifact");
        Ok(())
    }

    fn flush_nodes(
        &self,
        artifact: &Artifact,
        properties: &[&str],
        pending: &mut Vec<PropertyMap>,
        counts: &mut LoadCounts,
    ) -> Result<()> {
        if pending.is_empty() {
            return Ok(());
        }
        let statement = cypher::create_nodes(
            &artifact.type_name,
            properties.iter().copied(),
            pending,
        );
        self.send(artifact, &statement, counts)?;
        counts.nodes += pending.len();
        pending.clear();
        Ok(())
    }

    fn load_edges(
        &self,
        artifact: &Artifact,
        labels: &HashMap<String, String>,
        counts: &mut LoadCounts,
    ) -> Result<()> {
        let name = artifact.name();
        let mut reader = ArtifactReader::open(artifact)?;
        let columns = reader.columns().to_vec();
        let position = |storage_type: StorageType| {
            columns
                .iter()
                .position(|c| c.storage_type == storage_type)
                .ok_or_else(|| Error::load(&name, format!("no {storage_type} column")))
        };
        let source_index = position(StorageType::StartId)?;
        let target_index = position(StorageType::EndId)?;
        let properties: Vec<&str> = columns
            .iter()
            .filter(|c| !matches!(c.storage_type, StorageType::StartId | StorageType::EndId))
            .map(|c| c.name.as_str())
            .collect();

        let mut groups: BTreeMap<(String, String), Vec<PropertyMap>> = BTreeMap::new();
        let mut row = 0;
        while let Some(cells) = reader.next_row().map_err(|e| Error::load(&name, e))? {
            row += 1;
            let map = row_literals(&columns, &cells, row).map_err(|cause| Error::load(&name, cause))?;
            let label_of = |id: &str| {
                labels
                    .get(id)
                    .cloned()
                    .ok_or_else(|| dangling(&name, row, id))
            };
            let key = (label_of(&cells[source_index])?, label_of(&cells[target_index])?);

            let pending = groups.entry(key.clone()).or_default();
            pending.push(map);
            if pending.len() == self.batch_size {
                let batch = std::mem::take(pending);
                self.flush_edges(artifact, (&key.0, &key.1), &properties, &batch, counts)?;
            }
        }
        for ((source, target), pending) in &groups {
            if !pending.is_empty() {
                self.flush_edges(artifact, (source, target), &properties, pending, counts)?;
            }
        }

        tracing::debug!(artifact = %name, rows = row, "Loaded relationship artifact");
        Ok(())
    }

    fn flush_edges(
        &self,
        artifact: &Artifact,
        (source, target): (&str, &str),
        properties: &[&str],
        pending: &[PropertyMap],
        counts: &mut LoadCounts,
    ) -> Result<()> {
        let statement = cypher::create_edges(
            &artifact.type_name,
            source,
            target,
            properties.iter().copied(),
            pending,
        );
        self.send(artifact, &statement, counts)?;
        counts.edges += pending.len();
        Ok(())
    }
}
