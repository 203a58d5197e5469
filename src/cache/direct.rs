//! Row-at-a-time writer.

use super::{LoadCounts, dangling, row_literals};
use crate::models::{CacheBatch, Column, ID_FIELD, ProjectedTable, StorageType};
use crate::storage::GraphStore;
use crate::storage::cypher;
use crate::{Error, Result};
use std::collections::HashMap;

pub(super) struct DirectWriter<'a, S: GraphStore + ?Sized> {
    store: &'a S,
    graph: &'a str,
}

impl<'a, S: GraphStore + ?Sized> DirectWriter<'a, S> {
    pub(super) const fn new(store: &'a S, graph: &'a str) -> Self {
        Self { store, graph }
    }

    pub(super) fn write(&self, batch: &CacheBatch) -> Result<LoadCounts> {
        let mut counts = LoadCounts::default();
        let mut labels: HashMap<&str, &str> = HashMap::new();

        for table in &batch.twins {
            self.write_twins(table, &mut labels, &mut counts)?;
        }
        for table in &batch.relationships {
            self.write_relationships(table, &labels, &mut counts)?;
        }
        Ok(counts)
    }

    fn send(&self, name: &str, statement: &str, counts: &mut LoadCounts) -> Result<()> {
        self.store
            .execute(self.graph, statement)
            .map_err(|e| Error::load(name, e))?;
        counts.statements += 1;
        Ok(())
    }

    fn write_twins<'b>(
        &self,
        table: &'b ProjectedTable,
        labels: &mut HashMap<&'b str, &'b str>,
        counts: &mut LoadCounts,
    ) -> Result<()> {
        let name = table_name(table);
        if table.is_empty() {
            return Ok(());
        }
        let id_index = table
            .column_index(ID_FIELD)
            .ok_or_else(|| Error::load(&name, "no id column"))?;
        self.send(&name, &cypher::create_index(&table.type_name, ID_FIELD), counts)?;

        for (i, row) in table.rows.iter().enumerate() {
            let id = row.values.get(id_index).map(String::as_str).unwrap_or_default();
            if id.is_empty() {
                return Err(Error::load(&name, format!("row {}: empty twin id", i + 1)));
            }
            if let Some(previous) = labels.insert(id, table.type_name.as_str()) {
                return Err(Error::load(
                    &name,
                    format!("row {}: twin id '{id}' already loaded as {previous}", i + 1),
                ));
            }
            let properties = row_literals(&table.columns, &row.values, i + 1)
                .map_err(|cause| Error::load(&name, cause))?;
            self.send(&name, &cypher::create_node(&table.type_name, &properties), counts)?;
            counts.nodes += 1;
        }
        Ok(())
    }

    fn write_relationships(
        &self,
        table: &ProjectedTable,
        labels: &HashMap<&str, &str>,
        counts: &mut LoadCounts,
    ) -> Result<()> {
        let name = table_name(table);
        let position = |storage_type: StorageType| {
            table
                .columns
                .iter()
                .position(|c| c.storage_type == storage_type)
                .ok_or_else(|| Error::load(&name, format!("no {storage_type} column")))
        };
        let source_index = position(StorageType::StartId)?;
        let target_index = position(StorageType::EndId)?;

        for (i, row) in table.rows.iter().enumerate() {
            let endpoint = |index: usize| {
                let id = row.values.get(index).map(String::as_str).unwrap_or_default();
                labels
                    .get(id)
                    .map(|label| (*label, id))
                    .ok_or_else(|| dangling(&name, i + 1, id))
            };
            let source = endpoint(source_index)?;
            let target = endpoint(target_index)?;

            let (columns, cells): (Vec<Column>, Vec<String>) = table
                .cells(row)
                .filter(|(column, _)| !column.storage_type.is_identifier())
                .map(|(column, cell)| (column.clone(), cell.to_string()))
                .unzip();
            let properties =
                row_literals(&columns, &cells, i + 1).map_err(|cause| Error::load(&name, cause))?;

            self.send(
                &name,
                &cypher::create_edge(&table.type_name, source, target, &properties),
                counts,
            )?;
            counts.edges += 1;
        }
        Ok(())
    }
}

/// Name used in errors, mirroring the artifact layout.
fn table_name(table: &ProjectedTable) -> String {
    format!("{}/{}", table.kind.group(), table.type_name)
}
