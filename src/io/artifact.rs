//! CSV artifacts staged before a bulk load.
//!
//! Layout of an artifact set:
//!
//! ```text
//! {dir}/nodes/{TwinType}.csv
//! {dir}/edges/{relationshipName}.csv
//! ```
//!
//! The first record of each file is the schema-annotated header
//! (`id:ID,capacity:DOUBLE`); data records follow in plain column order.

use crate::models::{CacheBatch, Column, ProjectedTable, StorageType, TableKind};
use crate::{Error, Result};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

/// One staged CSV file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Type name the artifact holds.
    pub type_name: String,
    /// Twin or relationship artifact.
    pub kind: TableKind,
    /// File location.
    pub path: PathBuf,
    /// Number of data rows.
    pub rows: usize,
}

impl Artifact {
    /// Name used in logs and errors, e.g. `nodes/Warehouse.csv`.
    #[must_use]
    pub fn name(&self) -> String {
        format!("{}/{}", self.kind.group(), file_name(&self.type_name))
    }
}

/// Twin and relationship artifacts of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactSet {
    /// Root directory.
    pub dir: PathBuf,
    /// Twin artifacts.
    pub nodes: Vec<Artifact>,
    /// Relationship artifacts.
    pub edges: Vec<Artifact>,
}

impl ArtifactSet {
    /// Iterates every artifact, twins first.
    pub fn iter(&self) -> impl Iterator<Item = &Artifact> {
        self.nodes.iter().chain(self.edges.iter())
    }
}

/// Writes a whole batch below `dir`.
///
/// # Errors
///
/// Returns [`Error::Load`] naming the artifact that could not be written.
pub fn write_batch(batch: &CacheBatch, dir: &Path) -> Result<ArtifactSet> {
    let nodes = batch
        .twins
        .iter()
        .map(|table| write_table(table, dir))
        .collect::<Result<Vec<_>>>()?;
    let edges = batch
        .relationships
        .iter()
        .map(|table| write_table(table, dir))
        .collect::<Result<Vec<_>>>()?;

    Ok(ArtifactSet {
        dir: dir.to_path_buf(),
        nodes,
        edges,
    })
}

/// Writes one table to `{dir}/{group}/{type}.csv`.
///
/// # Errors
///
/// Returns [`Error::Load`] if the directory or file cannot be written.
pub fn write_table(table: &ProjectedTable, dir: &Path) -> Result<Artifact> {
    let group_dir = dir.join(table.kind.group());
    let artifact = Artifact {
        type_name: table.type_name.clone(),
        kind: table.kind,
        path: group_dir.join(file_name(&table.type_name)),
        rows: table.len(),
    };

    std::fs::create_dir_all(&group_dir).map_err(|e| Error::load(artifact.name(), e))?;
    let file = File::create(&artifact.path).map_err(|e| Error::load(artifact.name(), e))?;
    write_table_to(table, file).map_err(|e| Error::load(artifact.name(), e))?;

    tracing::debug!(
        artifact = %artifact.name(),
        rows = artifact.rows,
        "Wrote artifact"
    );
    Ok(artifact)
}

/// Writes the annotated header and the rows of `table` to `writer`.
///
/// # Errors
///
/// Returns the CSV error if a record cannot be written.
pub fn write_table_to<W: Write>(table: &ProjectedTable, writer: W) -> csv::Result<()> {
    let mut csv_writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);

    csv_writer.write_record(table.annotated_header())?;
    for row in &table.rows {
        csv_writer.write_record(&row.values)?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Sequential reader over a staged artifact.
pub struct ArtifactReader<R: Read> {
    reader: csv::Reader<R>,
    columns: Vec<Column>,
}

impl ArtifactReader<BufReader<File>> {
    /// Opens an artifact file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Load`] if the file cannot be opened or its header is
    /// not a valid annotated header.
    pub fn open(artifact: &Artifact) -> Result<Self> {
        let file = File::open(&artifact.path).map_err(|e| Error::load(artifact.name(), e))?;
        Self::new(BufReader::new(file)).map_err(|e| Error::load(artifact.name(), e))
    }
}

impl<R: Read> ArtifactReader<R> {
    /// Creates a reader and parses the annotated header.
    ///
    /// # Errors
    ///
    /// Returns an error if the header cannot be read or a header cell lacks a
    /// known `:TYPE` annotation.
    pub fn new(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(reader);
        let headers = csv_reader
            .headers()
            .map_err(|e| Error::operation("read_artifact_header", e))?;
        let columns = headers
            .iter()
            .map(parse_annotated)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            reader: csv_reader,
            columns,
        })
    }

    /// Columns declared by the annotated header.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Reads the next data row.
    ///
    /// Returns `Ok(None)` at end of file.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be read or its width differs
    /// from the header.
    pub fn next_row(&mut self) -> Result<Option<Vec<String>>> {
        let mut record = csv::StringRecord::new();
        let has_record = self
            .reader
            .read_record(&mut record)
            .map_err(|e| Error::operation("read_artifact", e))?;
        if !has_record {
            return Ok(None);
        }
        Ok(Some(record.iter().map(String::from).collect()))
    }
}

/// Parses `name:TYPE` into a column.
///
/// # Errors
///
/// Returns an error if the cell has no annotation or the tag is unknown.
pub fn parse_annotated(cell: &str) -> Result<Column> {
    let (name, tag) = cell
        .rsplit_once(':')
        .ok_or_else(|| Error::operation("parse_artifact_header", format!("unannotated column: {cell}")))?;
    let storage_type = tag
        .parse::<StorageType>()
        .map_err(|e| Error::operation("parse_artifact_header", e))?;
    Ok(Column::new(name, storage_type))
}

/// File name for a type, with path-unsafe characters replaced.
fn file_name(type_name: &str) -> String {
    let safe: String = type_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{safe}.csv")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProjectedRow;
    use std::io::Cursor;

    fn warehouse_table() -> ProjectedTable {
        ProjectedTable {
            type_name: "Warehouse".to_string(),
            kind: TableKind::Twin,
            columns: vec![
                Column::new("id", StorageType::Id),
                Column::new("capacity", StorageType::Double),
                Column::new("tags", StorageType::Array),
            ],
            rows: vec![
                ProjectedRow {
                    values: vec!["w1".to_string(), "12.5".to_string(), "['a','b']".to_string()],
                },
                ProjectedRow {
                    values: vec!["w2".to_string(), String::new(), String::new()],
                },
            ],
        }
    }

    #[test]
    fn test_write_table_to() {
        let mut output = Vec::new();
        write_table_to(&warehouse_table(), &mut output).unwrap();

        let text = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "id:ID,capacity:DOUBLE,tags:ARRAY");
        assert_eq!(lines[1], "w1,12.5,\"['a','b']\"");
        assert_eq!(lines[2], "w2,,");
    }

    #[test]
    fn test_reader_parses_header_and_rows() {
        let mut output = Vec::new();
        write_table_to(&warehouse_table(), &mut output).unwrap();

        let mut reader = ArtifactReader::new(Cursor::new(output)).unwrap();
        assert_eq!(reader.columns()[1], Column::new("capacity", StorageType::Double));
        assert_eq!(
            reader.next_row().unwrap().unwrap(),
            vec!["w1", "12.5", "['a','b']"]
        );
        assert_eq!(reader.next_row().unwrap().unwrap(), vec!["w2", "", ""]);
        assert!(reader.next_row().unwrap().is_none());
    }

    #[test]
    fn test_reader_rejects_unannotated_header() {
        let result = ArtifactReader::new(Cursor::new("id,capacity\nw1,2\n"));
        assert!(result.is_err());
    }

    #[test]
    fn test_write_batch_layout() {
        let dir = tempfile::tempdir().unwrap();
        let batch = CacheBatch {
            twins: vec![warehouse_table()],
            relationships: vec![ProjectedTable {
                type_name: "contains".to_string(),
                kind: TableKind::Relationship,
                columns: vec![
                    Column::new("src", StorageType::StartId),
                    Column::new("dest", StorageType::EndId),
                    Column::new("id", StorageType::String),
                ],
                rows: Vec::new(),
            }],
            rotation: 1,
        };

        let set = write_batch(&batch, dir.path()).unwrap();
        assert_eq!(set.nodes.len(), 1);
        assert_eq!(set.edges.len(), 1);
        assert!(dir.path().join("nodes/Warehouse.csv").exists());
        assert!(dir.path().join("edges/contains.csv").exists());
        assert_eq!(set.nodes[0].rows, 2);
        assert_eq!(set.edges[0].name(), "edges/contains.csv");
        assert_eq!(set.iter().count(), 2);
    }

    #[test]
    fn test_file_name_sanitizes() {
        assert_eq!(file_name("a/b c"), "a_b_c.csv");
        assert_eq!(file_name("Warehouse"), "Warehouse.csv");
    }
}
