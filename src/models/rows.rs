//! Projected rows ready for materialization.

use super::StorageType;

/// Whether a table holds twins or relationships.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    /// Twin (node) table.
    Twin,
    /// Relationship (edge) table.
    Relationship,
}

impl TableKind {
    /// Artifact group directory for this kind.
    #[must_use]
    pub const fn group(&self) -> &'static str {
        match self {
            Self::Twin => "nodes",
            Self::Relationship => "edges",
        }
    }
}

/// A column with its declared storage type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Plain column name.
    pub name: String,
    /// Declared storage type.
    pub storage_type: StorageType,
}

impl Column {
    /// Creates a column.
    #[must_use]
    pub fn new(name: impl Into<String>, storage_type: StorageType) -> Self {
        Self {
            name: name.into(),
            storage_type,
        }
    }

    /// Schema-annotated header cell, e.g. `capacity:DOUBLE`.
    #[must_use]
    pub fn annotated(&self) -> String {
        format!("{}:{}", self.name, self.storage_type)
    }
}

/// One record's serialized values, aligned with its table's columns.
///
/// Absent fields are empty strings, so every row of a table has the same
/// length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectedRow {
    /// Serialized values in column order.
    pub values: Vec<String>,
}

/// All projected rows of one twin or relationship type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectedTable {
    /// Type name (twin short name or relationship name).
    pub type_name: String,
    /// Twin or relationship table.
    pub kind: TableKind,
    /// Columns, referential ones first.
    pub columns: Vec<Column>,
    /// Rows.
    pub rows: Vec<ProjectedRow>,
}

impl ProjectedTable {
    /// Plain column names in order.
    #[must_use]
    pub fn plain_header(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Schema-annotated header cells in order.
    #[must_use]
    pub fn annotated_header(&self) -> Vec<String> {
        self.columns.iter().map(Column::annotated).collect()
    }

    /// Index of a column by name.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Iterates a row as `(column, value)` pairs.
    pub fn cells<'a>(&'a self, row: &'a ProjectedRow) -> impl Iterator<Item = (&'a Column, &'a str)> {
        self.columns
            .iter()
            .zip(row.values.iter().map(String::as_str))
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Projected tables of a run, ready for the materializer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheBatch {
    /// Twin tables, one per twin type.
    pub twins: Vec<ProjectedTable>,
    /// Relationship tables, one per relationship type.
    pub relationships: Vec<ProjectedTable>,
    /// Number of cache generations to keep (0 replaces in place).
    pub rotation: u32,
}

impl CacheBatch {
    /// Total number of twin rows.
    #[must_use]
    pub fn twin_rows(&self) -> usize {
        self.twins.iter().map(ProjectedTable::len).sum()
    }

    /// Total number of relationship rows.
    #[must_use]
    pub fn relationship_rows(&self) -> usize {
        self.relationships.iter().map(ProjectedTable::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers() {
        let table = ProjectedTable {
            type_name: "contains".to_string(),
            kind: TableKind::Relationship,
            columns: vec![
                Column::new("src", StorageType::StartId),
                Column::new("dest", StorageType::EndId),
                Column::new("id", StorageType::String),
            ],
            rows: vec![ProjectedRow {
                values: vec!["A".to_string(), "B".to_string(), "R1".to_string()],
            }],
        };

        assert_eq!(table.plain_header(), vec!["src", "dest", "id"]);
        assert_eq!(
            table.annotated_header(),
            vec!["src:START_ID", "dest:END_ID", "id:STRING"]
        );
        assert_eq!(table.column_index("id"), Some(2));
        let cells: Vec<_> = table
            .cells(&table.rows[0])
            .map(|(c, v)| (c.name.as_str(), v))
            .collect();
        assert_eq!(cells, vec![("src", "A"), ("dest", "B"), ("id", "R1")]);
        assert_eq!(TableKind::Relationship.group(), "edges");
    }
}
