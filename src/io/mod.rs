//! Tabular I/O.
//!
//! - [`value`] serializes raw property values into cells.
//! - [`artifact`] stages projected tables as schema-annotated CSV files and
//!   reads them back for loading.

pub mod artifact;
pub mod value;

pub use artifact::{Artifact, ArtifactReader, ArtifactSet, write_batch, write_table};
pub use value::{DefaultValueFormatter, ValueFormatter, coerce};
