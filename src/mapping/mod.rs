//! Mapping schema: which CSV column feeds which property of which object.
//!
//! The YAML document is validated and compiled once per run into the
//! read-only [`Mapping`]. Anything malformed surfaces here as
//! [`LoaderError::Schema`](crate::error::LoaderError::Schema) before a single
//! row is processed.

mod format;
mod model;

pub use format::{compile_formats, infer_precision, DateCandidate};

use std::path::Path;

use crate::error::Result;

/// Static provenance settings: a column to read the URL from, falling back to
/// a constant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceSpec {
    pub source_url: Option<String>,
    pub source_url_column: Option<String>,
}

/// How raw text becomes a typed value.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnType {
    String,
    Bool,
    Int,
    Float,
    Date(DateFormat),
    File,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DateFormat {
    /// No format given; best-effort guessing.
    Natural,
    /// Explicit patterns, most precise first.
    Candidates(Vec<DateCandidate>),
}

/// One column-to-property binding.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    /// Name of the owning entity or relation.
    pub object: String,
    pub column: Option<String>,
    pub property: String,
    pub column_type: ColumnType,
    /// Raw default text, coerced like a cell value.
    pub default: Option<String>,
    pub required: bool,
    pub skip_empty: bool,
    pub unique: bool,
    pub unique_active: bool,
    pub source: SourceSpec,
}

impl ColumnSpec {
    /// The column name for error messages.
    pub fn label(&self) -> &str {
        self.column.as_deref().unwrap_or(&self.property)
    }
}

/// Entity or relation; relations name the entities they connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectKind {
    Entity,
    Relation { source: String, target: String },
}

/// One output object per row.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectModel {
    pub name: String,
    pub schema: String,
    pub kind: ObjectKind,
    pub source: SourceSpec,
    pub columns: Vec<ColumnSpec>,
}

/// A compiled mapping. Entities and relations keep declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct Mapping {
    pub source: SourceSpec,
    pub entities: Vec<ObjectModel>,
    pub relations: Vec<ObjectModel>,
}

impl Mapping {
    /// Load and compile a mapping file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&text)
    }

    /// Compile a mapping from YAML text.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let doc: serde_yaml_ng::Value = serde_yaml_ng::from_str(text)
            .map_err(|e| crate::error::LoaderError::schema(format!("invalid YAML: {}", e)))?;
        model::compile(doc)
    }

    /// Look up an object by name.
    pub fn object(&self, name: &str) -> Option<&ObjectModel> {
        self.entities
            .iter()
            .chain(self.relations.iter())
            .find(|o| o.name == name)
    }

    /// All columns, tagged with their owner, in object declaration order.
    pub fn columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.entities
            .iter()
            .chain(self.relations.iter())
            .flat_map(|o| o.columns.iter())
    }
}
