//! Column policy for one object: required, skip_empty, unique, provenance.

use crate::error::{LoaderError, Result};
use crate::graph::PropertySink;
use crate::mapping::ColumnSpec;
use crate::resolve::{column_source, resolve_value, FileFetcher};
use crate::row::Row;
use crate::value::{Coerced, DatePrecision, PropertyValue};

/// A property ready to be written to an object.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub property: String,
    pub value: PropertyValue,
    pub source_url: Option<String>,
    pub precision: Option<DatePrecision>,
    /// `Some(only_active)` when the property is an identity key.
    pub unique: Option<bool>,
}

impl Assignment {
    pub fn has_value(&self) -> bool {
        self.value != PropertyValue::Null
    }
}

/// Resolve every column of an object for one row, in column order.
///
/// Fails on the first required column without a value. Absent values of
/// `skip_empty` columns produce no assignment at all; other absent values are
/// assigned as null.
pub async fn resolve_properties(
    columns: &[ColumnSpec],
    row: &Row,
    object_source: Option<&str>,
    fetcher: &FileFetcher,
) -> Result<Vec<Assignment>> {
    let mut assignments = Vec::with_capacity(columns.len());
    for spec in columns {
        let source_url = column_source(spec, row, object_source);
        let (value, precision) = match resolve_value(spec, row, fetcher).await? {
            Some(Coerced { value, precision }) => (value, precision),
            None if spec.required => {
                return Err(LoaderError::InvalidValue {
                    row: row.id,
                    column: spec.label().to_string(),
                    value: spec
                        .column
                        .as_deref()
                        .and_then(|c| row.get(c))
                        .map(str::to_string),
                })
            }
            None if spec.skip_empty => continue,
            None => (PropertyValue::Null, None),
        };
        assignments.push(Assignment {
            property: spec.property.clone(),
            value,
            source_url,
            precision,
            unique: spec.unique.then_some(spec.unique_active),
        });
    }
    Ok(assignments)
}

/// Write resolved assignments to a target, marking identity keys right after
/// their value.
pub fn apply<S: PropertySink + ?Sized>(assignments: Vec<Assignment>, target: &mut S) {
    for a in assignments {
        target.set(&a.property, a.value, a.source_url.as_deref(), a.precision);
        if let Some(only_active) = a.unique {
            target.mark_unique(&a.property, only_active);
        }
    }
}

/// Resolve and apply in one step.
pub async fn apply_columns<S: PropertySink + ?Sized>(
    columns: &[ColumnSpec],
    row: &Row,
    object_source: Option<&str>,
    fetcher: &FileFetcher,
    target: &mut S,
) -> Result<()> {
    let assignments = resolve_properties(columns, row, object_source, fetcher).await?;
    apply(assignments, target);
    Ok(())
}
