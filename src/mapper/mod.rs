//! Mapping engine: column policy per object and per-row orchestration.

mod object;
mod row;

pub use object::{apply, apply_columns, resolve_properties, Assignment};
pub use row::{MappedRow, RowMapper};
