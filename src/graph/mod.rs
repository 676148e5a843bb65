//! Graph persistence: where mapped entities and relations end up.
//!
//! The mapper only talks to the traits below. [`GranoClient`] writes to a
//! grano server over HTTP; [`MemoryGraph`] records every call and backs dry
//! runs and tests.

mod grano;
mod memory;

pub use grano::GranoClient;
pub use memory::{GraphCall, MemoryGraph};

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::value::{DatePrecision, PropertyValue};

/// A saved entity or relation, as returned by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedObject {
    pub id: String,
    pub schema: String,
}

/// Property assignment on an object under construction.
pub trait PropertySink {
    /// Assign a property. `precision` is metadata about a date value, never
    /// part of the value itself.
    fn set(
        &mut self,
        property: &str,
        value: PropertyValue,
        source_url: Option<&str>,
        precision: Option<DatePrecision>,
    );

    /// Use `property` as an identity key when saving, optionally only among
    /// active objects.
    fn mark_unique(&mut self, property: &str, only_active: bool);
}

/// An entity or relation that has been created but not yet saved.
#[async_trait]
pub trait GraphObject: PropertySink + Send {
    async fn save(self: Box<Self>) -> Result<CreatedObject>;
}

/// The persistence API consumed by the loader.
#[async_trait]
pub trait GraphApi: Send + Sync {
    async fn make_entity(
        &self,
        schema: &str,
        source_url: Option<&str>,
    ) -> Result<Box<dyn GraphObject>>;

    async fn make_relation(
        &self,
        schema: &str,
        source: &CreatedObject,
        target: &CreatedObject,
        source_url: Option<&str>,
    ) -> Result<Box<dyn GraphObject>>;

    /// Create or replace a schema definition in the project.
    async fn upsert_schema(&self, definition: &serde_json::Value) -> Result<()>;
}
