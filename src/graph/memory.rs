//! In-memory graph that records every call it receives.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{CreatedObject, GraphApi, GraphObject, PropertySink};
use crate::error::{LoaderError, Result};
use crate::value::{DatePrecision, PropertyValue};

/// One call made against a [`MemoryGraph`]. `handle` ties property calls to
/// the object they were made on.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphCall {
    MakeEntity {
        handle: u64,
        schema: String,
        source_url: Option<String>,
    },
    MakeRelation {
        handle: u64,
        schema: String,
        source: String,
        target: String,
        source_url: Option<String>,
    },
    Set {
        handle: u64,
        property: String,
        value: PropertyValue,
        source_url: Option<String>,
        precision: Option<DatePrecision>,
    },
    MarkUnique {
        handle: u64,
        property: String,
        only_active: bool,
    },
    Save {
        handle: u64,
    },
    UpsertSchema {
        name: String,
    },
}

#[derive(Default)]
struct Journal {
    calls: Mutex<Vec<GraphCall>>,
    next_handle: AtomicU64,
}

impl Journal {
    fn record(&self, call: GraphCall) {
        log::debug!("graph: {:?}", call);
        lock(&self.calls).push(call);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Recording graph. Clones share one journal.
#[derive(Clone, Default)]
pub struct MemoryGraph {
    journal: Arc<Journal>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all calls so far, in order.
    pub fn calls(&self) -> Vec<GraphCall> {
        lock(&self.journal.calls).clone()
    }

    /// Number of saved objects.
    pub fn saved(&self) -> usize {
        lock(&self.journal.calls)
            .iter()
            .filter(|c| matches!(c, GraphCall::Save { .. }))
            .count()
    }

    fn open(&self, schema: &str) -> MemoryObject {
        let handle = self.journal.next_handle.fetch_add(1, Ordering::SeqCst) + 1;
        MemoryObject {
            journal: Arc::clone(&self.journal),
            handle,
            schema: schema.to_string(),
        }
    }
}

struct MemoryObject {
    journal: Arc<Journal>,
    handle: u64,
    schema: String,
}

impl PropertySink for MemoryObject {
    fn set(
        &mut self,
        property: &str,
        value: PropertyValue,
        source_url: Option<&str>,
        precision: Option<DatePrecision>,
    ) {
        self.journal.record(GraphCall::Set {
            handle: self.handle,
            property: property.to_string(),
            value,
            source_url: source_url.map(str::to_string),
            precision,
        });
    }

    fn mark_unique(&mut self, property: &str, only_active: bool) {
        self.journal.record(GraphCall::MarkUnique {
            handle: self.handle,
            property: property.to_string(),
            only_active,
        });
    }
}

#[async_trait]
impl GraphObject for MemoryObject {
    async fn save(self: Box<Self>) -> Result<CreatedObject> {
        self.journal.record(GraphCall::Save {
            handle: self.handle,
        });
        Ok(CreatedObject {
            id: self.handle.to_string(),
            schema: self.schema,
        })
    }
}

#[async_trait]
impl GraphApi for MemoryGraph {
    async fn make_entity(
        &self,
        schema: &str,
        source_url: Option<&str>,
    ) -> Result<Box<dyn GraphObject>> {
        let object = self.open(schema);
        self.journal.record(GraphCall::MakeEntity {
            handle: object.handle,
            schema: schema.to_string(),
            source_url: source_url.map(str::to_string),
        });
        Ok(Box::new(object))
    }

    async fn make_relation(
        &self,
        schema: &str,
        source: &CreatedObject,
        target: &CreatedObject,
        source_url: Option<&str>,
    ) -> Result<Box<dyn GraphObject>> {
        let object = self.open(schema);
        self.journal.record(GraphCall::MakeRelation {
            handle: object.handle,
            schema: schema.to_string(),
            source: source.id.clone(),
            target: target.id.clone(),
            source_url: source_url.map(str::to_string),
        });
        Ok(Box::new(object))
    }

    async fn upsert_schema(&self, definition: &serde_json::Value) -> Result<()> {
        let name = definition
            .get("name")
            .and_then(|n| n.as_str())
            .ok_or_else(|| LoaderError::schema("schema definition has no name"))?;
        self.journal.record(GraphCall::UpsertSchema {
            name: name.to_string(),
        });
        Ok(())
    }
}
