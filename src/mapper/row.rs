//! Turns one row into its entities and relations.

use std::sync::Arc;

use super::object::{apply, resolve_properties};
use crate::error::Result;
use crate::graph::{CreatedObject, GraphApi};
use crate::mapping::{Mapping, ObjectKind, ObjectModel};
use crate::resolve::{object_source, FileFetcher};
use crate::row::Row;

/// Objects created for one row, by name, in declaration order. `None` marks
/// an object that was skipped for this row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappedRow {
    pub objects: Vec<(String, Option<CreatedObject>)>,
}

impl MappedRow {
    pub fn get(&self, name: &str) -> Option<&CreatedObject> {
        self.objects
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, created)| created.as_ref())
    }

    pub fn created(&self) -> usize {
        self.objects.iter().filter(|(_, o)| o.is_some()).count()
    }
}

/// Maps rows against one compiled mapping. Holds no per-row state, so one
/// instance is shared by all workers.
pub struct RowMapper {
    mapping: Arc<Mapping>,
    graph: Arc<dyn GraphApi>,
    fetcher: FileFetcher,
}

impl RowMapper {
    pub fn new(mapping: Arc<Mapping>, graph: Arc<dyn GraphApi>, fetcher: FileFetcher) -> Self {
        Self {
            mapping,
            graph,
            fetcher,
        }
    }

    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    /// Create all entities, then all relations, each in declaration order.
    /// Relations resolve their endpoints from the entities created here.
    pub async fn load(&self, row: &Row) -> Result<MappedRow> {
        let mut mapped = MappedRow::default();
        for entity in &self.mapping.entities {
            let created = self.load_entity(entity, row).await?;
            mapped.objects.push((entity.name.clone(), created));
        }
        for relation in &self.mapping.relations {
            let created = self.load_relation(relation, row, &mapped).await?;
            mapped.objects.push((relation.name.clone(), created));
        }
        log::trace!("Row {}: {} objects created", row.id, mapped.created());
        Ok(mapped)
    }

    async fn load_entity(&self, model: &ObjectModel, row: &Row) -> Result<Option<CreatedObject>> {
        let source_url = object_source(&self.mapping, model, row);
        let assignments =
            resolve_properties(&model.columns, row, source_url.as_deref(), &self.fetcher).await?;

        // Nothing in this row describes the entity.
        if !model.columns.is_empty() && !assignments.iter().any(|a| a.has_value()) {
            log::debug!("Row {}: no values for entity {}, skipping", row.id, model.name);
            return Ok(None);
        }

        let mut entity = self
            .graph
            .make_entity(&model.schema, source_url.as_deref())
            .await?;
        apply(assignments, entity.as_mut());
        Ok(Some(entity.save().await?))
    }

    async fn load_relation(
        &self,
        model: &ObjectModel,
        row: &Row,
        mapped: &MappedRow,
    ) -> Result<Option<CreatedObject>> {
        let (source_name, target_name) = match &model.kind {
            ObjectKind::Relation { source, target } => (source, target),
            ObjectKind::Entity => return Ok(None),
        };
        let (source, target) = match (mapped.get(source_name), mapped.get(target_name)) {
            (Some(source), Some(target)) => (source, target),
            _ => {
                log::debug!(
                    "Row {}: relation {} is missing {} or {}, skipping",
                    row.id,
                    model.name,
                    source_name,
                    target_name
                );
                return Ok(None);
            }
        };

        let source_url = object_source(&self.mapping, model, row);
        let assignments =
            resolve_properties(&model.columns, row, source_url.as_deref(), &self.fetcher).await?;
        let mut relation = self
            .graph
            .make_relation(&model.schema, source, target, source_url.as_deref())
            .await?;
        apply(assignments, relation.as_mut());
        Ok(Some(relation.save().await?))
    }
}
