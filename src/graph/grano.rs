use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;

use super::{CreatedObject, GraphApi, GraphObject, PropertySink};
use crate::error::{LoaderError, Result};
use crate::value::{DatePrecision, PropertyValue};

/// Search response from the grano entity/relation listing endpoints
#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Value>,
}

/// grano REST client
///
/// Objects are buffered locally while properties are assigned and written in
/// a single request on `save`. Unique properties turn that write into an
/// update of the matching existing object.
#[derive(Clone)]
pub struct GranoClient {
    client: Client,
    host: String,
    project: String,
    api_key: String,
}

impl GranoClient {
    /// Create a new grano client
    ///
    /// # Arguments
    ///
    /// * `host` - Base URL of the grano instance, e.g. `http://localhost:5000`
    /// * `project` - Project slug to load into
    /// * `api_key` - API key with write access to the project
    /// * `timeout` - Per-request timeout
    pub fn new(host: &str, project: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LoaderError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            host: host.trim_end_matches('/').to_string(),
            project: project.to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/1/{}", self.host, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, self.url(path))
            .header("Authorization", format!("ApiKey {}", self.api_key))
    }

    /// Send a request and decode the JSON body, turning failures into
    /// transport errors that carry the server's message.
    async fn send(&self, request: RequestBuilder) -> Result<Value> {
        let response = request
            .send()
            .await
            .map_err(|e| LoaderError::Transport(format!("Network error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(LoaderError::Transport(format!(
                "grano API error {}: {}",
                status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| LoaderError::Transport(format!("Failed to parse response: {}", e)))
    }

    fn object(&self, kind: ObjectKind, schema: &str, source_url: Option<&str>) -> GranoObject {
        GranoObject {
            api: self.clone(),
            kind,
            schema: schema.to_string(),
            source_url: source_url.map(str::to_string),
            properties: Map::new(),
            unique: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ObjectKind {
    Entity,
    Relation { source: String, target: String },
}

impl ObjectKind {
    fn collection(&self) -> &'static str {
        match self {
            ObjectKind::Entity => "entities",
            ObjectKind::Relation { .. } => "relations",
        }
    }
}

struct GranoObject {
    api: GranoClient,
    kind: ObjectKind,
    schema: String,
    source_url: Option<String>,
    properties: Map<String, Value>,
    unique: Vec<(String, bool)>,
}

impl GranoObject {
    /// JSON body for create and update requests.
    fn payload(&self) -> Value {
        let mut body = json!({
            "project": self.api.project,
            "schema": self.schema,
            "properties": self.properties,
        });
        if let Some(source_url) = &self.source_url {
            body["source_url"] = json!(source_url);
        }
        if let ObjectKind::Relation { source, target } = &self.kind {
            body["source"] = json!(source);
            body["target"] = json!(target);
        }
        body
    }

    /// Query identifying an existing object by its unique properties, if any
    /// were marked and all of them carry a value.
    fn lookup_query(&self) -> Option<Vec<(String, String)>> {
        if self.unique.is_empty() {
            return None;
        }
        let mut query = vec![
            ("project".to_string(), self.api.project.clone()),
            ("schema".to_string(), self.schema.clone()),
        ];
        let mut only_active = false;
        for (property, active) in &self.unique {
            let value = self.properties.get(property)?.get("value")?;
            let text = match value {
                Value::Null => return None,
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            query.push((format!("property-{}", property), text));
            only_active |= *active;
        }
        if only_active {
            query.push(("active".to_string(), "true".to_string()));
        }
        Some(query)
    }

    async fn find_existing(&self) -> Result<Option<String>> {
        let query = match self.lookup_query() {
            Some(q) => q,
            None => return Ok(None),
        };
        let found = self
            .api
            .send(self.api.request(Method::GET, self.kind.collection()).query(&query))
            .await?;
        let found: SearchResponse = serde_json::from_value(found)
            .map_err(|e| LoaderError::Transport(format!("Failed to parse search: {}", e)))?;
        Ok(found.results.first().and_then(object_id))
    }
}

fn object_id(value: &Value) -> Option<String> {
    match value.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl PropertySink for GranoObject {
    fn set(
        &mut self,
        property: &str,
        value: PropertyValue,
        source_url: Option<&str>,
        precision: Option<DatePrecision>,
    ) {
        let mut entry = json!({
            "value": value,
            "source_url": source_url,
        });
        if let Some(precision) = precision {
            entry["value_precision"] = json!(precision);
        }
        self.properties.insert(property.to_string(), entry);
    }

    fn mark_unique(&mut self, property: &str, only_active: bool) {
        self.unique.retain(|(p, _)| p != property);
        self.unique.push((property.to_string(), only_active));
    }
}

#[async_trait]
impl GraphObject for GranoObject {
    async fn save(self: Box<Self>) -> Result<CreatedObject> {
        let collection = self.kind.collection();
        let request = match self.find_existing().await? {
            Some(id) => {
                log::debug!("Updating existing {} {} ({})", self.schema, id, collection);
                self.api
                    .request(Method::POST, &format!("{}/{}", collection, id))
            }
            None => self.api.request(Method::POST, collection),
        };
        let saved = self.api.send(request.json(&self.payload())).await?;
        let id = object_id(&saved).ok_or_else(|| {
            LoaderError::Transport(format!("grano returned no id for {}", self.schema))
        })?;
        Ok(CreatedObject {
            id,
            schema: self.schema,
        })
    }
}

#[async_trait]
impl GraphApi for GranoClient {
    async fn make_entity(
        &self,
        schema: &str,
        source_url: Option<&str>,
    ) -> Result<Box<dyn GraphObject>> {
        Ok(Box::new(self.object(ObjectKind::Entity, schema, source_url)))
    }

    async fn make_relation(
        &self,
        schema: &str,
        source: &CreatedObject,
        target: &CreatedObject,
        source_url: Option<&str>,
    ) -> Result<Box<dyn GraphObject>> {
        let kind = ObjectKind::Relation {
            source: source.id.clone(),
            target: target.id.clone(),
        };
        Ok(Box::new(self.object(kind, schema, source_url)))
    }

    async fn upsert_schema(&self, definition: &Value) -> Result<()> {
        let name = definition
            .get("name")
            .and_then(|n| n.as_str())
            .ok_or_else(|| LoaderError::schema("schema definition has no name"))?;

        let path = format!("projects/{}/schemata", self.project);
        let update = self
            .request(Method::POST, &format!("{}/{}", path, name))
            .json(definition)
            .send()
            .await
            .map_err(|e| LoaderError::Transport(format!("Network error: {}", e)))?;

        if update.status() == StatusCode::NOT_FOUND {
            log::info!("Creating schema {}", name);
            self.send(self.request(Method::POST, &path).json(definition))
                .await?;
        } else if !update.status().is_success() {
            let status = update.status();
            let body = update
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(LoaderError::Transport(format!(
                "grano API error {}: {}",
                status, body
            )));
        } else {
            log::info!("Updated schema {}", name);
        }
        Ok(())
    }
}
