//! Document store seam: a REST implementation and an in-memory one.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value as JsonValue};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::wire::{fields_to_json, Fields, WireValue};
use crate::PublishError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteMode {
    /// The document becomes exactly the written fields.
    Replace,
    /// Only the listed (dotted) field paths change.
    Merge(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentWrite {
    pub collection: String,
    pub id: String,
    pub fields: Fields,
    pub mode: WriteMode,
    /// Field paths set to the store's own clock.
    pub server_timestamps: Vec<String>,
}

impl DocumentWrite {
    pub fn replace(collection: &str, id: &str, fields: Fields) -> Self {
        Self {
            collection: collection.to_string(),
            id: id.to_string(),
            fields,
            mode: WriteMode::Replace,
            server_timestamps: Vec::new(),
        }
    }

    pub fn merge(collection: &str, id: &str, fields: Fields, paths: Vec<String>) -> Self {
        Self {
            collection: collection.to_string(),
            id: id.to_string(),
            fields,
            mode: WriteMode::Merge(paths),
            server_timestamps: Vec::new(),
        }
    }

    pub fn with_server_timestamp(mut self, path: &str) -> Self {
        self.server_timestamps.push(path.to_string());
        self
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn write(&self, write: DocumentWrite) -> Result<(), PublishError>;

    /// Deleting a missing document is not an error.
    async fn delete(&self, collection: &str, id: &str) -> Result<(), PublishError>;

    /// Ids of documents in `collection` whose string `field` equals `value`.
    async fn ids_where(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<BTreeSet<String>, PublishError>;
}

/// Document-database REST API, authorized with a static bearer token.
///
/// `base_url` is the documents root, e.g.
/// `https://firestore.googleapis.com/v1/projects/p/databases/(default)/documents`.
#[derive(Debug, Clone)]
pub struct RestDocumentStore {
    client: reqwest::Client,
    base_url: String,
    resource_root: String,
    token: String,
}

impl RestDocumentStore {
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self, PublishError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let base_url = base_url.trim_end_matches('/').to_string();
        let resource_root = base_url
            .split_once("/v1/")
            .map(|(_, rest)| rest.to_string())
            .unwrap_or_else(|| base_url.clone());
        Ok(Self {
            client,
            base_url,
            resource_root,
            token: token.to_string(),
        })
    }

    fn document_url(&self, collection: &str, id: &str) -> String {
        format!("{}/{collection}/{id}", self.base_url)
    }

    fn document_name(&self, collection: &str, id: &str) -> String {
        format!("{}/{collection}/{id}", self.resource_root)
    }

    async fn check(
        operation: &str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, PublishError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(PublishError::Status {
            operation: operation.to_string(),
            status: status.as_u16(),
            body: body.chars().take(500).collect(),
        })
    }

    async fn patch(&self, write: &DocumentWrite) -> Result<(), PublishError> {
        let mut request = self
            .client
            .patch(self.document_url(&write.collection, &write.id))
            .bearer_auth(&self.token)
            .json(&json!({ "fields": fields_to_json(&write.fields) }));
        if let WriteMode::Merge(paths) = &write.mode {
            let mask: Vec<(&str, &str)> = paths
                .iter()
                .map(|path| ("updateMask.fieldPaths", path.as_str()))
                .collect();
            request = request.query(&mask);
        }
        let response = request.send().await?;
        Self::check(&format!("patch {}/{}", write.collection, write.id), response).await?;
        Ok(())
    }

    /// Writes with server-side transforms go through a single-write commit.
    async fn commit(&self, write: &DocumentWrite) -> Result<(), PublishError> {
        let mut entry = json!({
            "update": {
                "name": self.document_name(&write.collection, &write.id),
                "fields": fields_to_json(&write.fields),
            },
            "updateTransforms": write
                .server_timestamps
                .iter()
                .map(|path| json!({ "fieldPath": path, "setToServerValue": "REQUEST_TIME" }))
                .collect::<Vec<_>>(),
        });
        if let WriteMode::Merge(paths) = &write.mode {
            entry["updateMask"] = json!({ "fieldPaths": paths });
        }
        let response = self
            .client
            .post(format!("{}:commit", self.base_url))
            .bearer_auth(&self.token)
            .json(&json!({ "writes": [entry] }))
            .send()
            .await?;
        Self::check(&format!("commit {}/{}", write.collection, write.id), response).await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for RestDocumentStore {
    async fn write(&self, write: DocumentWrite) -> Result<(), PublishError> {
        debug!(collection = %write.collection, id = %write.id, "writing document");
        if write.server_timestamps.is_empty() {
            self.patch(&write).await
        } else {
            self.commit(&write).await
        }
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), PublishError> {
        let response = self
            .client
            .delete(self.document_url(collection, id))
            .bearer_auth(&self.token)
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::check(&format!("delete {collection}/{id}"), response).await?;
        info!(collection, id, "deleted document");
        Ok(())
    }

    async fn ids_where(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<BTreeSet<String>, PublishError> {
        let query = json!({
            "structuredQuery": {
                "from": [{ "collectionId": collection }],
                "where": {
                    "fieldFilter": {
                        "field": { "fieldPath": field },
                        "op": "EQUAL",
                        "value": { "stringValue": value },
                    }
                },
                "select": { "fields": [{ "fieldPath": "__name__" }] },
            }
        });
        let response = self
            .client
            .post(format!("{}:runQuery", self.base_url))
            .bearer_auth(&self.token)
            .json(&query)
            .send()
            .await?;
        let response = Self::check(&format!("query {collection}"), response).await?;
        let rows: Vec<JsonValue> = response
            .json()
            .await
            .map_err(|err| PublishError::Decode(err.to_string()))?;
        Ok(ids_from_query_rows(&rows))
    }
}

/// Query responses interleave result rows with progress rows that carry no
/// document.
fn ids_from_query_rows(rows: &[JsonValue]) -> BTreeSet<String> {
    rows.iter()
        .filter_map(|row| row.pointer("/document/name").and_then(JsonValue::as_str))
        .filter_map(|name| name.rsplit('/').next())
        .map(ToString::to_string)
        .collect()
}

/// In-process store with the same write semantics as the REST store.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    collections: Mutex<BTreeMap<String, BTreeMap<String, Fields>>>,
    writes: Mutex<Vec<(String, String)>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, collection: &str, id: &str, fields: Fields) {
        self.collections
            .lock()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields);
    }

    pub async fn document(&self, collection: &str, id: &str) -> Option<Fields> {
        self.collections
            .lock()
            .await
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned()
    }

    pub async fn ids(&self, collection: &str) -> BTreeSet<String> {
        self.collections
            .lock()
            .await
            .get(collection)
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// `(collection, id)` of every write, in order.
    pub async fn writes(&self) -> Vec<(String, String)> {
        self.writes.lock().await.clone()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn write(&self, write: DocumentWrite) -> Result<(), PublishError> {
        let DocumentWrite {
            collection,
            id,
            fields,
            mode,
            server_timestamps,
        } = write;
        let mut collections = self.collections.lock().await;
        let doc = collections
            .entry(collection.clone())
            .or_default()
            .entry(id.clone())
            .or_default();

        match mode {
            WriteMode::Replace => *doc = fields,
            WriteMode::Merge(paths) => {
                for path in &paths {
                    let segments: Vec<&str> = path.split('.').collect();
                    match lookup(&fields, &segments) {
                        Some(value) => set_path(doc, &segments, value.clone()),
                        None => remove_path(doc, &segments),
                    }
                }
            }
        }

        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        for path in &server_timestamps {
            let segments: Vec<&str> = path.split('.').collect();
            set_path(doc, &segments, WireValue::Timestamp(now.clone()));
        }
        drop(collections);

        self.writes.lock().await.push((collection, id));
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), PublishError> {
        if let Some(docs) = self.collections.lock().await.get_mut(collection) {
            docs.remove(id);
        }
        Ok(())
    }

    async fn ids_where(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<BTreeSet<String>, PublishError> {
        let collections = self.collections.lock().await;
        Ok(collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, fields)| {
                        matches!(fields.get(field), Some(WireValue::String(s)) if s == value)
                    })
                    .map(|(id, _)| id.clone())
                    .collect()
            })
            .unwrap_or_default())
    }
}

fn lookup<'a>(fields: &'a Fields, path: &[&str]) -> Option<&'a WireValue> {
    let (first, rest) = path.split_first()?;
    let value = fields.get(*first)?;
    if rest.is_empty() {
        return Some(value);
    }
    match value {
        WireValue::Map(inner) => lookup(inner, rest),
        _ => None,
    }
}

fn set_path(fields: &mut Fields, path: &[&str], value: WireValue) {
    let Some((first, rest)) = path.split_first() else {
        return;
    };
    if rest.is_empty() {
        fields.insert(first.to_string(), value);
        return;
    }
    let entry = fields
        .entry(first.to_string())
        .or_insert_with(|| WireValue::Map(Fields::new()));
    if !matches!(entry, WireValue::Map(_)) {
        *entry = WireValue::Map(Fields::new());
    }
    if let WireValue::Map(inner) = entry {
        set_path(inner, rest, value);
    }
}

fn remove_path(fields: &mut Fields, path: &[&str]) {
    match path {
        [] => {}
        [last] => {
            fields.remove(*last);
        }
        [first, rest @ ..] => {
            if let Some(WireValue::Map(inner)) = fields.get_mut(*first) {
                remove_path(inner, rest);
            }
        }
    }
}
