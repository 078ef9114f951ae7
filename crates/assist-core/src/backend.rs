//! Abstract persistence capability used by command handlers.
//!
//! Handlers only ever talk to a [`BackendClient`]; the transport behind it
//! is the host's choice. [`MemoryBackend`] keeps everything in process.

use crate::error::{AssistError, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

pub trait BackendClient: Send + Sync {
    /// Create a record in `collection`. Returns the stored record.
    fn create<'a>(&'a self, collection: &'a str, body: Value) -> BoxFuture<'a, Result<Value>>;

    /// Merge `body` into the record `id`. Returns the updated record.
    fn update<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
        body: Value,
    ) -> BoxFuture<'a, Result<Value>>;

    fn delete<'a>(&'a self, collection: &'a str, id: &'a str) -> BoxFuture<'a, Result<Value>>;

    fn list<'a>(&'a self, collection: &'a str) -> BoxFuture<'a, Result<Value>>;
}

// ---------------------------------------------------------------------------
// MemoryBackend
// ---------------------------------------------------------------------------

type Collections = BTreeMap<String, BTreeMap<String, Value>>;

#[derive(Debug, Default)]
pub struct MemoryBackend {
    collections: Mutex<Collections>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record with a known id.
    pub fn insert(&self, collection: &str, id: &str, mut record: Value) {
        if let Some(obj) = record.as_object_mut() {
            obj.insert("id".to_string(), json!(id));
        }
        self.lock()
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), record);
    }

    pub fn get(&self, collection: &str, id: &str) -> Option<Value> {
        self.lock().get(collection)?.get(id).cloned()
    }

    pub fn count(&self, collection: &str) -> usize {
        self.lock().get(collection).map_or(0, |c| c.len())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Collections> {
        self.collections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn create_sync(&self, collection: &str, body: Value) -> Result<Value> {
        let Value::Object(mut obj) = body else {
            return Err(AssistError::Backend(format!(
                "{collection}: request body must be an object"
            )));
        };
        let id = Uuid::new_v4().to_string();
        obj.insert("id".to_string(), json!(id));
        let record = Value::Object(obj);
        self.lock()
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), record.clone());
        debug!(collection, %id, "memory backend create");
        Ok(record)
    }

    fn update_sync(&self, collection: &str, id: &str, body: Value) -> Result<Value> {
        let Value::Object(patch) = body else {
            return Err(AssistError::Backend(format!(
                "{collection}/{id}: request body must be an object"
            )));
        };
        let mut guard = self.lock();
        let record = guard
            .get_mut(collection)
            .and_then(|c| c.get_mut(id))
            .ok_or_else(|| AssistError::Backend(format!("{collection}/{id} not found")))?;
        if let Some(obj) = record.as_object_mut() {
            for (k, v) in patch {
                if k != "id" {
                    obj.insert(k, v);
                }
            }
        }
        Ok(record.clone())
    }

    fn delete_sync(&self, collection: &str, id: &str) -> Result<Value> {
        self.lock()
            .get_mut(collection)
            .and_then(|c| c.remove(id))
            .map(|_| json!({ "deleted": id }))
            .ok_or_else(|| AssistError::Backend(format!("{collection}/{id} not found")))
    }

    fn list_sync(&self, collection: &str) -> Value {
        let guard = self.lock();
        let items: Vec<Value> = guard
            .get(collection)
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default();
        Value::Array(items)
    }
}

impl BackendClient for MemoryBackend {
    fn create<'a>(&'a self, collection: &'a str, body: Value) -> BoxFuture<'a, Result<Value>> {
        async move { self.create_sync(collection, body) }.boxed()
    }

    fn update<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
        body: Value,
    ) -> BoxFuture<'a, Result<Value>> {
        async move { self.update_sync(collection, id, body) }.boxed()
    }

    fn delete<'a>(&'a self, collection: &'a str, id: &'a str) -> BoxFuture<'a, Result<Value>> {
        async move { self.delete_sync(collection, id) }.boxed()
    }

    fn list<'a>(&'a self, collection: &'a str) -> BoxFuture<'a, Result<Value>> {
        async move { Ok(self.list_sync(collection)) }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_assigns_id_and_list_returns_it() {
        let backend = MemoryBackend::new();
        let created = backend
            .create("stakeholders", json!({ "name": "John Smith" }))
            .await
            .unwrap();
        let id = created["id"].as_str().unwrap().to_string();
        assert_eq!(created["name"], "John Smith");
        let listed = backend.list("stakeholders").await.unwrap();
        assert_eq!(listed.as_array().unwrap().len(), 1);
        assert_eq!(listed[0]["id"], id.as_str());
    }

    #[tokio::test]
    async fn update_merges_fields_and_keeps_id() {
        let backend = MemoryBackend::new();
        backend.insert("features", "f-1", json!({ "name": "Export", "status": "draft" }));
        let updated = backend
            .update("features", "f-1", json!({ "status": "confirmed", "id": "other" }))
            .await
            .unwrap();
        assert_eq!(updated["status"], "confirmed");
        assert_eq!(updated["name"], "Export");
        assert_eq!(updated["id"], "f-1");
    }

    #[tokio::test]
    async fn missing_records_are_backend_errors() {
        let backend = MemoryBackend::new();
        let err = backend.delete("personas", "nope").await.unwrap_err();
        assert!(matches!(err, AssistError::Backend(_)));
        assert_eq!(err.to_string(), "backend error: personas/nope not found");
        assert!(backend.update("personas", "nope", json!({})).await.is_err());
    }

    #[tokio::test]
    async fn non_object_bodies_are_rejected() {
        let backend = MemoryBackend::new();
        assert!(backend.create("jobs", json!("run")).await.is_err());
        assert_eq!(backend.count("jobs"), 0);
    }
}
