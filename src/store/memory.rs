//! In-process document store
//!
//! Keeps every collection in memory behind a single lock, so increments and
//! merges are atomic and notifications go out in commit order.

use super::{
    Change, ChangeKind, Document, DocumentStore, DocumentWatch, Fields, Query, QueryWatch,
    StoreError, StoreResult, Watch,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use uuid::Uuid;

struct DocWatcher {
    id: String,
    tx: mpsc::UnboundedSender<Document>,
}

struct QueryWatcher {
    query: Query,
    tx: mpsc::UnboundedSender<Change>,
}

#[derive(Default)]
struct Collection {
    docs: HashMap<String, Document>,
    /// Ids in creation order
    order: Vec<String>,
    doc_watchers: Vec<DocWatcher>,
    query_watchers: Vec<QueryWatcher>,
}

impl Collection {
    fn notify(&mut self, id: &str, kind: ChangeKind) {
        let Some(doc) = self.docs.get(id) else {
            return;
        };

        self.doc_watchers.retain(|w| !w.tx.is_closed());
        for watcher in self.doc_watchers.iter().filter(|w| w.id == id) {
            let _ = watcher.tx.send(doc.clone());
        }

        self.query_watchers.retain(|w| !w.tx.is_closed());
        for watcher in self.query_watchers.iter().filter(|w| w.query.matches(doc)) {
            let _ = watcher.tx.send(Change {
                kind,
                doc: doc.clone(),
            });
        }
    }

    fn ordered(&self, query: &Query) -> Vec<Document> {
        let matching = self
            .order
            .iter()
            .filter_map(|id| self.docs.get(id))
            .filter(|doc| query.matches(doc))
            .cloned();
        match query.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        }
    }
}

#[derive(Default)]
struct Inner {
    collections: HashMap<String, Collection>,
    last_created_at: Option<DateTime<Utc>>,
}

impl Inner {
    /// Strictly increasing creation timestamps
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match self.last_created_at {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_created_at = Some(ts);
        ts
    }

    fn insert(&mut self, collection: &str, id: String, fields: Fields) {
        let created_at = self.next_timestamp();
        let coll = self.collections.entry(collection.to_string()).or_default();
        coll.order.push(id.clone());
        coll.docs.insert(
            id.clone(),
            Document {
                id: id.clone(),
                created_at,
                fields,
            },
        );
        coll.notify(&id, ChangeKind::Added);
    }
}

/// Memory-backed [`DocumentStore`]
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a network outage: every write fails while offline
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self, op: &str) -> StoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("{} while offline", op)));
        }
        Ok(())
    }

    /// Number of documents in a collection
    pub fn len(&self, collection: &str) -> usize {
        self.inner
            .lock()
            .collections
            .get(collection)
            .map(|c| c.docs.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create(&self, collection: &str, fields: Fields) -> StoreResult<String> {
        self.check_online("create")?;
        let id = Uuid::new_v4().simple().to_string();
        self.inner.lock().insert(collection, id.clone(), fields);
        Ok(id)
    }

    async fn set(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
        merge: bool,
    ) -> StoreResult<()> {
        self.check_online("set")?;
        let mut inner = self.inner.lock();

        let exists = inner
            .collections
            .get(collection)
            .is_some_and(|c| c.docs.contains_key(id));
        if !exists {
            inner.insert(collection, id.to_string(), fields);
            return Ok(());
        }

        let coll = inner
            .collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::NotFound(format!("{}/{}", collection, id)))?;
        if let Some(doc) = coll.docs.get_mut(id) {
            if merge {
                doc.fields.extend(fields);
            } else {
                doc.fields = fields;
            }
        }
        coll.notify(id, ChangeKind::Modified);
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<()> {
        self.check_online("update")?;
        let mut inner = self.inner.lock();
        let coll = inner
            .collections
            .get_mut(collection)
            .filter(|c| c.docs.contains_key(id))
            .ok_or_else(|| StoreError::NotFound(format!("{}/{}", collection, id)))?;
        if let Some(doc) = coll.docs.get_mut(id) {
            doc.fields.extend(fields);
        }
        coll.notify(id, ChangeKind::Modified);
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        Ok(self
            .inner
            .lock()
            .collections
            .get(collection)
            .and_then(|c| c.docs.get(id))
            .cloned())
    }

    async fn query(&self, collection: &str, query: &Query) -> StoreResult<Vec<Document>> {
        Ok(self
            .inner
            .lock()
            .collections
            .get(collection)
            .map(|c| c.ordered(query))
            .unwrap_or_default())
    }

    async fn append(&self, collection: &str, fields: Fields) -> StoreResult<String> {
        self.create(collection, fields).await
    }

    async fn increment_field(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        delta: i64,
    ) -> StoreResult<()> {
        self.check_online("increment")?;
        let mut inner = self.inner.lock();
        let path = format!("{}/{}", collection, id);
        let coll = inner
            .collections
            .get_mut(collection)
            .filter(|c| c.docs.contains_key(id))
            .ok_or_else(|| StoreError::NotFound(path.clone()))?;

        if let Some(doc) = coll.docs.get_mut(id) {
            let current = match doc.fields.get(field) {
                None | Some(Value::Null) => 0,
                Some(value) => value.as_i64().ok_or_else(|| StoreError::NotNumeric {
                    path: path.clone(),
                    field: field.to_string(),
                })?,
            };
            doc.fields
                .insert(field.to_string(), Value::from(current + delta));
        }
        coll.notify(id, ChangeKind::Modified);
        Ok(())
    }

    async fn subscribe(&self, collection: &str, id: &str) -> StoreResult<DocumentWatch> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock();
        let coll = inner.collections.entry(collection.to_string()).or_default();
        if let Some(doc) = coll.docs.get(id) {
            let _ = tx.send(doc.clone());
        }
        coll.doc_watchers.push(DocWatcher {
            id: id.to_string(),
            tx,
        });
        Ok(Watch::new(rx))
    }

    async fn watch(&self, collection: &str, query: Query) -> StoreResult<QueryWatch> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock();
        let coll = inner.collections.entry(collection.to_string()).or_default();
        for doc in coll.ordered(&query) {
            let _ = tx.send(Change {
                kind: ChangeKind::Added,
                doc,
            });
        }
        coll.query_watchers.push(QueryWatcher { query, tx });
        Ok(Watch::new(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::to_fields;
    use serde_json::json;
    use std::sync::Arc;

    fn fields(value: Value) -> Fields {
        to_fields(&value).unwrap()
    }

    #[tokio::test]
    async fn test_merge_keeps_other_fields() {
        let store = MemoryStore::new();
        let id = store
            .create("decks", fields(json!({ "a": 1, "b": 2 })))
            .await
            .unwrap();
        store
            .set("decks", &id, fields(json!({ "b": 3 })), true)
            .await
            .unwrap();

        let doc = store.get("decks", &id).await.unwrap().unwrap();
        assert_eq!(doc.get("a"), Some(&json!(1)));
        assert_eq!(doc.get("b"), Some(&json!(3)));
    }

    #[tokio::test]
    async fn test_update_missing_document_fails() {
        let store = MemoryStore::new();
        let result = store.update("decks", "missing", Fields::new()).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_atomic() {
        let store = Arc::new(MemoryStore::new());
        let id = store.create("c", fields(json!({}))).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..50 {
            let store = store.clone();
            let id = id.clone();
            let delta = if i % 2 == 0 { 1 } else { -1 };
            handles.push(tokio::spawn(async move {
                store.increment_field("c", &id, "n", delta).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let doc = store.get("c", &id).await.unwrap().unwrap();
        assert_eq!(doc.get("n"), Some(&json!(0)));
    }

    #[tokio::test]
    async fn test_append_order_and_watch() {
        let store = MemoryStore::new();
        store.append("log", fields(json!({ "n": 1 }))).await.unwrap();

        let mut watch = store.watch("log", Query::new()).await.unwrap();
        store.append("log", fields(json!({ "n": 2 }))).await.unwrap();
        store.append("log", fields(json!({ "n": 3 }))).await.unwrap();

        let mut seen = Vec::new();
        for _ in 0..3 {
            let change = watch.next().await.unwrap();
            assert_eq!(change.kind, ChangeKind::Added);
            seen.push(change.doc.get("n").cloned().unwrap());
        }
        assert_eq!(seen, vec![json!(1), json!(2), json!(3)]);

        let all = store.query("log", &Query::new()).await.unwrap();
        assert!(all.windows(2).all(|w| w[0].created_at < w[1].created_at));
    }

    #[tokio::test]
    async fn test_subscribe_pushes_snapshot_then_changes() {
        let store = MemoryStore::new();
        let id = store.create("s", fields(json!({ "v": 0 }))).await.unwrap();
        let mut watch = store.subscribe("s", &id).await.unwrap();

        store
            .update("s", &id, fields(json!({ "v": 1 })))
            .await
            .unwrap();

        assert_eq!(watch.next().await.unwrap().get("v"), Some(&json!(0)));
        assert_eq!(watch.next().await.unwrap().get("v"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn test_offline_rejects_writes() {
        let store = MemoryStore::new();
        store.set_offline(true);
        assert!(matches!(
            store.create("s", Fields::new()).await,
            Err(StoreError::Unavailable(_))
        ));
        store.set_offline(false);
        assert!(store.create("s", Fields::new()).await.is_ok());
    }
}
