//! Shared document store contract
//!
//! The live session state travels through a persistent, subscribable document
//! store. This module defines the contract the rest of the crate consumes and
//! ships an in-process implementation ([`MemoryStore`]) for tests and demos.
//!
//! Collections are addressed by slash-separated paths, so an append-only
//! sub-collection of a session is simply `liveSessions/{id}/comments`.

pub mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

/// Field map of a stored document
pub type Fields = serde_json::Map<String, Value>;

/// Store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Field {field} is not numeric in {path}")]
    NotNumeric { path: String, field: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Decoding error: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A document snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    /// Creation time assigned by the store (monotonic per store)
    pub created_at: DateTime<Utc>,
    pub fields: Fields,
}

impl Document {
    /// Deserialize the document into a typed record.
    ///
    /// `id` and `createdAt` are injected from the store metadata.
    pub fn decode<T: DeserializeOwned>(&self) -> StoreResult<T> {
        let mut fields = self.fields.clone();
        fields.insert("id".to_string(), Value::String(self.id.clone()));
        fields.insert("createdAt".to_string(), serde_json::to_value(self.created_at)?);
        Ok(serde_json::from_value(Value::Object(fields))?)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

/// Serialize a record into a field map
pub fn to_fields<T: Serialize>(value: &T) -> StoreResult<Fields> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => {
            let mut map = Fields::new();
            map.insert("value".to_string(), other);
            Ok(map)
        }
    }
}

/// Equality predicate on a top-level field
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

/// Query over a collection, always ordered ascending by creation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    /// Exclusive lower bound on creation time
    pub created_after: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn created_after(mut self, at: DateTime<Utc>) -> Self {
        self.created_after = Some(at);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        if let Some(after) = self.created_after {
            if doc.created_at <= after {
                return false;
            }
        }
        self.filters
            .iter()
            .all(|f| doc.fields.get(&f.field) == Some(&f.value))
    }
}

/// Kind of change delivered to a query watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
}

#[derive(Debug, Clone)]
pub struct Change {
    pub kind: ChangeKind,
    pub doc: Document,
}

/// Push-based subscription. Dropping it unsubscribes.
pub struct Watch<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> Watch<T> {
    pub fn new(rx: mpsc::UnboundedReceiver<T>) -> Self {
        Self { rx }
    }

    /// Wait for the next pushed item. `None` once the store goes away.
    pub async fn next(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Non-blocking poll, for draining whatever has already arrived
    pub fn try_next(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

pub type DocumentWatch = Watch<Document>;
pub type QueryWatch = Watch<Change>;

/// The store contract
///
/// Writes with `merge` replace top-level fields only; nested maps are
/// overwritten as a whole. Watches deliver changes for one document, or one
/// collection, in commit order.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create a document with a store-assigned id
    async fn create(&self, collection: &str, fields: Fields) -> StoreResult<String>;

    /// Write a document, merging into existing fields when `merge` is set
    async fn set(&self, collection: &str, id: &str, fields: Fields, merge: bool)
        -> StoreResult<()>;

    /// Merge fields into an existing document; fails if it does not exist
    async fn update(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<()>;

    /// Point read
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>>;

    /// One-shot query, ascending by creation
    async fn query(&self, collection: &str, query: &Query) -> StoreResult<Vec<Document>>;

    /// Append to an ordered collection
    async fn append(&self, collection: &str, fields: Fields) -> StoreResult<String>;

    /// Atomically add `delta` to a numeric field (missing counts as zero)
    async fn increment_field(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        delta: i64,
    ) -> StoreResult<()>;

    /// Subscribe to one document; the current snapshot is pushed first
    async fn subscribe(&self, collection: &str, id: &str) -> StoreResult<DocumentWatch>;

    /// Subscribe to a query; existing matches arrive first as `Added`
    async fn watch(&self, collection: &str, query: Query) -> StoreResult<QueryWatch>;
}
