//! The document store boundary.
//!
//! [`DocumentStore`] is the only way the catalog talks to persistence. Documents
//! are schemaless JSON objects; the store assigns ids and versions and publishes
//! every committed change to its subscribers.

mod error;
pub mod memory;

pub use error::StoreError;
pub use memory::{MemoryStore, StoreClient, StoreRequest, StoreResponse};

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Schemaless document body.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// A document as held by the store, with its id and write version.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    /// Incremented on every committed write. Starts at 1.
    pub version: u64,
    pub data: Document,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// One document's change since the previous event.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChange {
    pub kind: ChangeKind,
    pub document: StoredDocument,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// Full contents of the collection, in insertion order. Always first.
    Snapshot(Vec<StoredDocument>),
    Change(DocumentChange),
}

/// Live feed of a collection. Dropping it releases the feed.
#[derive(Debug)]
pub struct Subscription {
    receiver: mpsc::Receiver<Result<StoreEvent, StoreError>>,
}

impl Subscription {
    pub fn new(receiver: mpsc::Receiver<Result<StoreEvent, StoreError>>) -> Self {
        Self { receiver }
    }

    /// Next event. `None` once the store has closed the feed.
    pub async fn next(&mut self) -> Option<Result<StoreEvent, StoreError>> {
        self.receiver.recv().await
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Opens a feed: one [`StoreEvent::Snapshot`] followed by changes in commit order.
    async fn subscribe(&self, collection: &str) -> Result<Subscription, StoreError>;

    /// Writes a new document and returns the id the store assigned to it.
    async fn insert(&self, collection: &str, data: Document) -> Result<String, StoreError>;

    /// Removes one document. `Ok(false)` when there was nothing to remove.
    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError>;

    async fn get(&self, collection: &str, id: &str)
        -> Result<Option<StoredDocument>, StoreError>;

    /// Merges `fields` into the document and returns the new version.
    ///
    /// With `expected_version` set, the write only commits if the stored version
    /// still matches; otherwise it fails with [`StoreError::VersionConflict`].
    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Document,
        expected_version: Option<u64>,
    ) -> Result<u64, StoreError>;

    async fn list_all(&self, collection: &str) -> Result<Vec<StoredDocument>, StoreError>;

    /// Removes all listed documents in one atomic write. Returns how many existed.
    async fn batch_delete(&self, collection: &str, ids: &[String]) -> Result<usize, StoreError>;
}
