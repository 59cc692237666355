use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{
    ChangeKind, Document, DocumentChange, DocumentStore, StoreError, StoreEvent, StoredDocument,
    Subscription,
};

/// Events a subscriber may have queued before it is considered lost.
pub const DEFAULT_FEED_CAPACITY: usize = 1024;

/// Default number of writes accepted in one batch.
pub const DEFAULT_BATCH_LIMIT: usize = 500;

// =============================================================================
// MESSAGES
// =============================================================================

pub type StoreResponse<T> = oneshot::Sender<Result<T, StoreError>>;

#[derive(Debug)]
pub enum StoreRequest {
    Subscribe {
        collection: String,
        respond_to: StoreResponse<Subscription>,
    },
    Insert {
        collection: String,
        data: Document,
        respond_to: StoreResponse<String>,
    },
    Get {
        collection: String,
        id: String,
        respond_to: StoreResponse<Option<StoredDocument>>,
    },
    Update {
        collection: String,
        id: String,
        fields: Document,
        expected_version: Option<u64>,
        respond_to: StoreResponse<u64>,
    },
    Delete {
        collection: String,
        id: String,
        respond_to: StoreResponse<bool>,
    },
    ListAll {
        collection: String,
        respond_to: StoreResponse<Vec<StoredDocument>>,
    },
    BatchDelete {
        collection: String,
        ids: Vec<String>,
        respond_to: StoreResponse<usize>,
    },
    SetOnline {
        online: bool,
        respond_to: StoreResponse<()>,
    },
}

// =============================================================================
// THE STORE ACTOR
// =============================================================================

type Feed = mpsc::Sender<Result<StoreEvent, StoreError>>;

#[derive(Default)]
struct Collection {
    order: Vec<String>,
    documents: HashMap<String, StoredDocument>,
    subscribers: Vec<Feed>,
}

impl Collection {
    fn snapshot(&self) -> Vec<StoredDocument> {
        self.order
            .iter()
            .filter_map(|id| self.documents.get(id).cloned())
            .collect()
    }

    fn publish(&mut self, kind: ChangeKind, document: StoredDocument) {
        let change = DocumentChange { kind, document };
        self.subscribers
            .retain(|feed| match feed.try_send(Ok(StoreEvent::Change(change.clone()))) {
                Ok(()) => true,
                Err(TrySendError::Closed(_)) => {
                    debug!("Subscriber released its feed");
                    false
                }
                Err(TrySendError::Full(_)) => {
                    warn!("Subscriber lagging, closing its feed");
                    false
                }
            });
    }

    fn remove(&mut self, id: &str) -> Option<StoredDocument> {
        let removed = self.documents.remove(id)?;
        self.order.retain(|existing| existing != id);
        Some(removed)
    }
}

/// In-memory document store running as a single task.
///
/// Every request is handled to completion before the next one, which makes
/// version-checked updates and batches atomic.
pub struct MemoryStore {
    receiver: mpsc::Receiver<StoreRequest>,
    collections: HashMap<String, Collection>,
    next_id_fn: Box<dyn Fn() -> String + Send + Sync>,
    batch_limit: usize,
    feed_capacity: usize,
    online: bool,
}

impl MemoryStore {
    pub fn new(buffer_size: usize) -> (Self, StoreClient) {
        Self::with_id_fn(buffer_size, || Uuid::new_v4().simple().to_string())
    }

    pub fn with_id_fn(
        buffer_size: usize,
        next_id_fn: impl Fn() -> String + Send + Sync + 'static,
    ) -> (Self, StoreClient) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let store = Self {
            receiver,
            collections: HashMap::new(),
            next_id_fn: Box::new(next_id_fn),
            batch_limit: DEFAULT_BATCH_LIMIT,
            feed_capacity: DEFAULT_FEED_CAPACITY,
            online: true,
        };
        (store, StoreClient::new(sender))
    }

    pub fn with_batch_limit(mut self, batch_limit: usize) -> Self {
        self.batch_limit = batch_limit;
        self
    }

    /// Bounds every subscriber's queue. A subscriber that falls further behind
    /// has its feed closed.
    pub fn with_feed_capacity(mut self, feed_capacity: usize) -> Self {
        self.feed_capacity = feed_capacity.max(1);
        self
    }

    #[instrument(name = "memory_store", skip(self))]
    pub async fn run(mut self) {
        info!("MemoryStore starting");
        while let Some(msg) = self.receiver.recv().await {
            self.handle(msg);
        }
        info!("MemoryStore stopped");
    }

    fn handle(&mut self, msg: StoreRequest) {
        match msg {
            StoreRequest::SetOnline { online, respond_to } => {
                self.set_online(online);
                let _ = respond_to.send(Ok(()));
            }
            msg if !self.online => reject_offline(msg),
            msg => self.dispatch(msg),
        }
    }

    fn dispatch(&mut self, msg: StoreRequest) {
        match msg {
            StoreRequest::Subscribe {
                collection,
                respond_to,
            } => {
                let _ = respond_to.send(Ok(self.subscribe(collection)));
            }
            StoreRequest::Insert {
                collection,
                data,
                respond_to,
            } => {
                let id = (self.next_id_fn)();
                let coll = self.collections.entry(collection).or_default();
                let document = StoredDocument {
                    id: id.clone(),
                    version: 1,
                    data,
                };
                coll.order.push(id.clone());
                coll.documents.insert(id.clone(), document.clone());
                coll.publish(ChangeKind::Added, document);
                debug!(document_id = %id, "Document inserted");
                let _ = respond_to.send(Ok(id));
            }
            StoreRequest::Get {
                collection,
                id,
                respond_to,
            } => {
                let document = self
                    .collections
                    .get(&collection)
                    .and_then(|coll| coll.documents.get(&id).cloned());
                let _ = respond_to.send(Ok(document));
            }
            StoreRequest::Update {
                collection,
                id,
                fields,
                expected_version,
                respond_to,
            } => {
                let result = self.update(collection, id, fields, expected_version);
                let _ = respond_to.send(result);
            }
            StoreRequest::Delete {
                collection,
                id,
                respond_to,
            } => {
                let coll = self.collections.entry(collection).or_default();
                let removed = match coll.remove(&id) {
                    Some(document) => {
                        coll.publish(ChangeKind::Removed, document);
                        true
                    }
                    None => false,
                };
                let _ = respond_to.send(Ok(removed));
            }
            StoreRequest::ListAll {
                collection,
                respond_to,
            } => {
                let documents = self
                    .collections
                    .get(&collection)
                    .map(Collection::snapshot)
                    .unwrap_or_default();
                let _ = respond_to.send(Ok(documents));
            }
            StoreRequest::BatchDelete {
                collection,
                ids,
                respond_to,
            } => {
                let result = self.batch_delete(collection, ids);
                let _ = respond_to.send(result);
            }
            StoreRequest::SetOnline { .. } => {}
        }
    }

    fn subscribe(&mut self, collection: String) -> Subscription {
        let coll = self.collections.entry(collection).or_default();
        let (feed, receiver) = mpsc::channel(self.feed_capacity);
        // Capacity is non-zero and the feed is fresh, so the snapshot always fits.
        let _ = feed.try_send(Ok(StoreEvent::Snapshot(coll.snapshot())));
        coll.subscribers.push(feed);
        debug!(subscribers = coll.subscribers.len(), "Subscription opened");
        Subscription::new(receiver)
    }

    fn update(
        &mut self,
        collection: String,
        id: String,
        fields: Document,
        expected_version: Option<u64>,
    ) -> Result<u64, StoreError> {
        let coll = self.collections.entry(collection).or_default();
        let document = coll
            .documents
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        if let Some(expected) = expected_version {
            if document.version != expected {
                return Err(StoreError::VersionConflict {
                    id,
                    expected,
                    actual: document.version,
                });
            }
        }

        document.data.extend(fields);
        document.version += 1;
        let version = document.version;
        let snapshot = document.clone();
        coll.publish(ChangeKind::Modified, snapshot);
        Ok(version)
    }

    fn batch_delete(&mut self, collection: String, ids: Vec<String>) -> Result<usize, StoreError> {
        if ids.len() > self.batch_limit {
            return Err(StoreError::BatchTooLarge {
                size: ids.len(),
                limit: self.batch_limit,
            });
        }
        let coll = self.collections.entry(collection).or_default();
        let mut removed = 0;
        for id in &ids {
            if let Some(document) = coll.remove(id) {
                coll.publish(ChangeKind::Removed, document);
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn set_online(&mut self, online: bool) {
        if self.online == online {
            return;
        }
        self.online = online;
        if online {
            info!("MemoryStore back online");
            return;
        }
        warn!("MemoryStore going offline, dropping all feeds");
        for coll in self.collections.values_mut() {
            for feed in coll.subscribers.drain(..) {
                let _ = feed.try_send(Err(StoreError::Unavailable("transport lost".into())));
            }
        }
    }
}

fn offline<T>() -> Result<T, StoreError> {
    Err(StoreError::Unavailable("store offline".into()))
}

fn reject_offline(msg: StoreRequest) {
    match msg {
        StoreRequest::Subscribe { respond_to, .. } => {
            let _ = respond_to.send(offline());
        }
        StoreRequest::Insert { respond_to, .. } => {
            let _ = respond_to.send(offline());
        }
        StoreRequest::Get { respond_to, .. } => {
            let _ = respond_to.send(offline());
        }
        StoreRequest::Update { respond_to, .. } => {
            let _ = respond_to.send(offline());
        }
        StoreRequest::Delete { respond_to, .. } => {
            let _ = respond_to.send(offline());
        }
        StoreRequest::ListAll { respond_to, .. } => {
            let _ = respond_to.send(offline());
        }
        StoreRequest::BatchDelete { respond_to, .. } => {
            let _ = respond_to.send(offline());
        }
        StoreRequest::SetOnline { respond_to, .. } => {
            let _ = respond_to.send(Ok(()));
        }
    }
}

// =============================================================================
// THE CLIENT
// =============================================================================

/// Cloneable handle to a [`MemoryStore`] task.
#[derive(Clone)]
pub struct StoreClient {
    sender: mpsc::Sender<StoreRequest>,
}

impl StoreClient {
    pub fn new(sender: mpsc::Sender<StoreRequest>) -> Self {
        Self { sender }
    }

    async fn request<T, F>(&self, build: F) -> Result<T, StoreError>
    where
        T: Send,
        F: FnOnce(StoreResponse<T>) -> StoreRequest + Send,
    {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(build(respond_to))
            .await
            .map_err(|_| StoreError::Closed)?;
        response.await.map_err(|_| StoreError::Closed)?
    }

    /// Simulates losing (or regaining) the connection to the store.
    pub async fn set_online(&self, online: bool) -> Result<(), StoreError> {
        self.request(|respond_to| StoreRequest::SetOnline { online, respond_to })
            .await
    }
}

#[async_trait]
impl DocumentStore for StoreClient {
    async fn subscribe(&self, collection: &str) -> Result<Subscription, StoreError> {
        let collection = collection.to_string();
        self.request(|respond_to| StoreRequest::Subscribe {
            collection,
            respond_to,
        })
        .await
    }

    async fn insert(&self, collection: &str, data: Document) -> Result<String, StoreError> {
        let collection = collection.to_string();
        self.request(|respond_to| StoreRequest::Insert {
            collection,
            data,
            respond_to,
        })
        .await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let (collection, id) = (collection.to_string(), id.to_string());
        self.request(|respond_to| StoreRequest::Delete {
            collection,
            id,
            respond_to,
        })
        .await
    }

    async fn get(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<StoredDocument>, StoreError> {
        let (collection, id) = (collection.to_string(), id.to_string());
        self.request(|respond_to| StoreRequest::Get {
            collection,
            id,
            respond_to,
        })
        .await
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Document,
        expected_version: Option<u64>,
    ) -> Result<u64, StoreError> {
        let (collection, id) = (collection.to_string(), id.to_string());
        self.request(|respond_to| StoreRequest::Update {
            collection,
            id,
            fields,
            expected_version,
            respond_to,
        })
        .await
    }

    async fn list_all(&self, collection: &str) -> Result<Vec<StoredDocument>, StoreError> {
        let collection = collection.to_string();
        self.request(|respond_to| StoreRequest::ListAll {
            collection,
            respond_to,
        })
        .await
    }

    async fn batch_delete(&self, collection: &str, ids: &[String]) -> Result<usize, StoreError> {
        let (collection, ids) = (collection.to_string(), ids.to_vec());
        self.request(|respond_to| StoreRequest::BatchDelete {
            collection,
            ids,
            respond_to,
        })
        .await
    }
}
