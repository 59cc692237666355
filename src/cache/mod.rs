//! Live, read-only mirror of the product collection.
//!
//! A single background task holds the store subscription and republishes the
//! whole product list after every event. Consumers never touch the store: they
//! read the latest [`CatalogSnapshot`] or watch for new ones. A local mutation
//! shows up here only once the store has echoed it back through the feed.

mod mirror;
mod state;

pub use state::{BackoffPolicy, CatalogSnapshot, SyncState};

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::domain::Product;
use crate::error::CatalogError;
use crate::store::{DocumentStore, StoreEvent, Subscription};
use mirror::Mirror;

#[derive(Debug)]
enum CacheCommand {
    Resync,
    Shutdown,
}

enum FeedOutcome {
    Failed(String),
    Resync,
    Shutdown,
}

// =============================================================================
// THE HANDLE
// =============================================================================

pub struct LiveCatalogCache {
    view: watch::Receiver<CatalogSnapshot>,
    commands: mpsc::Sender<CacheCommand>,
    handle: Option<JoinHandle<()>>,
}

impl LiveCatalogCache {
    /// Starts the subscription task. Must be called inside a Tokio runtime.
    pub fn spawn(
        store: Arc<dyn DocumentStore>,
        collection: impl Into<String>,
        backoff: BackoffPolicy,
    ) -> Self {
        let (publisher, view) = watch::channel(CatalogSnapshot::initial());
        let (commands, command_rx) = mpsc::channel(8);
        let worker = CacheWorker {
            store,
            collection: collection.into(),
            backoff,
            publisher,
            commands: command_rx,
            mirror: Mirror::default(),
            loading: true,
        };
        let handle = tokio::spawn(worker.run());
        Self {
            view,
            commands,
            handle: Some(handle),
        }
    }

    pub fn snapshot(&self) -> CatalogSnapshot {
        self.view.borrow().clone()
    }

    pub fn products(&self) -> Arc<Vec<Product>> {
        self.view.borrow().products.clone()
    }

    pub fn loading(&self) -> bool {
        self.view.borrow().loading
    }

    pub fn state(&self) -> SyncState {
        self.view.borrow().state.clone()
    }

    /// A receiver that is notified on every republished snapshot.
    pub fn subscribe(&self) -> watch::Receiver<CatalogSnapshot> {
        self.view.clone()
    }

    /// Resolves with the first snapshot (current or future) matching `predicate`.
    pub async fn wait_until<F>(&self, mut predicate: F) -> Result<CatalogSnapshot, CatalogError>
    where
        F: FnMut(&CatalogSnapshot) -> bool,
    {
        let mut view = self.view.clone();
        let snapshot = view
            .wait_for(|snapshot| predicate(snapshot))
            .await
            .map_err(|_| CatalogError::StoreUnavailable("catalog cache stopped".into()))?;
        Ok(snapshot.clone())
    }

    /// Drops the current feed and subscribes again from a fresh snapshot.
    pub async fn resync(&self) -> Result<(), CatalogError> {
        self.commands
            .send(CacheCommand::Resync)
            .await
            .map_err(|_| CatalogError::StoreUnavailable("catalog cache stopped".into()))
    }

    /// Stops the task and waits until the store feed has been released.
    pub async fn shutdown(mut self) {
        let _ = self.commands.send(CacheCommand::Shutdown).await;
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Catalog cache task failed");
            }
        }
    }
}

impl Drop for LiveCatalogCache {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

// =============================================================================
// THE SUBSCRIPTION TASK
// =============================================================================

struct CacheWorker {
    store: Arc<dyn DocumentStore>,
    collection: String,
    backoff: BackoffPolicy,
    publisher: watch::Sender<CatalogSnapshot>,
    commands: mpsc::Receiver<CacheCommand>,
    mirror: Mirror,
    loading: bool,
}

impl CacheWorker {
    #[instrument(name = "catalog_cache", skip(self), fields(collection = %self.collection))]
    async fn run(mut self) {
        info!("Catalog cache starting");
        let mut attempt = 0u32;

        loop {
            self.publish(SyncState::Connecting);
            let subscribed = self.store.subscribe(&self.collection).await;
            let outcome = match subscribed {
                Ok(subscription) => self.consume(subscription, &mut attempt).await,
                Err(e) => FeedOutcome::Failed(e.to_string()),
            };

            match outcome {
                FeedOutcome::Shutdown => break,
                FeedOutcome::Resync => {
                    info!("Forced resync");
                    attempt = 0;
                    self.loading = true;
                }
                FeedOutcome::Failed(reason) => {
                    attempt += 1;
                    let retry_in = self.backoff.delay(attempt);
                    warn!(%reason, attempt, retry_in_ms = retry_in.as_millis() as u64, "Catalog feed degraded");
                    self.publish(SyncState::Degraded {
                        reason,
                        attempt,
                        retry_in,
                    });

                    tokio::select! {
                        _ = tokio::time::sleep(retry_in) => {}
                        command = self.commands.recv() => match command {
                            Some(CacheCommand::Resync) => {
                                attempt = 0;
                                self.loading = true;
                            }
                            Some(CacheCommand::Shutdown) | None => break,
                        },
                    }
                }
            }
        }

        self.publish(SyncState::Closed);
        info!("Catalog cache stopped");
    }

    /// Applies events until the feed fails or a command interrupts it.
    /// The subscription is dropped, and with it the feed, on return.
    async fn consume(&mut self, mut subscription: Subscription, attempt: &mut u32) -> FeedOutcome {
        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    return match command {
                        Some(CacheCommand::Resync) => FeedOutcome::Resync,
                        Some(CacheCommand::Shutdown) | None => FeedOutcome::Shutdown,
                    };
                }
                event = subscription.next() => match event {
                    Some(Ok(StoreEvent::Snapshot(documents))) => {
                        self.mirror.replace_all(documents);
                        self.loading = false;
                        *attempt = 0;
                        info!(products = self.mirror.products().len(), "Snapshot applied");
                        self.publish(SyncState::Live);
                    }
                    Some(Ok(StoreEvent::Change(change))) => {
                        debug!(document_id = %change.document.id, kind = ?change.kind, "Change applied");
                        self.mirror.apply(&change);
                        self.publish(SyncState::Live);
                    }
                    Some(Err(e)) => return FeedOutcome::Failed(e.to_string()),
                    None => return FeedOutcome::Failed("feed closed by store".into()),
                },
            }
        }
    }

    fn publish(&self, state: SyncState) {
        self.publisher.send_replace(CatalogSnapshot {
            products: Arc::new(self.mirror.products().to_vec()),
            state,
            loading: self.loading,
            skipped: self.mirror.skipped(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ProductInput;
    use crate::store::{MemoryStore, StoreClient};
    use chrono::Utc;
    use std::time::Duration;
    use tokio::time::timeout;

    const COLL: &str = "products";
    const WAIT: Duration = Duration::from_secs(5);

    fn start_store() -> StoreClient {
        let (store, client) = MemoryStore::new(32);
        tokio::spawn(store.run());
        client
    }

    fn fast_backoff() -> BackoffPolicy {
        BackoffPolicy::new(Duration::from_millis(10), Duration::from_millis(40))
    }

    async fn insert(store: &StoreClient, name: &str) -> String {
        let product = ProductInput::new(name, 100u32, "https://x")
            .into_product("https://img/p.jpg", Utc::now())
            .unwrap();
        store
            .insert(COLL, product.to_document().unwrap())
            .await
            .unwrap()
    }

    async fn wait(cache: &LiveCatalogCache, f: impl FnMut(&CatalogSnapshot) -> bool) -> CatalogSnapshot {
        timeout(WAIT, cache.wait_until(f)).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_loads_snapshot_then_follows_changes() {
        let store = start_store();
        let first = insert(&store, "Headphones").await;

        let cache = LiveCatalogCache::spawn(Arc::new(store.clone()), COLL, fast_backoff());
        let snapshot = wait(&cache, |s| !s.loading).await;
        assert!(snapshot.is_live());
        assert_eq!(snapshot.products.len(), 1);
        assert_eq!(snapshot.products[0].id.as_str(), first);

        let second = insert(&store, "Keyboard").await;
        let snapshot = wait(&cache, |s| s.products.len() == 2).await;
        assert_eq!(snapshot.get(&second).unwrap().name, "Keyboard");

        store.delete(COLL, &first).await.unwrap();
        let snapshot = wait(&cache, |s| s.products.len() == 1).await;
        assert!(snapshot.get(&first).is_none());
        assert!(!cache.loading());

        cache.shutdown().await;
    }

    #[tokio::test]
    async fn test_degrades_and_reconnects() {
        let store = start_store();
        insert(&store, "Headphones").await;

        let cache = LiveCatalogCache::spawn(Arc::new(store.clone()), COLL, fast_backoff());
        wait(&cache, |s| s.is_live()).await;

        // 1. Transport lost: degraded, last-known products still served
        store.set_online(false).await.unwrap();
        let snapshot = wait(&cache, |s| matches!(s.state, SyncState::Degraded { .. })).await;
        assert_eq!(snapshot.products.len(), 1);
        assert!(!snapshot.loading);

        // 2. Retries keep failing while offline and the attempt count grows
        let snapshot = wait(&cache, |s| {
            matches!(s.state, SyncState::Degraded { attempt, .. } if attempt >= 2)
        })
        .await;
        if let SyncState::Degraded { retry_in, .. } = snapshot.state {
            assert!(retry_in >= Duration::from_millis(20));
        }

        // 3. Back online: fresh snapshot, live again
        store.set_online(true).await.unwrap();
        insert(&store, "Keyboard").await;
        let snapshot = wait(&cache, |s| s.is_live() && s.products.len() == 2).await;
        assert_eq!(snapshot.products[1].name, "Keyboard");

        cache.shutdown().await;
    }

    #[tokio::test]
    async fn test_resync_reloads() {
        let store = start_store();
        insert(&store, "Headphones").await;

        let cache = LiveCatalogCache::spawn(Arc::new(store.clone()), COLL, fast_backoff());
        wait(&cache, |s| !s.loading).await;

        // Offline so the forced resubscription cannot complete yet.
        store.set_online(false).await.unwrap();
        cache.resync().await.unwrap();
        let snapshot = wait(&cache, |s| s.loading).await;
        assert_eq!(snapshot.products.len(), 1);
        assert!(!snapshot.is_live());

        store.set_online(true).await.unwrap();
        let snapshot = wait(&cache, |s| !s.loading).await;
        assert!(snapshot.is_live());
        assert_eq!(snapshot.products.len(), 1);

        cache.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_closes_and_releases_feed() {
        let store = start_store();
        let cache = LiveCatalogCache::spawn(Arc::new(store.clone()), COLL, fast_backoff());
        wait(&cache, |s| s.is_live()).await;
        let mut view = cache.subscribe();

        cache.shutdown().await;
        assert_eq!(view.borrow_and_update().state, SyncState::Closed);

        // The store keeps working and no longer has anyone to publish to.
        insert(&store, "Headphones").await;
        assert_eq!(store.list_all(COLL).await.unwrap().len(), 1);
        assert!(view.changed().await.is_err());
    }

    #[tokio::test]
    async fn test_lagging_feed_resyncs_from_fresh_snapshot() {
        let (store, client) = MemoryStore::new(32);
        tokio::spawn(store.with_feed_capacity(2).run());

        let cache = LiveCatalogCache::spawn(Arc::new(client.clone()), COLL, fast_backoff());
        let mut ids = Vec::new();
        for name in ["A", "B", "C", "D", "E"] {
            ids.push(insert(&client, name).await);
        }
        wait(&cache, |s| s.is_live() && s.products.len() == 5).await;

        // Five removals published in one write overflow a feed that holds two.
        assert_eq!(client.batch_delete(COLL, &ids).await.unwrap(), 5);
        let snapshot = wait(&cache, |s| matches!(s.state, SyncState::Degraded { .. })).await;
        assert!(!snapshot.loading);

        let snapshot = wait(&cache, |s| s.is_live()).await;
        assert!(snapshot.products.is_empty());
        assert!(!snapshot.loading);

        cache.shutdown().await;
    }

    #[tokio::test]
    async fn test_drop_aborts_task() {
        let store = start_store();
        insert(&store, "Headphones").await;

        let cache = LiveCatalogCache::spawn(Arc::new(store.clone()), COLL, fast_backoff());
        wait(&cache, |s| s.is_live()).await;
        let mut view = cache.subscribe();
        let _ = view.borrow_and_update();

        drop(cache);

        // The task is gone without publishing a final state.
        assert!(timeout(WAIT, view.changed()).await.unwrap().is_err());
        assert!(view.borrow().is_live());
        assert_eq!(view.borrow().products.len(), 1);

        // Its feed is released; the store keeps serving writes.
        insert(&store, "Keyboard").await;
        assert_eq!(store.list_all(COLL).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_subscribe_failure_is_visible() {
        let store = start_store();
        store.set_online(false).await.unwrap();

        let cache = LiveCatalogCache::spawn(Arc::new(store.clone()), COLL, fast_backoff());
        let snapshot = wait(&cache, |s| matches!(s.state, SyncState::Degraded { .. })).await;
        assert!(snapshot.loading);
        assert!(snapshot.products.is_empty());

        store.set_online(true).await.unwrap();
        let snapshot = wait(&cache, |s| !s.loading).await;
        assert!(snapshot.is_live());

        cache.shutdown().await;
    }
}
