use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use super::AdminGate;
use crate::cache::{CatalogSnapshot, LiveCatalogCache, SyncState};
use crate::config::CatalogConfig;
use crate::domain::{Product, ProductId, ProductInput, ProductPatch, ReviewInput};
use crate::error::CatalogError;
use crate::query;
use crate::repository::CatalogRepository;
use crate::store::{DocumentStore, MemoryStore};

/// The catalog service: one live cache for every reader, one repository for
/// every writer.
///
/// Built once per process and shared. Writes return the committed product
/// directly; the cache reflects them once the store's feed delivers the change.
pub struct CatalogSystem {
    repository: CatalogRepository,
    cache: LiveCatalogCache,
    gate: AdminGate,
    handles: Vec<JoinHandle<()>>,
}

impl CatalogSystem {
    /// Starts the service against an existing store.
    pub fn start(store: Arc<dyn DocumentStore>, config: CatalogConfig) -> Self {
        info!(collection = %config.collection, "Starting catalog system");

        let probe = tokio::spawn(probe_store(
            store.clone(),
            config.collection.clone(),
            config.store_timeout(),
        ));
        let repository = CatalogRepository::new(store.clone(), &config);
        let cache = LiveCatalogCache::spawn(store, config.collection.clone(), config.backoff());

        Self {
            repository,
            cache,
            gate: AdminGate::new(config.admin_secret),
            handles: vec![probe],
        }
    }

    /// Starts the service together with its own in-memory store.
    pub fn in_memory(config: CatalogConfig) -> Self {
        let (store, client) = MemoryStore::new(config.channel_buffer);
        let store_handle = tokio::spawn(store.with_batch_limit(config.batch_limit()).run());

        let mut system = Self::start(Arc::new(client), config);
        system.handles.push(store_handle);
        system
    }

    // -------------------------------------------------------------------------
    // Reads, always served from the cache
    // -------------------------------------------------------------------------

    pub fn products(&self) -> Arc<Vec<Product>> {
        self.cache.products()
    }

    pub fn loading(&self) -> bool {
        self.cache.loading()
    }

    pub fn state(&self) -> SyncState {
        self.cache.state()
    }

    pub fn snapshot(&self) -> CatalogSnapshot {
        self.cache.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<CatalogSnapshot> {
        self.cache.subscribe()
    }

    pub fn product(&self, id: &str) -> Option<Product> {
        self.cache.snapshot().get(id).cloned()
    }

    pub fn search(&self, search_text: &str, category: &str) -> Vec<Product> {
        let products = self.cache.products();
        query::filter(&products, search_text, category)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn categories(&self) -> Vec<String> {
        query::categories(&self.cache.products())
    }

    pub async fn wait_until<F>(&self, predicate: F) -> Result<CatalogSnapshot, CatalogError>
    where
        F: FnMut(&CatalogSnapshot) -> bool,
    {
        self.cache.wait_until(predicate).await
    }

    pub async fn resync(&self) -> Result<(), CatalogError> {
        self.cache.resync().await
    }

    // -------------------------------------------------------------------------
    // Writes, straight to the store
    // -------------------------------------------------------------------------

    pub async fn add_product(&self, input: ProductInput) -> Result<Product, CatalogError> {
        self.repository.create(input).await
    }

    pub async fn update_product(
        &self,
        id: &ProductId,
        patch: ProductPatch,
    ) -> Result<Product, CatalogError> {
        self.repository.update(id, patch).await
    }

    pub async fn delete_product(&self, id: &ProductId) -> Result<(), CatalogError> {
        self.repository.delete(id).await
    }

    pub async fn clear_all_products(&self) -> Result<usize, CatalogError> {
        self.repository.delete_all().await
    }

    pub async fn add_review(
        &self,
        id: &ProductId,
        review: ReviewInput,
    ) -> Result<Product, CatalogError> {
        self.repository.append_review(id, review).await
    }

    pub fn verify_admin(&self, attempt: &str) -> Result<(), CatalogError> {
        self.gate.verify(attempt).inspect_err(|_| warn!("Admin secret rejected"))
    }

    /// Stops the cache, releases the store and waits for background tasks.
    pub async fn shutdown(self) -> Result<(), CatalogError> {
        info!("Shutting down catalog system...");
        self.cache.shutdown().await;
        // The in-memory store stops once the last client is gone.
        drop(self.repository);

        for handle in self.handles {
            if let Err(e) = handle.await {
                error!("Background task failed: {:?}", e);
                return Err(CatalogError::StoreUnavailable(format!(
                    "background task failed: {}",
                    e
                )));
            }
        }

        info!("Catalog system shutdown complete.");
        Ok(())
    }
}

/// Logs whether the collection is reachable. Never fails startup.
#[instrument(skip(store, timeout))]
async fn probe_store(store: Arc<dyn DocumentStore>, collection: String, timeout: Duration) {
    match tokio::time::timeout(timeout, store.list_all(&collection)).await {
        Ok(Ok(documents)) => info!(documents = documents.len(), "Store reachable"),
        Ok(Err(e)) => warn!(error = %e, "Store probe failed"),
        Err(_) => warn!(timeout_ms = timeout.as_millis() as u64, "Store probe timed out"),
    }
}
