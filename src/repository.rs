//! The only write path to the product collection.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use crate::config::CatalogConfig;
use crate::domain::{Product, ProductId, ProductInput, ProductPatch, ReviewInput};
use crate::error::CatalogError;
use crate::store::{DocumentStore, StoreError};

#[derive(Clone)]
pub struct CatalogRepository {
    store: Arc<dyn DocumentStore>,
    collection: String,
    timeout: Duration,
    max_review_attempts: u32,
    batch_limit: usize,
    placeholder_image: String,
}

impl CatalogRepository {
    pub fn new(store: Arc<dyn DocumentStore>, config: &CatalogConfig) -> Self {
        Self {
            store,
            collection: config.collection.clone(),
            timeout: config.store_timeout(),
            max_review_attempts: config.max_review_attempts.max(1),
            batch_limit: config.batch_limit(),
            placeholder_image: config.placeholder_image.clone(),
        }
    }

    /// Bounds a store call by the configured timeout.
    async fn call<T, F>(&self, operation: &'static str, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation, timeout_ms = self.timeout.as_millis() as u64, "Store call timed out");
                Err(StoreError::Unavailable(format!(
                    "{} timed out after {:?}",
                    operation, self.timeout
                )))
            }
        }
    }

    /// Validates, fills defaults and persists a new product.
    ///
    /// # Errors
    /// `Validation` before anything is written, `StoreUnavailable` if the
    /// insert cannot be committed. Never retried here.
    #[instrument(skip(self, input), fields(product_name = %input.name))]
    pub async fn create(&self, input: ProductInput) -> Result<Product, CatalogError> {
        let mut product = input.into_product(&self.placeholder_image, Utc::now())?;
        let data = product.to_document()?;

        let id = self
            .call("insert", self.store.insert(&self.collection, data))
            .await
            .map_err(|e| {
                error!(error = %e, "Product insert failed");
                CatalogError::from(e)
            })?;

        product.id = ProductId::new(id);
        info!(product_id = %product.id, "Product created");
        Ok(product)
    }

    /// Reads one product straight from the store.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn get(&self, id: &ProductId) -> Result<Product, CatalogError> {
        let stored = self
            .call("get", self.store.get(&self.collection, id.as_str()))
            .await?
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))?;
        Product::from_document(&stored)
    }

    /// Replaces any subset of the editable fields and returns the updated product.
    #[instrument(skip(self, patch), fields(product_id = %id))]
    pub async fn update(&self, id: &ProductId, patch: ProductPatch) -> Result<Product, CatalogError> {
        if patch.is_empty() {
            debug!("Empty patch");
            return self.get(id).await;
        }
        let fields = patch.into_fields(&self.placeholder_image)?;
        self.call(
            "update",
            self.store.update(&self.collection, id.as_str(), fields, None),
        )
        .await?;
        info!("Product updated");
        self.get(id).await
    }

    /// Removes one product. Deleting an id that does not exist succeeds.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn delete(&self, id: &ProductId) -> Result<(), CatalogError> {
        let removed = self
            .call("delete", self.store.delete(&self.collection, id.as_str()))
            .await?;
        if removed {
            info!("Product deleted");
        } else {
            debug!("Product already absent");
        }
        Ok(())
    }

    /// Removes every product present at enumeration time and returns how many
    /// were removed.
    ///
    /// Ids are committed in atomic batches of at most `batch_limit`. When a
    /// batch fails after earlier ones committed the result is `PartialCommit`;
    /// when the first one fails nothing was removed and the store error is
    /// returned as is.
    #[instrument(skip(self))]
    pub async fn delete_all(&self) -> Result<usize, CatalogError> {
        let ids: Vec<String> = self
            .call("list_all", self.store.list_all(&self.collection))
            .await?
            .into_iter()
            .map(|doc| doc.id)
            .collect();
        let total = ids.len();
        let mut committed = 0;
        let mut removed = 0;

        for batch in ids.chunks(self.batch_limit) {
            match self
                .call("batch_delete", self.store.batch_delete(&self.collection, batch))
                .await
            {
                Ok(count) => {
                    committed += batch.len();
                    removed += count;
                    debug!(committed, total, "Batch committed");
                }
                Err(e) if committed == 0 => {
                    error!(error = %e, "Bulk delete failed, nothing removed");
                    return Err(e.into());
                }
                Err(e) => {
                    error!(error = %e, committed, total, "Bulk delete partially committed");
                    return Err(CatalogError::PartialCommit {
                        committed,
                        total,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(removed, "Catalog cleared");
        Ok(removed)
    }

    /// Appends a review and recomputes `rating` and `reviewCount` in the same write.
    ///
    /// The write is conditional on the version that was read. A concurrent
    /// writer makes it fail, in which case the product is re-read and the
    /// append replayed, up to `max_review_attempts` times.
    ///
    /// # Errors
    /// `NotFound` if the product is gone at read time, `ConcurrencyConflict`
    /// once the attempts are exhausted.
    #[instrument(skip(self, input), fields(product_id = %id, rating = input.rating))]
    pub async fn append_review(
        &self,
        id: &ProductId,
        input: ReviewInput,
    ) -> Result<Product, CatalogError> {
        let review = input.into_review(Utc::now())?;

        for attempt in 1..=self.max_review_attempts {
            let stored = self
                .call("get", self.store.get(&self.collection, id.as_str()))
                .await?
                .ok_or_else(|| CatalogError::NotFound(id.to_string()))?;

            let mut product = Product::from_document(&stored)?;
            product.push_review(review.clone());
            let fields = product.review_fields()?;

            match self
                .call(
                    "update",
                    self.store
                        .update(&self.collection, id.as_str(), fields, Some(stored.version)),
                )
                .await
            {
                Ok(_) => {
                    info!(
                        attempt,
                        new_rating = product.rating,
                        review_count = product.review_count,
                        "Review appended"
                    );
                    return Ok(product);
                }
                Err(StoreError::VersionConflict { actual, .. }) => {
                    warn!(attempt, read_version = stored.version, actual, "Concurrent write, retrying");
                }
                Err(e) => {
                    error!(error = %e, "Review append failed");
                    return Err(e.into());
                }
            }
        }

        Err(CatalogError::ConcurrencyConflict {
            id: id.to_string(),
            attempts: self.max_review_attempts,
        })
    }
}
