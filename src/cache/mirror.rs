use std::collections::HashSet;

use tracing::warn;

use crate::domain::Product;
use crate::store::{ChangeKind, DocumentChange, StoredDocument};

/// Ordered in-memory copy of the collection, keyed by document id.
#[derive(Debug, Default)]
pub(crate) struct Mirror {
    products: Vec<Product>,
    rejected: HashSet<String>,
}

impl Mirror {
    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn skipped(&self) -> usize {
        self.rejected.len()
    }

    pub fn replace_all(&mut self, documents: Vec<StoredDocument>) {
        self.products.clear();
        self.rejected.clear();
        for document in &documents {
            self.upsert(document);
        }
    }

    pub fn apply(&mut self, change: &DocumentChange) {
        match change.kind {
            ChangeKind::Added | ChangeKind::Modified => self.upsert(&change.document),
            ChangeKind::Removed => {
                self.evict(&change.document.id);
                self.rejected.remove(&change.document.id);
            }
        }
    }

    fn upsert(&mut self, document: &StoredDocument) {
        match Product::from_document(document) {
            Ok(product) => {
                self.rejected.remove(&document.id);
                match self.products.iter_mut().find(|p| p.id == product.id) {
                    Some(slot) => *slot = product,
                    None => self.products.push(product),
                }
            }
            Err(e) => {
                warn!(document_id = %document.id, error = %e, "Skipping undecodable product");
                self.evict(&document.id);
                self.rejected.insert(document.id.clone());
            }
        }
    }

    fn evict(&mut self, id: &str) {
        self.products.retain(|p| p.id.as_str() != id);
    }
}
