//! Real-time product catalog: a live, push-synchronized view of a remote
//! document collection plus the write path that mutates it.
//!
//! Readers go through [`cache::LiveCatalogCache`], writers through
//! [`repository::CatalogRepository`]. [`app_system::CatalogSystem`] wires both
//! to one [`store::DocumentStore`].

pub mod app_system;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod query;
pub mod repository;
pub mod store;

#[cfg(test)]
mod mock_framework;

pub use app_system::{setup_tracing, AdminGate, CatalogSystem};
pub use cache::{CatalogSnapshot, LiveCatalogCache, SyncState};
pub use config::CatalogConfig;
pub use domain::{Product, ProductId, ProductInput, ProductPatch, Review, ReviewInput};
pub use error::{CatalogError, ValidationError};
pub use repository::CatalogRepository;
pub use store::{DocumentStore, MemoryStore, StoreClient, StoreError};
