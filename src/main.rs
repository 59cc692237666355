use std::time::Duration;

use tracing::{error, info, warn, Instrument};

use catalog_sync::query::ALL_CATEGORIES;
use catalog_sync::{setup_tracing, CatalogConfig, CatalogSystem, ProductInput, ReviewInput};

#[tokio::main]
async fn main() -> Result<(), String> {
    // Setup tracing once for the entire application
    setup_tracing();

    let config_path = std::env::args().nth(1);
    let config = CatalogConfig::load(config_path.as_deref().map(std::path::Path::new))
        .map_err(|e| e.to_string())?;

    info!(collection = %config.collection, "Starting catalog demo");

    // In-memory store, cache and repository in one
    let system = CatalogSystem::in_memory(config);

    let wait = Duration::from_secs(5);
    tokio::time::timeout(wait, system.wait_until(|s| !s.loading))
        .await
        .map_err(|_| "catalog never finished loading".to_string())?
        .map_err(|e| e.to_string())?;

    let span = tracing::info_span!("product_creation");
    let product = async {
        info!("Creating demo products");
        system
            .add_product(
                ProductInput::new("Leather Wallet", 1500u32, "https://www.daraz.com.bd/wallet")
                    .with_category("Accessories")
                    .with_description("Slim bifold"),
            )
            .await
            .map_err(|e| e.to_string())?;
        system
            .add_product(
                ProductInput::new("Sony WH-1000XM4", "25000", "https://www.daraz.com.bd/sony")
                    .with_category("Electronics")
                    .with_description("Noise cancelling headphones"),
            )
            .await
            .map_err(|e| e.to_string())
    }
    .instrument(span)
    .await?;

    info!(product_id = %product.id, "Products created");

    // Two shoppers review at once; neither review is lost
    let span = tracing::info_span!("reviews");
    let (a, b) = async {
        tokio::join!(
            system.add_review(&product.id, ReviewInput::new("Alice", 5, "Great sound")),
            system.add_review(&product.id, ReviewInput::new("Bob", 3, "Tight fit")),
        )
    }
    .instrument(span)
    .await;
    for result in [a, b] {
        if let Err(e) = result {
            error!(error = %e, "Review failed");
        }
    }

    let id = product.id.clone();
    let snapshot = tokio::time::timeout(
        wait,
        system.wait_until(|s| s.get(id.as_str()).map(|p| p.review_count) == Some(2)),
    )
    .await
    .map_err(|_| "reviews never reached the cache".to_string())?
    .map_err(|e| e.to_string())?;

    if let Some(live) = snapshot.get(id.as_str()) {
        info!(rating = live.rating, reviews = live.review_count, "Cache caught up");
    }

    info!(categories = ?system.categories(), "Categories");
    for found in system.search("sony", ALL_CATEGORIES) {
        info!(name = %found.name, price = found.price, "Search hit");
    }

    match system.verify_admin("not-the-secret") {
        Ok(()) => info!("Admin access granted"),
        Err(e) => warn!(error = %e, "Admin access denied"),
    }

    match system.clear_all_products().await {
        Ok(removed) => info!(removed, "Catalog cleared"),
        Err(e) => error!(error = %e, "Clear failed"),
    }

    // Shutdown system gracefully
    system.shutdown().await.map_err(|e| e.to_string())?;

    info!("Demo completed successfully");
    Ok(())
}
