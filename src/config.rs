//! Runtime configuration.
//!
//! Values come from an optional YAML file overridden by `CATALOG_*` environment
//! variables, e.g. `CATALOG_STORE_TIMEOUT_MS=2000`.

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::cache::BackoffPolicy;

pub const DEFAULT_PLACEHOLDER_IMAGE: &str =
    "https://images.unsplash.com/photo-1542291026-7eec264c27ff?w=800&q=80";

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CatalogConfig {
    /// Store collection holding the products.
    pub collection: String,
    /// Upper bound for every single store call.
    pub store_timeout_ms: u64,
    /// Optimistic attempts per review append before giving up.
    pub max_review_attempts: u32,
    /// Writes per atomic batch when clearing the catalog.
    pub batch_limit: usize,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
    /// Image used when a product is created without any.
    pub placeholder_image: String,
    /// Shared secret for the admin surface. Admin access is refused when unset.
    pub admin_secret: Option<String>,
    pub channel_buffer: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            collection: "products".to_string(),
            store_timeout_ms: 5_000,
            max_review_attempts: 5,
            batch_limit: 500,
            backoff_initial_ms: 250,
            backoff_max_ms: 30_000,
            placeholder_image: DEFAULT_PLACEHOLDER_IMAGE.to_string(),
            admin_secret: None,
            channel_buffer: 32,
        }
    }
}

impl CatalogConfig {
    /// Loads the configuration, layering the environment over `path` if given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_layered(path, Environment::with_prefix("CATALOG"))
    }

    fn load_layered(path: Option<&Path>, environment: Environment) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }
        builder
            .add_source(environment.try_parsing(true))
            .build()?
            .try_deserialize()
    }

    /// Writes per batch, never less than one. Both the repository and the
    /// in-memory store size their batches from this.
    pub fn batch_limit(&self) -> usize {
        self.batch_limit.max(1)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(self.backoff_initial_ms),
            Duration::from_millis(self.backoff_max_ms),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_when_nothing_configured() {
        let config = CatalogConfig::load(None).unwrap();
        assert_eq!(config.collection, "products");
        assert_eq!(config.batch_limit, 500);
        assert_eq!(config.placeholder_image, DEFAULT_PLACEHOLDER_IMAGE);
        assert_eq!(config.store_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_yaml_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "collection: listings").unwrap();
        writeln!(file, "max_review_attempts: 9").unwrap();
        writeln!(file, "admin_secret: hunter2").unwrap();

        let config = CatalogConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.collection, "listings");
        assert_eq!(config.max_review_attempts, 9);
        assert_eq!(config.admin_secret.as_deref(), Some("hunter2"));
        assert_eq!(config.backoff_initial_ms, 250);
    }

    fn catalog_env(vars: &[(&str, &str)]) -> Environment {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Environment::with_prefix("CATALOG").source(Some(vars))
    }

    #[test]
    fn test_environment_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "store_timeout_ms: 900").unwrap();
        writeln!(file, "collection: listings").unwrap();

        let env = catalog_env(&[
            ("CATALOG_STORE_TIMEOUT_MS", "1234"),
            ("CATALOG_BATCH_LIMIT", "50"),
            ("OTHER_COLLECTION", "ignored"),
        ]);
        let config = CatalogConfig::load_layered(Some(file.path()), env).unwrap();
        assert_eq!(config.store_timeout(), Duration::from_millis(1234));
        assert_eq!(config.batch_limit(), 50);
        assert_eq!(config.collection, "listings");
    }

    #[test]
    fn test_batch_limit_never_zero() {
        let config = CatalogConfig {
            batch_limit: 0,
            ..Default::default()
        };
        assert_eq!(config.batch_limit(), 1);
        assert_eq!(CatalogConfig::default().batch_limit(), 500);
    }

    #[test]
    fn test_missing_file_is_optional() {
        let config = CatalogConfig::load(Some(Path::new("/nonexistent/catalog.yaml"))).unwrap();
        assert_eq!(config, CatalogConfig::default());
    }
}
