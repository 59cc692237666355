use std::sync::Arc;
use std::time::Duration;

use crate::domain::Product;

/// Connection state of the cache's store subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncState {
    Connecting,
    Live,
    /// The feed failed. The last-known products are still served but may be stale.
    Degraded {
        reason: String,
        attempt: u32,
        retry_in: Duration,
    },
    Closed,
}

/// What consumers see: the product list plus the health of the feed behind it.
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    pub products: Arc<Vec<Product>>,
    pub state: SyncState,
    /// True until a full snapshot has been applied, and again after a forced resync.
    pub loading: bool,
    /// Documents present in the store that could not be decoded.
    pub skipped: usize,
}

impl CatalogSnapshot {
    pub fn initial() -> Self {
        Self {
            products: Arc::new(Vec::new()),
            state: SyncState::Connecting,
            loading: true,
            skipped: 0,
        }
    }

    pub fn get(&self, id: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.id.as_str() == id)
    }

    pub fn is_live(&self) -> bool {
        self.state == SyncState::Live
    }
}

/// Exponential reconnect delay: `initial * 2^(attempt-1)`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    initial: Duration,
    max: Duration,
}

impl BackoffPolicy {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial.saturating_mul(factor).min(self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_until_cap() {
        let policy = BackoffPolicy::new(Duration::from_millis(100), Duration::from_secs(1));
        assert_eq!(policy.delay(1), Duration::from_millis(100));
        assert_eq!(policy.delay(2), Duration::from_millis(200));
        assert_eq!(policy.delay(4), Duration::from_millis(800));
        assert_eq!(policy.delay(5), Duration::from_secs(1));
        assert_eq!(policy.delay(64), Duration::from_secs(1));
    }
}
