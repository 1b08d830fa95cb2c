use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::{Connection, ConnectionRateLimiter};

/// Maps connection keys to their rate limiters, creating each lazily on
/// first use.
///
/// A registry is plain owned state: construct one, hold it wherever your
/// application keeps long-lived state, and share it by reference. Entries
/// are never evicted; a limiter lives as long as its registry (or until
/// [`stop_all`](Registry::stop_all)).
#[derive(Default)]
pub struct Registry {
    limiters: Mutex<HashMap<String, Arc<ConnectionRateLimiter>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the limiter for `connection`'s key, creating it if this is the
    /// first time the key is seen.
    ///
    /// Gotcha: the first connection seen for a key fixes the limiter's rate
    /// limit for the lifetime of the registry. A later connection with the
    /// same key but a different `rate_limit` reuses the existing limiter,
    /// and its rate limit is silently ignored.
    ///
    /// Limiter construction spawns a worker task, so this must be called
    /// from within a Tokio runtime.
    pub fn find_or_create(&self, connection: &Connection) -> Arc<ConnectionRateLimiter> {
        let key = connection.key();
        let mut limiters = self.limiters.lock().expect("registry lock poisoned");
        let limiter = limiters.entry(key).or_insert_with_key(|key| {
            debug!(key = %key, "registering connection rate limiter");
            Arc::new(ConnectionRateLimiter::new(connection.rate_limit))
        });
        Arc::clone(limiter)
    }

    /// Number of distinct connection keys seen so far.
    pub fn len(&self) -> usize {
        self.limiters.lock().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop every registered limiter. Idempotent, like each individual stop.
    pub fn stop_all(&self) {
        let limiters = self.limiters.lock().expect("registry lock poisoned");
        for limiter in limiters.values() {
            limiter.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RateLimit;
    use pretty_assertions::assert_eq;

    fn connection(platform: &str, connection_id: &str, request_count: u32) -> Connection {
        Connection {
            platform: platform.to_string(),
            connection_id: connection_id.to_string(),
            niceness: 0,
            rate_limit: RateLimit {
                request_count,
                window_seconds: 1,
            },
        }
    }

    /// The same key yields the same limiter instance.
    #[tokio::test]
    async fn same_key_shares_a_limiter() {
        let registry = Registry::new();
        let a = registry.find_or_create(&connection("platform", "conn", 5));
        let b = registry.find_or_create(&connection("platform", "conn", 5));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    /// Distinct keys get isolated limiters.
    #[tokio::test]
    async fn distinct_keys_get_distinct_limiters() {
        let registry = Registry::new();
        let a = registry.find_or_create(&connection("platform", "conn1", 5));
        let b = registry.find_or_create(&connection("platform", "conn2", 5));
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 2);
    }

    /// The first rate limit registered for a key wins; later ones are
    /// ignored.
    #[tokio::test]
    async fn first_rate_limit_wins() {
        let registry = Registry::new();
        let first = registry.find_or_create(&connection("platform", "conn", 5));
        let second = registry.find_or_create(&connection("platform", "conn", 99));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.rate_limit().request_count, 5);
    }

    /// Independent registries do not share limiters.
    #[tokio::test]
    async fn registries_are_independent() {
        let registry_a = Registry::new();
        let registry_b = Registry::new();
        let a = registry_a.find_or_create(&connection("platform", "conn", 5));
        let b = registry_b.find_or_create(&connection("platform", "conn", 5));
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
