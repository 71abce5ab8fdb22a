//! Region-scoped client cache.

use std::collections::HashMap;
use std::future::Future;
use tokio::sync::RwLock;
use tracing::debug;

/// Lazily built values keyed by region, shared for the process lifetime.
///
/// Lookups take the read lock. A miss takes the write lock and checks again
/// before building, so concurrent callers for the same region build once.
#[derive(Debug)]
pub struct RegionalCache<T> {
    entries: RwLock<HashMap<String, T>>,
}

impl<T> Default for RegionalCache<T> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<T: Clone> RegionalCache<T> {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value for `region`, building it with `init` on first use.
    pub async fn get_or_init<F, Fut>(&self, region: &str, init: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        {
            let entries = self.entries.read().await;
            if let Some(value) = entries.get(region) {
                return value.clone();
            }
        }

        let mut entries = self.entries.write().await;
        if let Some(value) = entries.get(region) {
            return value.clone();
        }

        debug!("Initializing client for region {region}");
        let value = init().await;
        entries.insert(region.to_string(), value.clone());
        value
    }

    /// Returns the number of cached regions.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns true if nothing has been cached yet.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
