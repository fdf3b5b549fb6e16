//! Process-wide cache for upstream market values.
//!
//! Values live for the lifetime of the process; there is no TTL and no
//! eviction. A key stored with `None` is a negative entry recording a
//! failed fetch, and counts as present for hit purposes, so the
//! upstream is not retried.

use std::collections::HashMap;
use tokio::sync::RwLock;

/// The fixed set of cached upstream values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    BtcDifficulty,
    BtcPrice,
}

impl CacheKey {
    /// Fetch order within a request: difficulty first, then price.
    pub const ALL: [CacheKey; 2] = [CacheKey::BtcDifficulty, CacheKey::BtcPrice];

    /// Field name used in the stats response body
    pub fn field_name(self) -> &'static str {
        match self {
            CacheKey::BtcDifficulty => "btcDifficulty",
            CacheKey::BtcPrice => "btcPrice",
        }
    }
}

/// In-memory key/value store, shared across requests. Writes are
/// last-writer-wins; concurrent cold-key fetches may both store the
/// same value.
#[derive(Default)]
pub struct StatsCache {
    entries: RwLock<HashMap<CacheKey, Option<f64>>>,
}

impl StatsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// True iff the key has been written, including with a negative entry.
    pub async fn has(&self, key: CacheKey) -> bool {
        self.entries.read().await.contains_key(&key)
    }

    /// Outer `None` means the key was never written; `Some(None)` is a
    /// stored negative entry.
    pub async fn get(&self, key: CacheKey) -> Option<Option<f64>> {
        self.entries.read().await.get(&key).copied()
    }

    pub async fn set(&self, key: CacheKey, value: Option<f64>) {
        self.entries.write().await.insert(key, value);
    }
}
