//! Marker Cache: tiered (in-memory LRU + durable key-value) store keyed
//! by dataset, analysis parameters and schema version (§4.4).

pub mod hot;
pub mod warm;

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Result;

use hot::HotCache;
use warm::WarmCache;

#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub payload: T,
    pub timestamp: i64,
}

/// Builds the cache key exactly as described in §4.4: dataset, schema
/// version, fixed `"markers"` scope, category, then the sorted
/// `param=value` fingerprint.
pub fn build_key(dataset_id: &str, schema_version: u32, category: &str, params: &[(&str, &str)]) -> String {
    let mut sorted: Vec<&(&str, &str)> = params.iter().collect();
    sorted.sort_by_key(|(k, _)| *k);
    let params_str = sorted.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(",");
    format!("{dataset_id}:v{schema_version}:markers:{category}:{params_str}")
}

/// Tiered facade: a hot in-memory LRU in front of an optional durable
/// `sled` tier. Degrades to memory-only transparently when the warm
/// tier fails to open.
pub struct MarkerCache<T: Clone> {
    hot: HotCache<T>,
    warm: Option<WarmCache>,
}

impl<T: Clone + Serialize + DeserializeOwned> MarkerCache<T> {
    pub fn open(max_categories: usize, warm_path: Option<&Path>, max_age_days: u64) -> Self {
        let warm = warm_path.and_then(|path| match WarmCache::open(path, max_age_days) {
            Ok(warm) => Some(warm),
            Err(err) => {
                tracing::warn!(error = %err, "warm cache tier unavailable, degrading to memory-only");
                None
            }
        });
        Self {
            hot: HotCache::new(max_categories),
            warm,
        }
    }

    pub fn memory_only(max_categories: usize) -> Self {
        Self {
            hot: HotCache::new(max_categories),
            warm: None,
        }
    }

    /// Returns the cached payload, if any. A warm-tier hit is promoted
    /// into the hot tier.
    pub fn get(&self, key: &str) -> Option<T> {
        if let Some(entry) = self.hot.get(key) {
            return Some(entry.payload);
        }
        let warm = self.warm.as_ref()?;
        match warm.get::<T>(key) {
            Ok(Some(entry)) => {
                self.hot.set(key.to_string(), entry.clone());
                Some(entry.payload)
            }
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(error = %err, "warm cache read failed, treating as a miss");
                None
            }
        }
    }

    /// Writes to both tiers; the warm write completes before the hot
    /// tier is updated, so a crash mid-write never leaves a dangling
    /// hot pointer with no durable backing.
    pub fn set(&self, key: &str, payload: T) {
        let entry = CacheEntry { payload, timestamp: now_millis() };
        if let Some(warm) = &self.warm {
            if let Err(err) = warm.set(key, &entry) {
                tracing::warn!(error = %err, "warm cache write failed, keeping hot tier only");
            }
        }
        self.hot.set(key.to_string(), entry);
    }

    pub fn has(&self, key: &str) -> bool {
        self.hot.has(key) || self.warm.as_ref().is_some_and(|w| w.has(key))
    }

    pub fn invalidate(&self, key: &str) {
        self.hot.invalidate(key);
        if let Some(warm) = &self.warm {
            warm.invalidate(key);
        }
    }

    pub fn clear(&self) {
        self.hot.clear();
        if let Some(warm) = &self.warm {
            warm.clear();
        }
    }

    pub fn close(&self) -> Result<()> {
        if let Some(warm) = &self.warm {
            warm.close()?;
        }
        Ok(())
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
#[path = "../../tests/src_inline/cache/mod.rs"]
mod tests;
