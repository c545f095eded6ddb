//! Durable key-value tier (§4.4 "Warm tier"), backed by an embedded
//! `sled` database. Entries carry an insertion timestamp; expired
//! entries are swept on open via an index scan.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::{CoreError, Result};

use super::CacheEntry;

pub struct WarmCache {
    db: sled::Db,
    max_age_secs: u64,
}

impl WarmCache {
    pub fn open(path: &Path, max_age_days: u64) -> Result<Self> {
        let db = sled::open(path).map_err(|e| CoreError::CacheUnavailable { reason: e.to_string() })?;
        let cache = Self {
            db,
            max_age_secs: max_age_days.saturating_mul(86_400),
        };
        cache.sweep_expired()?;
        Ok(cache)
    }

    fn sweep_expired(&self) -> Result<()> {
        let now = now_secs();
        let mut stale = Vec::new();
        for item in self.db.iter() {
            let (key, value) = item.map_err(|e| CoreError::CacheUnavailable { reason: e.to_string() })?;
            if let Ok(stamped) = serde_json::from_slice::<StampedEnvelope>(&value) {
                if now.saturating_sub(stamped.timestamp as u64) > self.max_age_secs {
                    stale.push(key);
                }
            }
        }
        for key in stale {
            let _ = self.db.remove(key);
        }
        Ok(())
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<CacheEntry<T>>> {
        let raw = self
            .db
            .get(key.as_bytes())
            .map_err(|e| CoreError::CacheUnavailable { reason: e.to_string() })?;
        let Some(raw) = raw else { return Ok(None) };
        let now = now_secs();
        let envelope: Envelope<T> =
            serde_json::from_slice(&raw).map_err(|e| CoreError::CacheUnavailable { reason: e.to_string() })?;
        if now.saturating_sub(envelope.timestamp as u64) > self.max_age_secs {
            let _ = self.db.remove(key.as_bytes());
            return Ok(None);
        }
        Ok(Some(CacheEntry {
            payload: envelope.payload,
            timestamp: envelope.timestamp,
        }))
    }

    pub fn set<T: Serialize>(&self, key: &str, entry: &CacheEntry<T>) -> Result<()> {
        let envelope = Envelope {
            payload: &entry.payload,
            timestamp: entry.timestamp,
        };
        let bytes = serde_json::to_vec(&envelope).map_err(|e| CoreError::StorageFull { reason: e.to_string() })?;
        self.db
            .insert(key.as_bytes(), bytes)
            .map_err(|e| CoreError::StorageFull { reason: e.to_string() })?;
        self.db.flush().map_err(|e| CoreError::StorageFull { reason: e.to_string() })?;
        Ok(())
    }

    pub fn has(&self, key: &str) -> bool {
        self.db.contains_key(key.as_bytes()).unwrap_or(false)
    }

    pub fn invalidate(&self, key: &str) {
        let _ = self.db.remove(key.as_bytes());
    }

    pub fn clear(&self) {
        let _ = self.db.clear();
    }

    pub fn close(&self) -> Result<()> {
        self.db.flush().map_err(|e| CoreError::CacheUnavailable { reason: e.to_string() })?;
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    payload: T,
    timestamp: i64,
}

/// Lightweight companion used only to read the timestamp during the
/// open-time sweep without deserializing the (unknown-typed) payload.
#[derive(Deserialize)]
struct StampedEnvelope {
    #[allow(dead_code)]
    #[serde(default)]
    payload: serde_json::Value,
    timestamp: i64,
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

#[cfg(test)]
#[path = "../../tests/src_inline/cache/warm.rs"]
mod tests;
