use super::*;
use crate::cache::CacheEntry;

#[test]
fn set_then_get_round_trips_the_payload() {
    let dir = tempfile::tempdir().unwrap();
    let warm = WarmCache::open(dir.path(), 7).unwrap();
    let entry = CacheEntry {
        payload: vec!["GENE1".to_string(), "GENE2".to_string()],
        timestamp: now_secs() as i64,
    };
    warm.set("k1", &entry).unwrap();
    let fetched: CacheEntry<Vec<String>> = warm.get("k1").unwrap().unwrap();
    assert_eq!(fetched.payload, entry.payload);
}

#[test]
fn missing_key_is_a_plain_miss() {
    let dir = tempfile::tempdir().unwrap();
    let warm = WarmCache::open(dir.path(), 7).unwrap();
    let fetched: Option<CacheEntry<String>> = warm.get("absent").unwrap();
    assert!(fetched.is_none());
}

#[test]
fn entry_older_than_max_age_is_swept_on_open() {
    let dir = tempfile::tempdir().unwrap();
    {
        let warm = WarmCache::open(dir.path(), 7).unwrap();
        let stale_entry = CacheEntry {
            payload: 42i32,
            timestamp: (now_secs() as i64) - 8 * 86_400,
        };
        warm.set("stale", &stale_entry).unwrap();
        let fresh_entry = CacheEntry {
            payload: 7i32,
            timestamp: now_secs() as i64,
        };
        warm.set("fresh", &fresh_entry).unwrap();
    }
    // Reopening re-runs the sweep, which should have evicted "stale"
    // but kept "fresh".
    let reopened = WarmCache::open(dir.path(), 7).unwrap();
    assert!(!reopened.has("stale"));
    assert!(reopened.has("fresh"));
}

#[test]
fn invalidate_removes_a_single_key() {
    let dir = tempfile::tempdir().unwrap();
    let warm = WarmCache::open(dir.path(), 7).unwrap();
    let entry = CacheEntry { payload: 1i32, timestamp: now_secs() as i64 };
    warm.set("a", &entry).unwrap();
    warm.invalidate("a");
    assert!(!warm.has("a"));
}

#[test]
fn clear_empties_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let warm = WarmCache::open(dir.path(), 7).unwrap();
    let entry = CacheEntry { payload: 1i32, timestamp: now_secs() as i64 };
    warm.set("a", &entry).unwrap();
    warm.set("b", &entry).unwrap();
    warm.clear();
    assert!(!warm.has("a"));
    assert!(!warm.has("b"));
}

#[test]
fn close_flushes_without_error() {
    let dir = tempfile::tempdir().unwrap();
    let warm = WarmCache::open(dir.path(), 7).unwrap();
    let entry = CacheEntry { payload: 1i32, timestamp: now_secs() as i64 };
    warm.set("a", &entry).unwrap();
    assert!(warm.close().is_ok());
}
