use super::*;

#[test]
fn build_key_sorts_params_and_fixes_the_markers_scope() {
    let key = build_key("ds1", 3, "cluster0", &[("method", "wilcoxon"), ("topN", "50")]);
    assert_eq!(key, "ds1:v3:markers:cluster0:method=wilcoxon,topN=50");

    let reordered = build_key("ds1", 3, "cluster0", &[("topN", "50"), ("method", "wilcoxon")]);
    assert_eq!(key, reordered);
}

#[test]
fn memory_only_cache_round_trips_a_value() {
    let cache: MarkerCache<Vec<String>> = MarkerCache::memory_only(3);
    cache.set("k", vec!["A".to_string(), "B".to_string()]);
    assert_eq!(cache.get("k"), Some(vec!["A".to_string(), "B".to_string()]));
}

#[test]
fn durable_cache_promotes_warm_hits_into_the_hot_tier() {
    let dir = tempfile::tempdir().unwrap();
    let cache: MarkerCache<i32> = MarkerCache::open(3, Some(dir.path()), 7);
    cache.set("k", 99);
    drop(cache);

    // Reopen: hot tier is empty, but the warm tier persisted the value.
    let reopened: MarkerCache<i32> = MarkerCache::open(3, Some(dir.path()), 7);
    assert_eq!(reopened.get("k"), Some(99));
    assert!(reopened.hot.has("k"));
}

#[test]
fn lru_eviction_matches_the_two_category_scenario() {
    // maxCategories = 2; set(A); set(B); get(A); set(C) => B is the
    // least-recently-used entry and is evicted from the hot tier, while
    // the warm tier keeps all three until they age out.
    let dir = tempfile::tempdir().unwrap();
    let cache: MarkerCache<i32> = MarkerCache::open(2, Some(dir.path()), 7);

    cache.set("A", 1);
    cache.set("B", 2);
    cache.get("A");
    cache.set("C", 3);

    let mut hot_keys = cache.hot.keys();
    hot_keys.sort();
    assert_eq!(hot_keys, vec!["A".to_string(), "C".to_string()]);

    assert!(cache.warm.as_ref().unwrap().has("A"));
    assert!(cache.warm.as_ref().unwrap().has("B"));
    assert!(cache.warm.as_ref().unwrap().has("C"));

    // B fell out of the hot tier but is still retrievable via the warm
    // tier, which re-promotes it back into the hot tier.
    assert_eq!(cache.get("B"), Some(2));
}

#[test]
fn invalidate_removes_from_both_tiers() {
    let dir = tempfile::tempdir().unwrap();
    let cache: MarkerCache<i32> = MarkerCache::open(3, Some(dir.path()), 7);
    cache.set("k", 1);
    cache.invalidate("k");
    assert_eq!(cache.get("k"), None);
    assert!(!cache.warm.as_ref().unwrap().has("k"));
}

#[test]
fn clear_empties_both_tiers() {
    let dir = tempfile::tempdir().unwrap();
    let cache: MarkerCache<i32> = MarkerCache::open(3, Some(dir.path()), 7);
    cache.set("a", 1);
    cache.set("b", 2);
    cache.clear();
    assert!(!cache.has("a"));
    assert!(!cache.has("b"));
}

#[test]
fn open_with_unwritable_warm_path_degrades_to_memory_only() {
    // A path under a file (not a directory) is not a valid sled
    // database location, so `WarmCache::open` fails and the cache must
    // still function using the hot tier alone.
    let dir = tempfile::tempdir().unwrap();
    let blocking_file = dir.path().join("not_a_dir");
    std::fs::write(&blocking_file, b"x").unwrap();
    let bogus_path = blocking_file.join("warm_db");

    let cache: MarkerCache<i32> = MarkerCache::open(3, Some(&bogus_path), 7);
    assert!(cache.warm.is_none());
    cache.set("k", 5);
    assert_eq!(cache.get("k"), Some(5));
}
