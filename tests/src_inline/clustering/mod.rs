use super::*;
use crate::config::ClusterConfig;
use crate::progress::YieldHook;

struct CountingYieldHook(usize);

impl YieldHook for CountingYieldHook {
    fn yield_now(&mut self) {
        self.0 += 1;
    }
}

fn symmetric(n: usize, pairs: &[(usize, usize, f64)]) -> Vec<f64> {
    let mut m = vec![0.0f64; n * n];
    for &(i, j, d) in pairs {
        m[i * n + j] = d;
        m[j * n + i] = d;
    }
    m
}

#[test]
fn average_linkage_merges_close_pairs_before_distant_pair() {
    let n = 4;
    let distance = symmetric(
        n,
        &[(0, 1, 1.0), (2, 3, 1.0), (0, 2, 10.0), (0, 3, 10.0), (1, 2, 10.0), (1, 3, 10.0)],
    );
    let config = ClusterConfig {
        linkage: Linkage::Average,
        ..ClusterConfig::default()
    };
    let result = ClusteringEngine::cluster(&distance, n, Linkage::Average, &config, None, None, None).unwrap();

    let heights: Vec<f64> = result.dendrogram[n..].iter().map(|node| node.height).collect();
    let close = heights.iter().filter(|h| (**h - 1.0).abs() < 1e-9).count();
    assert_eq!(close, 2);
    let root_height = result.dendrogram[result.root].height;
    assert!((root_height - 10.0).abs() < 1e-9);

    let mut sorted_order = result.order.clone();
    sorted_order.sort();
    assert_eq!(sorted_order, vec![0, 1, 2, 3]);
}

#[test]
fn single_linkage_represents_infinite_merge_height_explicitly() {
    // 0 and 1 are close; every path between {0,1} and 2 is infinite, so
    // the forced final merge height stays infinite rather than being
    // swallowed by a finite alternative.
    let n = 3;
    let distance = symmetric(n, &[(0, 1, 1.0), (0, 2, f64::INFINITY), (1, 2, f64::INFINITY)]);
    let config = ClusterConfig {
        linkage: Linkage::Single,
        ..ClusterConfig::default()
    };
    let result = ClusteringEngine::cluster(&distance, n, Linkage::Single, &config, None, None, None).unwrap();

    assert!(result.dendrogram[result.root].height.is_infinite());
    let mut sorted_order = result.order.clone();
    sorted_order.sort();
    assert_eq!(sorted_order, vec![0, 1, 2]);
}

#[test]
fn single_cluster_returns_trivial_dendrogram() {
    let config = ClusterConfig::default();
    let result = ClusteringEngine::cluster(&[0.0], 1, Linkage::Single, &config, None, None, None).unwrap();
    assert_eq!(result.order, vec![0]);
    assert_eq!(result.dendrogram.len(), 1);
    assert!(result.dendrogram[0].is_leaf);
}

#[test]
fn dimension_above_ceiling_is_rejected() {
    let mut config = ClusterConfig::default();
    config.max_cluster_dim = 2;
    let distance = symmetric(3, &[(0, 1, 1.0), (0, 2, 1.0), (1, 2, 1.0)]);
    let err = ClusteringEngine::cluster(&distance, 3, Linkage::Single, &config, None, None, None).unwrap_err();
    assert!(matches!(err, CoreError::DimensionOverflow { found: 3, limit: 2 }));
}

#[test]
fn merge_heights_are_non_increasing_root_to_leaf_for_single_linkage() {
    let n = 5;
    let distance = symmetric(
        n,
        &[
            (0, 1, 1.0),
            (1, 2, 2.0),
            (2, 3, 1.5),
            (3, 4, 0.5),
            (0, 2, 3.0),
            (0, 3, 4.0),
            (0, 4, 5.0),
            (1, 3, 2.5),
            (1, 4, 3.5),
            (2, 4, 1.2),
        ],
    );
    let config = ClusterConfig::default();
    let result = ClusteringEngine::cluster(&distance, n, Linkage::Single, &config, None, None, None).unwrap();
    assert_monotone(&result.dendrogram, result.root);
}

fn assert_monotone(arena: &[DendrogramNode], id: usize) {
    let node = &arena[id];
    if node.is_leaf {
        return;
    }
    for &child in &[node.left, node.right] {
        if child < 0 {
            continue;
        }
        let child_node = &arena[child as usize];
        if !child_node.is_leaf {
            assert!(child_node.height <= node.height + 1e-9);
        }
        assert_monotone(arena, child as usize);
    }
}

#[test]
fn order_is_a_permutation_for_larger_input() {
    let n = 8;
    let points: Vec<(f64, f64)> = (0..n).map(|i| ((i as f64) * 1.3, (i as f64 % 3) as f64)).collect();
    let mut pairs = Vec::new();
    for i in 0..n {
        for j in (i + 1)..n {
            let d = ((points[i].0 - points[j].0).powi(2) + (points[i].1 - points[j].1).powi(2)).sqrt();
            pairs.push((i, j, d));
        }
    }
    let distance = symmetric(n, &pairs);
    let config = ClusterConfig::default();
    let result = ClusteringEngine::cluster(&distance, n, Linkage::Average, &config, None, None, None).unwrap();
    let mut sorted_order = result.order.clone();
    sorted_order.sort();
    assert_eq!(sorted_order, (0..n).collect::<Vec<_>>());
}

#[test]
fn yield_hook_fires_during_heap_init_and_every_configured_merge_count() {
    let n = 6;
    let distance = symmetric(
        n,
        &[
            (0, 1, 1.0),
            (1, 2, 2.0),
            (2, 3, 1.5),
            (3, 4, 0.5),
            (4, 5, 2.2),
            (0, 2, 3.0),
            (0, 3, 4.0),
            (0, 4, 5.0),
            (0, 5, 6.0),
            (1, 3, 2.5),
            (1, 4, 3.5),
            (1, 5, 4.5),
            (2, 4, 1.2),
            (2, 5, 2.8),
            (3, 5, 1.9),
        ],
    );
    let config = ClusterConfig {
        progress_every_merges: 1,
        ..ClusterConfig::default()
    };
    let mut hook = CountingYieldHook(0);
    ClusteringEngine::cluster(&distance, n, Linkage::Average, &config, None, None, Some(&mut hook)).unwrap();

    // n heap-init row boundaries plus one hook call per merge (n-1 merges).
    assert_eq!(hook.0, n + (n - 1));
}
