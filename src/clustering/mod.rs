//! Hierarchical Clustering Engine: heap-based agglomerative clustering
//! with Lance-Williams updates over an arena-indexed dendrogram (§4.3).

pub mod linkage;

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use crate::config::{ClusterConfig, DistanceMetric, Linkage};
use crate::error::{CoreError, Result};
use crate::progress::{ProgressEvent, ProgressPhase, ProgressSink, YieldHook};

/// One node in the arena. Leaves occupy ids `0..n`; internal nodes
/// occupy `n..2n-1`. `-1` is the "no child" sentinel, used only
/// transiently (a fully-built tree never has it on an internal node).
#[derive(Debug, Clone, Copy)]
pub struct DendrogramNode {
    pub id: usize,
    pub is_leaf: bool,
    pub height: f64,
    pub left: i32,
    pub right: i32,
}

#[derive(Debug, Clone)]
pub struct ClusteringResult {
    pub order: Vec<usize>,
    pub dendrogram: Vec<DendrogramNode>,
    pub root: usize,
    pub distance: DistanceMetric,
    pub linkage: Linkage,
    /// `false` when the caller degraded to an identity ordering instead
    /// of running the algorithm (§4.3 "n > MAX_CLUSTER_DIM is treated as
    /// 'not clustered' by the caller"). `dendrogram` is leaf-only and
    /// `order` is the plain `0..n` identity when this is `false`.
    pub clustered: bool,
}

impl ClusteringResult {
    /// The "not clustered" fallback a caller builds when `n` exceeds
    /// the configured ceiling: identity order, leaf-only dendrogram, no
    /// merges.
    pub fn identity(n: usize, distance: DistanceMetric, linkage: Linkage) -> Self {
        let dendrogram = (0..n.max(1))
            .map(|i| DendrogramNode {
                id: i,
                is_leaf: true,
                height: 0.0,
                left: -1,
                right: -1,
            })
            .collect();
        Self {
            order: (0..n).collect(),
            dendrogram,
            root: n.saturating_sub(1),
            distance,
            linkage,
            clustered: false,
        }
    }
}

struct HeapEntry {
    distance: f64,
    i: usize,
    j: usize,
    vi: u64,
    vj: u64,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.distance == other.distance
    }
}
impl Eq for HeapEntry {}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
/// Reversed so `BinaryHeap` (a max-heap) pops the smallest distance first.
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.distance.partial_cmp(&self.distance).unwrap_or(Ordering::Equal)
    }
}

pub struct ClusteringEngine;

impl ClusteringEngine {
    /// `distance` is the `n x n` row-major symmetric matrix (zero
    /// diagonal); infinite entries are legal and represent "never
    /// merge before forced to."
    pub fn cluster(
        distance: &[f64],
        n: usize,
        linkage: Linkage,
        config: &ClusterConfig,
        cancellation: Option<&AtomicBool>,
        mut progress: Option<&mut dyn ProgressSink>,
        mut yield_hook: Option<&mut dyn YieldHook>,
    ) -> Result<ClusteringResult> {
        if n > config.max_cluster_dim {
            return Err(CoreError::DimensionOverflow {
                found: n,
                limit: config.max_cluster_dim,
            });
        }
        if n == 0 {
            return Err(CoreError::InvalidInput {
                message: "clustering requires at least one row".to_string(),
            });
        }
        if n == 1 {
            return Ok(ClusteringResult {
                order: vec![0],
                dendrogram: vec![DendrogramNode {
                    id: 0,
                    is_leaf: true,
                    height: 0.0,
                    left: -1,
                    right: -1,
                }],
                root: 0,
                distance: config.distance,
                linkage,
                clustered: true,
            });
        }

        let mut working = distance.to_vec();
        let mut active = vec![true; n];
        let mut size = vec![1usize; n];
        let mut version = vec![0u64; n];
        let mut node_id_by_cluster: Vec<usize> = (0..n).collect();

        let mut arena: Vec<DendrogramNode> = Vec::with_capacity(2 * n - 1);
        for i in 0..n {
            arena.push(DendrogramNode {
                id: i,
                is_leaf: true,
                height: 0.0,
                left: -1,
                right: -1,
            });
        }

        let mut heap: BinaryHeap<HeapEntry> = BinaryHeap::with_capacity(n * (n - 1) / 2);
        for i in 0..n {
            for j in (i + 1)..n {
                heap.push(HeapEntry {
                    distance: working[i * n + j],
                    i,
                    j,
                    vi: version[i],
                    vj: version[j],
                });
            }
            if let Some(hook) = yield_hook.as_deref_mut() {
                hook.yield_now();
            }
        }

        let mut active_count = n;
        let mut merges = 0usize;
        let mut next_node_id = n;

        while active_count > 1 {
            if cancellation.is_some_and(|c| c.load(AtomicOrdering::Relaxed)) {
                return Err(CoreError::Cancelled);
            }

            let entry = loop {
                match heap.pop() {
                    None => break None,
                    Some(e) => {
                        if active[e.i] && active[e.j] && version[e.i] == e.vi && version[e.j] == e.vj {
                            break Some(e);
                        }
                    }
                }
            };
            let Some(entry) = entry else { break };

            let (i, j) = (entry.i, entry.j);
            let new_node_id = next_node_id;
            next_node_id += 1;
            arena.push(DendrogramNode {
                id: new_node_id,
                is_leaf: false,
                height: entry.distance,
                left: node_id_by_cluster[i] as i32,
                right: node_id_by_cluster[j] as i32,
            });
            let size_i_before = size[i];
            let size_j = size[j];
            node_id_by_cluster[i] = new_node_id;
            active[j] = false;
            size[i] += size_j;
            version[i] += 1;
            version[j] += 1;
            active_count -= 1;
            merges += 1;

            for m in 0..n {
                if m == i || m == j || !active[m] {
                    continue;
                }
                let d_im = working[i * n + m];
                let d_jm = working[j * n + m];
                let updated = linkage::update(linkage, d_im, d_jm, size_i_before, size_j);
                working[i * n + m] = updated;
                working[m * n + i] = updated;
                let (lo, hi) = if i < m { (i, m) } else { (m, i) };
                heap.push(HeapEntry {
                    distance: updated,
                    i: lo,
                    j: hi,
                    vi: version[lo],
                    vj: version[hi],
                });
            }

            if merges % config.progress_every_merges.max(1) == 0 {
                if let Some(sink) = progress.as_deref_mut() {
                    sink.on_progress(ProgressEvent {
                        phase: ProgressPhase::Clustering,
                        progress: 100.0 * merges as f32 / (n - 1) as f32,
                        loaded: Some(merges as u64),
                        total: Some((n - 1) as u64),
                        message: None,
                    });
                }
                if let Some(hook) = yield_hook.as_deref_mut() {
                    hook.yield_now();
                }
            }
        }

        let root = active
            .iter()
            .position(|&a| a)
            .map(|i| node_id_by_cluster[i])
            .unwrap_or(new_node_id_fallback(&arena));

        let mut order = Vec::with_capacity(n);
        collect_leaves(&arena, root, &mut order);
        if order.len() != n {
            order = (0..n).collect();
        }

        Ok(ClusteringResult {
            order,
            dendrogram: arena,
            root,
            distance: config.distance,
            linkage,
            clustered: true,
        })
    }
}

fn new_node_id_fallback(arena: &[DendrogramNode]) -> usize {
    arena.len().saturating_sub(1)
}

/// Iterative left-to-right leaf collection (explicit stack; pushes the
/// right child first so the left child pops and is visited first).
fn collect_leaves(arena: &[DendrogramNode], root: usize, out: &mut Vec<usize>) {
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        let node = &arena[id];
        if node.is_leaf {
            out.push(node.id);
            continue;
        }
        if node.right >= 0 {
            stack.push(node.right as usize);
        }
        if node.left >= 0 {
            stack.push(node.left as usize);
        }
    }
}

#[cfg(test)]
#[path = "../../tests/src_inline/clustering/mod.rs"]
mod tests;
