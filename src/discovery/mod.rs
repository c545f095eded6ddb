//! Marker Discovery Engine: streams one gene at a time, runs one-vs-rest
//! group statistics per gene in a worker pool, tracks Top-N per group
//! via a bounded heap, and applies Benjamini-Hochberg correction.

pub mod bh;
pub mod distributions;
pub mod heap;
pub mod stats;

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::DiscoverConfig;
use crate::error::{CoreError, Result};
use crate::gene_source::{GeneSource, GroupSpec, StreamGenesOptions};
use crate::progress::{PartialResultSink, ProgressEvent, ProgressPhase, ProgressSink};
use crate::worker_pool::{GroupContext, WorkerPool, WorkerRequest, WorkerResponse};

use bh::benjamini_hochberg;
use heap::{MarkerCandidate, TopNHeap};

static RUN_EPOCH: AtomicU64 = AtomicU64::new(0);

/// Linear run-state machine (§4.1 "States (per run)"). Only
/// `Streaming -> Failed`/`Cancelled` may fire at arbitrary points; every
/// other transition is sequential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Broadcasting,
    Streaming,
    Draining,
    Finalizing,
    Done,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Marker {
    pub gene_key: String,
    pub gene_index: usize,
    pub p_value: f64,
    pub adj_p_value: Option<f64>,
    pub log2_fc: f64,
    pub mean_in: f64,
    pub mean_out: f64,
    pub pct_in: f64,
    pub pct_out: f64,
    pub n_in: usize,
    pub n_out: usize,
    pub rank: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMarkers {
    pub cell_count: usize,
    pub color: String,
    pub markers: Vec<Marker>,
}

/// `[k][G]` dense stat matrices, NaN where a group had too few cells or
/// the gene had zero finite observations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverStats {
    pub genes: Vec<String>,
    pub group_ids: Vec<String>,
    pub p_values: Vec<Vec<f64>>,
    pub adj_p_values: Vec<Vec<f64>>,
    pub log2_fc: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverOutput {
    pub per_group: BTreeMap<String, GroupMarkers>,
    pub stats: DiscoverStats,
}

#[derive(Debug, Clone)]
pub struct MarkerPreview {
    pub gene_key: String,
    pub gene_index: usize,
    pub p_value: f64,
    pub log2_fc: f64,
}

/// Non-BH-corrected snapshot emitted every `partial_emit_every` genes.
#[derive(Debug, Clone)]
pub struct PartialSnapshot {
    pub genes_processed: usize,
    pub total_genes: usize,
    pub per_group: BTreeMap<String, Vec<MarkerPreview>>,
}

enum DispatchResult {
    Gene {
        gene_key: String,
        gene_index: usize,
        stats: Vec<Option<stats::GeneStats>>,
    },
    GeneFailed,
    SourceError(CoreError),
}

pub struct DiscoveryEngine<'a> {
    source: &'a dyn GeneSource,
    pool: &'a dyn WorkerPool,
}

impl<'a> DiscoveryEngine<'a> {
    pub fn new(source: &'a dyn GeneSource, pool: &'a dyn WorkerPool) -> Self {
        Self { source, pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn discover(
        &self,
        groups: &[GroupSpec],
        gene_keys: &[String],
        config: &DiscoverConfig,
        cancellation: Option<&AtomicBool>,
        mut progress: Option<&mut dyn ProgressSink>,
        mut partial: Option<&mut dyn PartialResultSink<PartialSnapshot>>,
    ) -> Result<DiscoverOutput> {
        let mut state = RunState::NotStarted;
        let k = groups.len();
        if k < 2 {
            return Err(CoreError::TooFewGroups { found: k });
        }
        for group in groups {
            if group.cell_count() < config.min_cells {
                return Err(CoreError::TooFewCells {
                    group_id: group.group_id.clone(),
                    found: group.cell_count(),
                    min_cells: config.min_cells,
                });
            }
        }
        if gene_keys.is_empty() {
            return Err(CoreError::NoGenes);
        }

        let n_cells = self.source.cell_count();
        let n_genes = gene_keys.len();

        let mut cell_to_group = vec![-1i32; n_cells];
        for (g, group) in groups.iter().enumerate() {
            for &cell in &group.cell_indices {
                if cell < n_cells {
                    cell_to_group[cell] = g as i32;
                }
            }
        }

        state = RunState::Broadcasting;
        let epoch = RUN_EPOCH.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(epoch, state = ?state, "discovery run state transition");
        self.pool.broadcast(WorkerRequest::SetContext(GroupContext {
            epoch,
            cell_to_group: std::sync::Arc::new(cell_to_group),
            group_count: k,
            min_cells: config.min_cells,
            method: config.method,
        }))?;

        let bytes_per_gene = n_cells as u64
            * 4
            * if matches!(config.method, crate::config::Method::Wilcoxon) { 2 } else { 1 };
        let by_memory = (config.memory_budget_bytes / bytes_per_gene.max(1)).max(1) as usize;
        let max_in_flight = config.parallelism.max(1).min(by_memory).max(1);

        let mut p_values: Vec<Vec<f64>> = vec![vec![f64::NAN; n_genes]; k];
        let mut log2_fc: Vec<Vec<f64>> = vec![vec![f64::NAN; n_genes]; k];
        let mut heaps: Vec<TopNHeap> = (0..k).map(|_| TopNHeap::new(config.top_n)).collect();

        let genes_processed = AtomicUsize::new(0);
        let failed_genes = AtomicUsize::new(0);

        state = RunState::Streaming;
        tracing::debug!(epoch, state = ?state, "discovery run state transition");

        let iter_mutex = Mutex::new(self.source.stream_genes(gene_keys, StreamGenesOptions::default()));
        let (tx, rx) = crossbeam_channel::unbounded::<DispatchResult>();
        let timeout = Duration::from_millis(config.task_timeout_ms);

        std::thread::scope(|scope| {
            for _ in 0..max_in_flight {
                let tx = tx.clone();
                let iter_mutex = &iter_mutex;
                let pool = self.pool;
                let cancellation = cancellation;
                scope.spawn(move || {
                    loop {
                        if cancellation.is_some_and(|c| c.load(Ordering::Relaxed)) {
                            break;
                        }
                        let next = {
                            let mut it = iter_mutex.lock().expect("gene iterator mutex poisoned");
                            it.next()
                        };
                        let record = match next {
                            None => break,
                            Some(Err(e)) => {
                                let _ = tx.send(DispatchResult::SourceError(e));
                                break;
                            }
                            Some(Ok(record)) => record,
                        };
                        let request = WorkerRequest::ComputeGene {
                            gene_index: record.gene_index,
                            values: record.values,
                        };
                        match pool.execute(request, Some(timeout)) {
                            Ok(WorkerResponse::GeneResult { gene_index, stats }) => {
                                let _ = tx.send(DispatchResult::Gene {
                                    gene_key: record.gene_key,
                                    gene_index,
                                    stats,
                                });
                            }
                            _ => {
                                let _ = tx.send(DispatchResult::GeneFailed);
                            }
                        }
                    }
                });
            }
            drop(tx);

            let mut source_error: Option<CoreError> = None;
            while let Ok(result) = rx.recv() {
                if cancellation.is_some_and(|c| c.load(Ordering::Relaxed)) {
                    continue;
                }
                match result {
                    DispatchResult::Gene { gene_key, gene_index, stats } => {
                        for (g, maybe) in stats.into_iter().enumerate() {
                            let Some(s) = maybe else { continue };
                            p_values[g][gene_index] = s.p_value;
                            log2_fc[g][gene_index] = s.log2_fc;
                            if s.p_value.is_finite() {
                                heaps[g].offer(MarkerCandidate {
                                    gene_key: gene_key.clone(),
                                    gene_index,
                                    p_value: s.p_value,
                                    adj_p_value: None,
                                    log2_fc: s.log2_fc,
                                    stats: s,
                                });
                            }
                        }
                        let processed = genes_processed.fetch_add(1, Ordering::Relaxed) + 1;
                        if let Some(sink) = progress.as_deref_mut() {
                            sink.on_progress(ProgressEvent {
                                phase: ProgressPhase::Discovery,
                                progress: 100.0 * processed as f32 / n_genes as f32,
                                loaded: Some(processed as u64),
                                total: Some(n_genes as u64),
                                message: None,
                            });
                        }
                        if config.partial_emit_every > 0 && processed % config.partial_emit_every == 0 {
                            if let Some(sink) = partial.as_deref_mut() {
                                emit_partial(sink, &heaps, groups, processed, n_genes);
                            }
                        }
                    }
                    DispatchResult::GeneFailed => {
                        failed_genes.fetch_add(1, Ordering::Relaxed);
                        genes_processed.fetch_add(1, Ordering::Relaxed);
                    }
                    DispatchResult::SourceError(e) => {
                        source_error = Some(e);
                    }
                }
            }
            if let Some(e) = source_error {
                return Err(e);
            }
            Ok(())
        })?;

        if cancellation.is_some_and(|c| c.load(Ordering::Relaxed)) {
            tracing::debug!(epoch, "discovery run cancelled");
            return Err(CoreError::Cancelled);
        }

        let failed = failed_genes.load(Ordering::Relaxed);
        if failed * 2 > n_genes {
            return Err(CoreError::ComputeFailed {
                reason: "more than half of genes failed to compute".to_string(),
                failed_genes: failed,
                total_genes: n_genes,
            });
        }

        state = RunState::Draining;
        tracing::debug!(epoch, state = ?state, "discovery run state transition");
        state = RunState::Finalizing;
        tracing::debug!(epoch, state = ?state, "discovery run state transition");

        let adj_p_values: Vec<Vec<f64>> = p_values.iter().map(|row| benjamini_hochberg(row)).collect();

        let mut per_group = BTreeMap::new();
        for (g, group) in groups.iter().enumerate() {
            let candidates = std::mem::replace(&mut heaps[g], TopNHeap::new(0)).into_sorted_best_first();
            let mut markers: Vec<Marker> = Vec::with_capacity(candidates.len());
            for c in candidates {
                let adj = adj_p_values[g][c.gene_index];
                let chosen_p = if config.use_adjusted_p { adj } else { c.p_value };
                if !(chosen_p <= config.p_value_threshold) {
                    continue;
                }
                if c.log2_fc.abs() < config.log2fc_threshold {
                    continue;
                }
                markers.push(Marker {
                    gene_key: c.gene_key,
                    gene_index: c.gene_index,
                    p_value: c.p_value,
                    adj_p_value: if adj.is_finite() { Some(adj) } else { None },
                    log2_fc: c.log2_fc,
                    mean_in: c.stats.mean_in,
                    mean_out: c.stats.mean_out,
                    pct_in: c.stats.pct_in,
                    pct_out: c.stats.pct_out,
                    n_in: c.stats.n_in,
                    n_out: c.stats.n_out,
                    rank: 0,
                });
            }
            for (rank, marker) in markers.iter_mut().enumerate() {
                marker.rank = rank + 1;
            }
            per_group.insert(
                group.group_id.clone(),
                GroupMarkers {
                    cell_count: group.cell_count(),
                    color: group.color.clone(),
                    markers,
                },
            );
        }

        if let Some(sink) = progress.as_deref_mut() {
            sink.on_progress(ProgressEvent {
                phase: ProgressPhase::Discovery,
                progress: 100.0,
                loaded: None,
                total: None,
                message: None,
            });
        }

        state = RunState::Done;
        tracing::debug!(epoch, state = ?state, "discovery run state transition");

        Ok(DiscoverOutput {
            per_group,
            stats: DiscoverStats {
                genes: gene_keys.to_vec(),
                group_ids: groups.iter().map(|g| g.group_id.clone()).collect(),
                p_values,
                adj_p_values,
                log2_fc,
            },
        })
    }
}

fn emit_partial(
    sink: &mut dyn PartialResultSink<PartialSnapshot>,
    heaps: &[TopNHeap],
    groups: &[GroupSpec],
    processed: usize,
    total: usize,
) {
    let mut per_group = BTreeMap::new();
    for (g, group) in groups.iter().enumerate() {
        let preview = heaps[g]
            .preview_sorted()
            .into_iter()
            .map(|c| MarkerPreview {
                gene_key: c.gene_key,
                gene_index: c.gene_index,
                p_value: c.p_value,
                log2_fc: c.log2_fc,
            })
            .collect();
        per_group.insert(group.group_id.clone(), preview);
    }
    sink.on_partial(PartialSnapshot {
        genes_processed: processed,
        total_genes: total,
        per_group,
    });
}

#[cfg(test)]
#[path = "../../tests/src_inline/discovery/mod.rs"]
mod tests;
