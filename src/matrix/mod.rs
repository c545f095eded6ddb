//! Expression Matrix Builder: assembles a dense gene x group matrix
//! from selected markers, with row-wise transforms (§4.2).

pub mod distance;
pub mod transform;

use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::Transform;
use crate::error::{CoreError, Result};
use crate::gene_source::{GeneSource, GroupSpec, StreamGenesOptions};
use crate::progress::{ProgressEvent, ProgressPhase, ProgressSink, YieldHook};

/// Dense `nRows x nCols` (genes x groups) matrix, row-major.
#[derive(Debug, Clone)]
pub struct ExpressionMatrix {
    pub values: Vec<f64>,
    pub n_rows: usize,
    pub n_cols: usize,
    pub genes: Vec<String>,
    pub group_ids: Vec<String>,
    pub group_names: Vec<String>,
    pub group_colors: Vec<String>,
    /// Pre-transform values, retained so re-transforming is cheap.
    pub raw_values: Vec<f64>,
    pub transform: Transform,
}

impl ExpressionMatrix {
    pub fn row(&self, i: usize) -> &[f64] {
        &self.values[i * self.n_cols..(i + 1) * self.n_cols]
    }

    /// Re-applies `transform` to `raw_values`, replacing `values`.
    pub fn retransform(&mut self, transform: Transform) {
        self.values = self.raw_values.clone();
        for row in self.values.chunks_mut(self.n_cols) {
            transform::apply_row(row, transform);
        }
        self.transform = transform;
    }

    /// Reorders rows and columns (and attached metadata) according to
    /// the given permutations, as the clustering result is applied.
    pub fn reorder(&self, row_order: &[usize], col_order: &[usize]) -> ExpressionMatrix {
        let n_rows = row_order.len();
        let n_cols = col_order.len();
        let mut values = vec![0.0f64; n_rows * n_cols];
        let mut raw_values = vec![0.0f64; n_rows * n_cols];
        for (new_r, &old_r) in row_order.iter().enumerate() {
            for (new_c, &old_c) in col_order.iter().enumerate() {
                values[new_r * n_cols + new_c] = self.values[old_r * self.n_cols + old_c];
                raw_values[new_r * n_cols + new_c] = self.raw_values[old_r * self.n_cols + old_c];
            }
        }
        ExpressionMatrix {
            values,
            n_rows,
            n_cols,
            genes: row_order.iter().map(|&i| self.genes[i].clone()).collect(),
            group_ids: col_order.iter().map(|&i| self.group_ids[i].clone()).collect(),
            group_names: col_order.iter().map(|&i| self.group_names[i].clone()).collect(),
            group_colors: col_order.iter().map(|&i| self.group_colors[i].clone()).collect(),
            raw_values,
            transform: self.transform,
        }
    }
}

pub struct MatrixBuilder<'a> {
    source: &'a dyn GeneSource,
}

impl<'a> MatrixBuilder<'a> {
    pub fn new(source: &'a dyn GeneSource) -> Self {
        Self { source }
    }

    /// Builds the dense gene x group matrix. `weights`, when given, must
    /// have length `cell_count()`; cells default to uniform weight 1.
    /// `yield_hook`, when given, is invoked once per gene boundary
    /// (§5 "Matrix Builder: at gene boundaries"). `progress`, when
    /// given, reports `ProgressPhase::Matrix` at the same boundaries.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        &self,
        genes: &[String],
        groups: &[GroupSpec],
        transform: Transform,
        weights: Option<&[f64]>,
        cancellation: Option<&AtomicBool>,
        mut progress: Option<&mut dyn ProgressSink>,
        mut yield_hook: Option<&mut dyn YieldHook>,
    ) -> Result<ExpressionMatrix> {
        if genes.is_empty() {
            return Err(CoreError::NoGenes);
        }
        for group in groups {
            if group.cell_indices.is_empty() {
                return Err(CoreError::TooFewCells {
                    group_id: group.group_id.clone(),
                    found: 0,
                    min_cells: 1,
                });
            }
        }

        let n_rows = genes.len();
        let n_cols = groups.len();
        let mut raw_values = vec![f64::NAN; n_rows * n_cols];

        let mut stream = self.source.stream_genes(genes, StreamGenesOptions::default());
        for row_idx in 0..n_rows {
            if cancellation.is_some_and(|c| c.load(Ordering::Relaxed)) {
                return Err(CoreError::Cancelled);
            }
            let record = stream.next().ok_or_else(|| CoreError::GeneNotFound {
                gene_key: genes[row_idx].clone(),
            })??;
            for (col_idx, group) in groups.iter().enumerate() {
                raw_values[row_idx * n_cols + col_idx] = reduce_mean(&record.values, &group.cell_indices, weights);
            }
            if let Some(sink) = progress.as_deref_mut() {
                sink.on_progress(ProgressEvent {
                    phase: ProgressPhase::Matrix,
                    progress: 100.0 * (row_idx + 1) as f32 / n_rows as f32,
                    loaded: Some((row_idx + 1) as u64),
                    total: Some(n_rows as u64),
                    message: None,
                });
            }
            if let Some(hook) = yield_hook.as_deref_mut() {
                hook.yield_now();
            }
        }

        let mut values = raw_values.clone();
        for row in values.chunks_mut(n_cols) {
            transform::apply_row(row, transform);
        }

        Ok(ExpressionMatrix {
            values,
            n_rows,
            n_cols,
            genes: genes.to_vec(),
            group_ids: groups.iter().map(|g| g.group_id.clone()).collect(),
            group_names: groups.iter().map(|g| g.display_name.clone()).collect(),
            group_colors: groups.iter().map(|g| g.color.clone()).collect(),
            raw_values,
            transform,
        })
    }
}

/// Weighted (default-uniform) arithmetic mean over a group's finite
/// values; NaN if the group has zero finite observations.
fn reduce_mean(values: &[f32], cell_indices: &[usize], weights: Option<&[f64]>) -> f64 {
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    for &cell in cell_indices {
        let Some(&raw) = values.get(cell) else { continue };
        let v = raw as f64;
        if !v.is_finite() {
            continue;
        }
        let w = weights.and_then(|w| w.get(cell)).copied().unwrap_or(1.0);
        weighted_sum += w * v;
        weight_total += w;
    }
    if weight_total == 0.0 {
        f64::NAN
    } else {
        weighted_sum / weight_total
    }
}

#[cfg(test)]
#[path = "../../tests/src_inline/matrix/mod.rs"]
mod tests;
