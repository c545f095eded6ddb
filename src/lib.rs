//! Marker Genes Analysis Core: a streaming pipeline that discovers
//! differentially expressed marker genes per group, builds a gene x
//! group expression matrix, and hierarchically clusters it for display.
//!
//! Dependency order (leaves first): cache -> clustering -> matrix ->
//! discovery -> [`Controller`].

pub mod adapters;
pub mod cache;
pub mod clustering;
pub mod config;
pub mod discovery;
pub mod error;
pub mod gene_source;
pub mod matrix;
pub mod progress;
pub mod worker_pool;

use std::sync::atomic::AtomicBool;

use cache::MarkerCache;
use clustering::{ClusteringEngine, ClusteringResult};
use config::{ClusterConfig, RunConfig};
use discovery::{DiscoverOutput, DiscoveryEngine};
use error::{CoreError, Result};
use gene_source::{GeneSource, GroupSpec};
use matrix::{ExpressionMatrix, MatrixBuilder};
use progress::{PartialResultSink, ProgressEvent, ProgressPhase, ProgressSink, YieldHook};
use worker_pool::WorkerPool;

/// One full run's result: markers (possibly served from cache), the
/// dense matrix built from the discovered top genes, and the
/// clustering applied to it.
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub markers: DiscoverOutput,
    pub matrix: ExpressionMatrix,
    pub row_clustering: ClusteringResult,
    pub col_clustering: ClusteringResult,
    pub from_cache: bool,
}

/// Ties the four components together the way a caller actually drives
/// them: cache lookup, discovery on a miss, matrix assembly over the
/// discovered genes, then row and column clustering of that matrix.
pub struct Controller<'a> {
    source: &'a dyn GeneSource,
    pool: &'a dyn WorkerPool,
    cache: &'a MarkerCache<DiscoverOutput>,
}

impl<'a> Controller<'a> {
    pub fn new(source: &'a dyn GeneSource, pool: &'a dyn WorkerPool, cache: &'a MarkerCache<DiscoverOutput>) -> Self {
        Self { source, pool, cache }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn run_analysis(
        &self,
        groups: &[GroupSpec],
        gene_keys: &[String],
        config: &RunConfig,
        cancellation: Option<&AtomicBool>,
        mut progress: Option<&mut dyn ProgressSink>,
        partial: Option<&mut dyn PartialResultSink<discovery::PartialSnapshot>>,
        mut yield_hook: Option<&mut dyn YieldHook>,
    ) -> Result<AnalysisResult> {
        let params: Vec<(String, String)> = vec![
            ("method".to_string(), config.discover.method.as_str().to_string()),
            ("topN".to_string(), config.discover.top_n.to_string()),
            ("minCells".to_string(), config.discover.min_cells.to_string()),
            ("groups".to_string(), groups.len().to_string()),
        ];
        let params_ref: Vec<(&str, &str)> = params.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        let cache_key = cache::build_key(&config.dataset_id, config.schema_version, &config.category, &params_ref);

        let (markers, from_cache) = match self.cache.get(&cache_key) {
            Some(cached) => (cached, true),
            None => {
                let engine = DiscoveryEngine::new(self.source, self.pool);
                let discovered = engine.discover(
                    groups,
                    gene_keys,
                    &config.discover,
                    cancellation,
                    progress.as_deref_mut(),
                    partial,
                )?;
                self.cache.set(&cache_key, discovered.clone());
                (discovered, false)
            }
        };

        let top_genes: Vec<String> = markers
            .per_group
            .values()
            .flat_map(|g| g.markers.iter().map(|m| m.gene_key.clone()))
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();

        let genes_for_matrix = if top_genes.is_empty() { gene_keys } else { &top_genes };
        let matrix = MatrixBuilder::new(self.source).build(
            genes_for_matrix,
            groups,
            config.matrix_transform.transform,
            None,
            cancellation,
            progress.as_deref_mut(),
            yield_hook.as_deref_mut(),
        )?;

        let row_distance = matrix::distance::distance_matrix(
            &(0..matrix.n_rows).map(|r| matrix.row(r).to_vec()).collect::<Vec<_>>(),
            config.cluster.distance,
        );
        let row_clustering = cluster_or_identity(
            &row_distance,
            matrix.n_rows,
            &config.cluster,
            cancellation,
            progress.as_deref_mut(),
            yield_hook.as_deref_mut(),
        )?;

        let mut cols: Vec<Vec<f64>> = vec![Vec::with_capacity(matrix.n_rows); matrix.n_cols];
        for r in 0..matrix.n_rows {
            for (c, col) in cols.iter_mut().enumerate() {
                col.push(matrix.row(r)[c]);
            }
        }
        let col_distance = matrix::distance::distance_matrix(&cols, config.cluster.distance);
        let col_clustering = cluster_or_identity(
            &col_distance,
            matrix.n_cols,
            &config.cluster,
            cancellation,
            progress.as_deref_mut(),
            yield_hook,
        )?;

        if let Some(sink) = progress.as_deref_mut() {
            sink.on_progress(ProgressEvent {
                phase: ProgressPhase::Finalize,
                progress: 100.0,
                loaded: None,
                total: None,
                message: None,
            });
        }

        Ok(AnalysisResult {
            markers,
            matrix,
            row_clustering,
            col_clustering,
            from_cache,
        })
    }
}

/// Runs the clustering engine, degrading to an identity ordering rather
/// than failing the whole analysis when `n` exceeds the configured
/// ceiling (§4.3: "n > MAX_CLUSTER_DIM is treated as 'not clustered' by
/// the caller" — this Controller is that caller).
fn cluster_or_identity(
    distance: &[f64],
    n: usize,
    config: &ClusterConfig,
    cancellation: Option<&AtomicBool>,
    progress: Option<&mut dyn ProgressSink>,
    yield_hook: Option<&mut dyn YieldHook>,
) -> Result<ClusteringResult> {
    match ClusteringEngine::cluster(distance, n, config.linkage, config, cancellation, progress, yield_hook) {
        Ok(result) => Ok(result),
        Err(CoreError::DimensionOverflow { .. }) => Ok(ClusteringResult::identity(n, config.distance, config.linkage)),
        Err(other) => Err(other),
    }
}
