//! Explicit, no-global-state configuration for a single run. A
//! `RunConfig` bundles the per-component configs so a caller constructs
//! one value up front and passes it through [`crate::Controller`],
//! matching the distilled spec's design note that "a run is constructed
//! with an explicit configuration struct and a borrowed worker pool."

use serde::{Deserialize, Serialize};

/// Default ceiling on the clustering input dimension (§9 open question:
/// exposed as a configurable constant rather than hard-coded).
pub const DEFAULT_MAX_CLUSTER_DIM: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    Wilcoxon,
    TTest,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Wilcoxon => "wilcox",
            Method::TTest => "ttest",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Linkage {
    Single,
    Complete,
    Average,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceMetric {
    Euclidean,
    Cosine,
    Correlation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transform {
    None,
    ZScore,
    Log1p,
}

/// Options for [`crate::discovery::DiscoveryEngine::discover`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverConfig {
    pub method: Method,
    pub top_n: usize,
    pub min_cells: usize,
    pub p_value_threshold: f64,
    pub log2fc_threshold: f64,
    pub use_adjusted_p: bool,
    /// Hint only; the engine still caps against `memory_budget_bytes`.
    pub parallelism: usize,
    pub memory_budget_bytes: u64,
    /// Emit a partial snapshot every this many completed genes.
    pub partial_emit_every: usize,
    /// Per-gene compute timeout, in milliseconds.
    pub task_timeout_ms: u64,
}

impl Default for DiscoverConfig {
    fn default() -> Self {
        Self {
            method: Method::Wilcoxon,
            top_n: 25,
            min_cells: 10,
            p_value_threshold: 0.05,
            log2fc_threshold: 1.0,
            use_adjusted_p: true,
            parallelism: num_cpus::get().max(1),
            memory_budget_bytes: 512 * 1024 * 1024,
            partial_emit_every: 50,
            task_timeout_ms: 120_000,
        }
    }
}

/// Options for [`crate::clustering::ClusteringEngine::cluster`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub linkage: Linkage,
    pub distance: DistanceMetric,
    pub max_cluster_dim: usize,
    /// Emit progress every this many merges.
    pub progress_every_merges: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            linkage: Linkage::Average,
            distance: DistanceMetric::Euclidean,
            max_cluster_dim: DEFAULT_MAX_CLUSTER_DIM,
            progress_every_merges: 8,
        }
    }
}

/// Options for [`crate::cache::MarkerCache`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub max_categories: usize,
    pub max_age_days: u64,
    pub warm_path: Option<std::path::PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_categories: 3,
            max_age_days: 7,
            warm_path: None,
        }
    }
}

/// Top-level configuration for one `Controller::run_analysis` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunConfig {
    pub dataset_id: String,
    pub schema_version: u32,
    pub category: String,
    pub discover: DiscoverConfig,
    pub cluster: ClusterConfig,
    pub cache: CacheConfig,
    pub matrix_transform: TransformConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformConfig {
    pub transform: Transform,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self { transform: Transform::None }
    }
}
