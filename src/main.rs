//! `markergenes` CLI: wires a 10x MTX bundle through the Marker Genes
//! Analysis Core and writes a JSON report.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use clap::Parser;
use kira_markergenes::Controller;
use kira_markergenes::adapters::MtxGeneSource;
use kira_markergenes::cache::MarkerCache;
use kira_markergenes::config::{ClusterConfig, DiscoverConfig, RunConfig, TransformConfig};
use kira_markergenes::discovery::DiscoverOutput;
use kira_markergenes::gene_source::GeneSource;
use kira_markergenes::worker_pool::ThreadWorkerPool;

#[derive(Parser, Debug)]
#[command(name = "markergenes", about = "Marker gene discovery, matrix assembly and clustering over a 10x MTX bundle")]
struct Cli {
    /// Directory containing matrix.mtx(.gz), features.tsv(.gz), barcodes.tsv(.gz)
    #[arg(long)]
    input_dir: PathBuf,

    /// Per-cell metadata TSV (must contain the grouping column)
    #[arg(long)]
    meta: Option<PathBuf>,

    /// Metadata column to group cells by
    #[arg(long, default_value = "cluster")]
    group_by: String,

    /// Dataset identifier used in the cache key
    #[arg(long, default_value = "dataset")]
    dataset_id: String,

    /// Schema version used in the cache key
    #[arg(long, default_value_t = 1)]
    schema_version: u32,

    /// Minimum cells per group
    #[arg(long, default_value_t = 10)]
    min_cells: usize,

    /// Top markers to retain per group
    #[arg(long, default_value_t = 25)]
    top_n: usize,

    /// Directory for the durable warm cache (sled). Omit to run memory-only.
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Number of worker threads; defaults to the available parallelism
    #[arg(long)]
    workers: Option<usize>,

    /// Write the JSON report to this path instead of stdout
    #[arg(long)]
    out: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(err) = run() {
        tracing::error!(%err, "markergenes run failed");
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let cli = Cli::parse();

    let source = MtxGeneSource::open(&cli.input_dir, cli.meta.as_deref()).map_err(|e| e.to_string())?;

    let categorical = source.ensure_categorical_field(&cli.group_by).map_err(|e| e.to_string())?;
    let groups = categorical.to_group_specs(cli.min_cells).map_err(|e| e.to_string())?;
    let gene_keys = source.list_genes();

    let pool = ThreadWorkerPool::new(cli.workers.unwrap_or_else(|| num_cpus::get().max(1)));
    let cache: MarkerCache<DiscoverOutput> = match &cli.cache_dir {
        Some(dir) => MarkerCache::open(3, Some(dir.as_path()), 7),
        None => MarkerCache::memory_only(3),
    };

    let config = RunConfig {
        dataset_id: cli.dataset_id,
        schema_version: cli.schema_version,
        category: cli.group_by,
        discover: DiscoverConfig {
            top_n: cli.top_n,
            min_cells: cli.min_cells,
            ..DiscoverConfig::default()
        },
        cluster: ClusterConfig::default(),
        cache: Default::default(),
        matrix_transform: TransformConfig::default(),
    };

    let cancellation: Option<&AtomicBool> = None;
    let controller = Controller::new(&source, &pool, &cache);
    let result = controller
        .run_analysis(&groups, &gene_keys, &config, cancellation, None, None, None)
        .map_err(|e| e.to_string())?;

    let report = build_report(&result);
    let json = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;

    match cli.out {
        Some(path) => std::fs::write(&path, json).map_err(|e| e.to_string())?,
        None => println!("{json}"),
    }

    cache.close().map_err(|e| e.to_string())?;
    Ok(())
}

#[derive(serde::Serialize)]
struct Report {
    from_cache: bool,
    groups: Vec<GroupReport>,
    matrix_genes: Vec<String>,
    matrix_groups: Vec<String>,
    row_order: Vec<usize>,
    col_order: Vec<usize>,
}

#[derive(serde::Serialize)]
struct GroupReport {
    group_id: String,
    cell_count: usize,
    markers: Vec<MarkerReport>,
}

#[derive(serde::Serialize)]
struct MarkerReport {
    gene_key: String,
    p_value: f64,
    adj_p_value: Option<f64>,
    log2_fc: f64,
    rank: usize,
}

fn build_report(result: &kira_markergenes::AnalysisResult) -> Report {
    let groups = result
        .markers
        .per_group
        .iter()
        .map(|(id, g)| GroupReport {
            group_id: id.clone(),
            cell_count: g.cell_count,
            markers: g
                .markers
                .iter()
                .map(|m| MarkerReport {
                    gene_key: m.gene_key.clone(),
                    p_value: m.p_value,
                    adj_p_value: m.adj_p_value,
                    log2_fc: m.log2_fc,
                    rank: m.rank,
                })
                .collect(),
        })
        .collect();

    Report {
        from_cache: result.from_cache,
        groups,
        matrix_genes: result.matrix.genes.clone(),
        matrix_groups: result.matrix.group_ids.clone(),
        row_order: result.row_clustering.order.clone(),
        col_order: result.col_clustering.order.clone(),
    }
}
