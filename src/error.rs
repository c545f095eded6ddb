use std::collections::BTreeMap;

use thiserror::Error;

/// Domain-level failure returned by every core entry point.
///
/// Each variant carries the structured fields a caller needs to render
/// a human-readable message; `Display` (derived by `thiserror`) *is*
/// the template described by the distilled spec's "tagged failure
/// value" — callers needing the raw template variables can call
/// [`CoreError::template_vars`].
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("run cancelled")]
    Cancelled,

    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    #[error("too few groups: need at least 2, found {found}")]
    TooFewGroups { found: usize },

    #[error("group {group_id:?} has {found} cells, fewer than minCells={min_cells}")]
    TooFewCells {
        group_id: String,
        found: usize,
        min_cells: usize,
    },

    #[error("no genes to process")]
    NoGenes,

    #[error("dimension {found} exceeds the configured ceiling {limit}")]
    DimensionOverflow { found: usize, limit: usize },

    #[error("compute failed: {reason} ({failed_genes}/{total_genes} genes failed)")]
    ComputeFailed {
        reason: String,
        failed_genes: usize,
        total_genes: usize,
    },

    #[error("method unavailable: {method}")]
    MethodUnavailable { method: String },

    #[error("cache unavailable: {reason}")]
    CacheUnavailable { reason: String },

    #[error("storage full: {reason}")]
    StorageFull { reason: String },

    #[error("gene not found: {gene_key}")]
    GeneNotFound { gene_key: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CoreError {
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::Cancelled => "cancelled",
            CoreError::InvalidInput { .. }
            | CoreError::TooFewGroups { .. }
            | CoreError::TooFewCells { .. }
            | CoreError::NoGenes
            | CoreError::DimensionOverflow { .. } => "invalid_input",
            CoreError::ComputeFailed { .. } => "compute_failed",
            CoreError::MethodUnavailable { .. } => "method_unavailable",
            CoreError::CacheUnavailable { .. } => "cache_unavailable",
            CoreError::StorageFull { .. } => "storage_full",
            CoreError::GeneNotFound { .. } => "invalid_input",
            CoreError::Io(_) => "invalid_input",
        }
    }

    /// Structured template variables for callers that render their own
    /// message rather than using `Display`.
    pub fn template_vars(&self) -> BTreeMap<String, String> {
        let mut vars = BTreeMap::new();
        match self {
            CoreError::TooFewGroups { found } => {
                vars.insert("found".into(), found.to_string());
            }
            CoreError::TooFewCells {
                group_id,
                found,
                min_cells,
            } => {
                vars.insert("groupId".into(), group_id.clone());
                vars.insert("found".into(), found.to_string());
                vars.insert("minCells".into(), min_cells.to_string());
            }
            CoreError::DimensionOverflow { found, limit } => {
                vars.insert("found".into(), found.to_string());
                vars.insert("limit".into(), limit.to_string());
            }
            CoreError::ComputeFailed {
                reason,
                failed_genes,
                total_genes,
            } => {
                vars.insert("reason".into(), reason.clone());
                vars.insert("failedGenes".into(), failed_genes.to_string());
                vars.insert("totalGenes".into(), total_genes.to_string());
            }
            CoreError::MethodUnavailable { method } => {
                vars.insert("method".into(), method.clone());
            }
            CoreError::CacheUnavailable { reason } | CoreError::StorageFull { reason } => {
                vars.insert("reason".into(), reason.clone());
            }
            CoreError::GeneNotFound { gene_key } => {
                vars.insert("geneKey".into(), gene_key.clone());
            }
            CoreError::InvalidInput { message } => {
                vars.insert("message".into(), message.clone());
            }
            CoreError::Cancelled | CoreError::NoGenes | CoreError::Io(_) => {}
        }
        vars
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
