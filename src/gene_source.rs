//! Consumed interface implemented by the data-source adapter. The core
//! never reads a file or talks to a network; it only ever sees these
//! traits. [`crate::adapters::mtx`] is one concrete implementation.

use crate::error::{CoreError, Result};

/// One group in a run's categorical grouping.
#[derive(Debug, Clone)]
pub struct GroupSpec {
    pub group_id: String,
    pub display_name: String,
    pub group_code: u32,
    pub color: String,
    /// Strictly sorted, disjoint (within this run) cell indices.
    pub cell_indices: Vec<usize>,
}

impl GroupSpec {
    pub fn cell_count(&self) -> usize {
        self.cell_indices.len()
    }

    pub fn is_sorted_strict(&self) -> bool {
        self.cell_indices.windows(2).all(|w| w[0] < w[1])
    }
}

/// A categorical observation field resolved to per-cell integer codes.
#[derive(Debug, Clone)]
pub struct CategoricalField {
    pub codes: Vec<u16>,
    pub categories: Vec<String>,
    pub missing_marker: u16,
}

pub const MISSING_MARKER: u16 = u16::MAX;

impl CategoricalField {
    /// Builds [`GroupSpec`]s from the raw codes: one group per distinct
    /// non-missing code that appears, ordered by first appearance.
    pub fn to_group_specs(&self, min_cells: usize) -> Result<Vec<GroupSpec>> {
        let mut order: Vec<u16> = Vec::new();
        let mut cells_by_code: std::collections::HashMap<u16, Vec<usize>> =
            std::collections::HashMap::new();
        for (cell, &code) in self.codes.iter().enumerate() {
            if code == self.missing_marker {
                continue;
            }
            cells_by_code.entry(code).or_insert_with(|| {
                order.push(code);
                Vec::new()
            });
            cells_by_code.get_mut(&code).unwrap().push(cell);
        }

        let mut specs = Vec::with_capacity(order.len());
        for code in order {
            let cell_indices = cells_by_code.remove(&code).unwrap_or_default();
            let name = self
                .categories
                .get(code as usize)
                .cloned()
                .unwrap_or_else(|| format!("group-{code}"));
            if cell_indices.len() < min_cells {
                return Err(CoreError::TooFewCells {
                    group_id: name,
                    found: cell_indices.len(),
                    min_cells,
                });
            }
            specs.push(GroupSpec {
                group_id: name.clone(),
                display_name: name,
                group_code: code as u32,
                color: default_color(code as usize),
                cell_indices,
            });
        }
        Ok(specs)
    }
}

fn default_color(index: usize) -> String {
    const PALETTE: [&str; 8] = [
        "#4C78A8", "#F58518", "#54A24B", "#E45756", "#72B7B2", "#B279A2", "#FF9DA6", "#9D755D",
    ];
    PALETTE[index % PALETTE.len()].to_string()
}

/// One gene's full expression column, yielded lazily by [`GeneSource::stream_genes`].
#[derive(Debug, Clone)]
pub struct GeneRecord {
    pub gene_key: String,
    pub gene_index: usize,
    /// Length equals [`GeneSource::cell_count`]; `NaN` means missing.
    pub values: Vec<f32>,
}

#[derive(Debug, Clone, Default)]
pub struct StreamGenesOptions {
    /// Hint for the adapter's internal read-ahead / prefetch depth.
    pub prefetch: Option<usize>,
}

/// Consumed interface: a cell × gene expression data source.
pub trait GeneSource: Send + Sync {
    fn list_genes(&self) -> Vec<String>;

    fn cell_count(&self) -> usize;

    fn ensure_categorical_field(&self, key: &str) -> Result<CategoricalField>;

    /// Streams the requested genes in order. The returned iterator is a
    /// pull-iterator: the adapter does no work ahead of what the
    /// consumer asks for beyond `options.prefetch`.
    fn stream_genes<'a>(
        &'a self,
        keys: &[String],
        options: StreamGenesOptions,
    ) -> Box<dyn Iterator<Item = Result<GeneRecord>> + Send + 'a>;
}
