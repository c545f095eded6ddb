use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

use crate::adapters::gzip::open_maybe_gz;
use crate::error::{CoreError, Result};

/// Per-cell metadata table (e.g. sample/condition/cluster columns),
/// joined against the barcode order of the source matrix. Used by
/// [`crate::adapters::mtx::MtxGeneSource`] to resolve categorical
/// fields for [`crate::gene_source::GeneSource::ensure_categorical_field`].
#[derive(Debug, Clone)]
pub struct CellMeta {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CellMeta {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }
}

pub fn load_meta(path: &Path, barcodes: &[String]) -> Result<CellMeta> {
    let mut reader = open_maybe_gz(path)?;
    let mut buf = String::new();

    buf.clear();
    let read = reader.read_line(&mut buf)?;
    if read == 0 {
        return Err(CoreError::InvalidInput {
            message: "meta file is empty".to_string(),
        });
    }
    let header_cols: Vec<String> = buf
        .trim_end()
        .split('\t')
        .map(|s| s.trim().to_string())
        .collect();

    let mut barcode_col = 0usize;
    for (idx, name) in header_cols.iter().enumerate() {
        let lower = name.to_ascii_lowercase();
        if lower == "barcode" || lower == "barcodes" {
            barcode_col = idx;
            break;
        }
    }

    let columns: Vec<String> = header_cols
        .iter()
        .enumerate()
        .filter(|(idx, _)| *idx != barcode_col)
        .map(|(_, name)| name.clone())
        .collect();

    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    loop {
        buf.clear();
        let read = reader.read_line(&mut buf)?;
        if read == 0 {
            break;
        }
        let line = buf.trim_end();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if barcode_col >= fields.len() {
            continue;
        }
        let barcode = fields[barcode_col].trim().to_string();
        if barcode.is_empty() || map.contains_key(&barcode) {
            continue;
        }
        let mut row = Vec::with_capacity(columns.len());
        for (idx, _) in header_cols.iter().enumerate() {
            if idx == barcode_col {
                continue;
            }
            row.push(fields.get(idx).map(|s| s.trim()).unwrap_or("").to_string());
        }
        map.insert(barcode, row);
    }

    let mut rows = Vec::with_capacity(barcodes.len());
    for bc in barcodes {
        match map.get(bc) {
            Some(row) => rows.push(row.clone()),
            None => rows.push(vec![String::new(); columns.len()]),
        }
    }

    Ok(CellMeta { columns, rows })
}

#[cfg(test)]
#[path = "../../tests/src_inline/adapters/meta.rs"]
mod tests;
