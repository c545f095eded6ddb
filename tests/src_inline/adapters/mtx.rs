use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::*;
use crate::gene_source::{GeneSource, StreamGenesOptions};

static DIR_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn make_temp_dir() -> PathBuf {
    let mut dir = std::env::temp_dir();
    let id = DIR_COUNTER.fetch_add(1, Ordering::SeqCst);
    dir.push(format!("kira_markergenes_test_{}_{}", std::process::id(), id));
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_file(path: &Path, contents: &str) {
    let mut f = BufWriter::new(File::create(path).unwrap());
    f.write_all(contents.as_bytes()).unwrap();
}

fn write_bundle(dir: &Path) {
    write_file(&dir.join("features.tsv"), "ENSG1\tGENEA\nENSG2\tGENEB\nENSG3\tGENEA\n");
    write_file(&dir.join("barcodes.tsv"), "AA-1\nBB-1\nCC-1\n");
    write_file(
        &dir.join("matrix.mtx"),
        "%%MatrixMarket matrix coordinate integer general\n3 3 4\n1 1 5\n1 2 1\n2 3 7\n3 1 2\n",
    );
}

#[test]
fn species_detection_by_symbol() {
    let human = vec![
        Feature { id: "1".into(), symbol_raw: "HLA-A".into(), symbol_norm: "HLA-A".into(), feature_type: None },
        Feature { id: "2".into(), symbol_raw: "HLA-B".into(), symbol_norm: "HLA-B".into(), feature_type: None },
        Feature { id: "3".into(), symbol_raw: "HLA-C".into(), symbol_norm: "HLA-C".into(), feature_type: None },
        Feature { id: "4".into(), symbol_raw: "HLA-DRA".into(), symbol_norm: "HLA-DRA".into(), feature_type: None },
        Feature { id: "5".into(), symbol_raw: "HLA-DRB1".into(), symbol_norm: "HLA-DRB1".into(), feature_type: None },
    ];
    let unknown = vec![
        Feature { id: "1".into(), symbol_raw: "GENE1".into(), symbol_norm: "GENE1".into(), feature_type: None },
    ];
    assert_eq!(detect_species(&human), Species::Human);
    assert_eq!(detect_species(&unknown), Species::Unknown);
}

#[test]
fn build_gene_index_folds_duplicate_symbols() {
    let features = vec![
        Feature { id: "1".into(), symbol_raw: "GeneA".into(), symbol_norm: "GENEA".into(), feature_type: None },
        Feature { id: "2".into(), symbol_raw: "GeneA".into(), symbol_norm: "GENEA".into(), feature_type: None },
    ];
    let (symbols, by_feature) = build_gene_index(&features);
    assert_eq!(symbols, vec!["GENEA".to_string()]);
    assert_eq!(by_feature, vec![Some(0), Some(0)]);
}

#[test]
fn open_folds_duplicate_gene_rows_additively_and_streams_by_key() {
    let dir = make_temp_dir();
    write_bundle(&dir);

    let source = MtxGeneSource::open(&dir, None).unwrap();
    assert_eq!(source.cell_count(), 3);
    // GENEA appears at feature rows 1 and 3; row 1 col 1 = 5, row1 col2=1, row3 col1=2
    // folded additively onto the same gene id -> cell AA-1 = 5+2=7, BB-1=1, CC-1=0
    assert_eq!(source.list_genes().len(), 2);

    let keys = vec!["GENEA".to_string(), "GENEB".to_string()];
    let records: Vec<_> = source
        .stream_genes(&keys, StreamGenesOptions::default())
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(records.len(), 2);
    let gene_a = records.iter().find(|r| r.gene_key == "GENEA").unwrap();
    assert_eq!(gene_a.values, vec![7.0, 1.0, 0.0]);
    let gene_b = records.iter().find(|r| r.gene_key == "GENEB").unwrap();
    assert_eq!(gene_b.values, vec![0.0, 0.0, 7.0]);
}

#[test]
fn stream_genes_reports_missing_key() {
    let dir = make_temp_dir();
    write_bundle(&dir);
    let source = MtxGeneSource::open(&dir, None).unwrap();
    let keys = vec!["NOPE".to_string()];
    let mut it = source.stream_genes(&keys, StreamGenesOptions::default());
    assert!(it.next().unwrap().is_err());
}
