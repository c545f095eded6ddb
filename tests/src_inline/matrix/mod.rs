use super::*;
use crate::config::Transform;
use crate::gene_source::{CategoricalField, GeneRecord};

struct FakeSource {
    n_cells: usize,
    rows: Vec<(String, Vec<f32>)>,
}

impl GeneSource for FakeSource {
    fn list_genes(&self) -> Vec<String> {
        self.rows.iter().map(|(k, _)| k.clone()).collect()
    }
    fn cell_count(&self) -> usize {
        self.n_cells
    }
    fn ensure_categorical_field(&self, _key: &str) -> Result<CategoricalField> {
        unimplemented!()
    }
    fn stream_genes<'a>(
        &'a self,
        keys: &[String],
        _options: StreamGenesOptions,
    ) -> Box<dyn Iterator<Item = Result<GeneRecord>> + Send + 'a> {
        let keys = keys.to_vec();
        Box::new(keys.into_iter().enumerate().map(move |(i, key)| {
            let row = self.rows.iter().find(|(k, _)| *k == key).unwrap();
            Ok(GeneRecord {
                gene_key: key,
                gene_index: i,
                values: row.1.clone(),
            })
        }))
    }
}

fn groups() -> Vec<GroupSpec> {
    vec![
        GroupSpec {
            group_id: "A".into(),
            display_name: "Group A".into(),
            group_code: 0,
            color: "#4C78A8".into(),
            cell_indices: vec![0, 1],
        },
        GroupSpec {
            group_id: "B".into(),
            display_name: "Group B".into(),
            group_code: 1,
            color: "#F58518".into(),
            cell_indices: vec![2, 3],
        },
    ]
}

#[test]
fn build_reduces_to_group_means() {
    let source = FakeSource {
        n_cells: 4,
        rows: vec![("G1".to_string(), vec![1.0, 3.0, 10.0, 20.0])],
    };
    let builder = MatrixBuilder::new(&source);
    let matrix = builder
        .build(&["G1".to_string()], &groups(), Transform::None, None, None, None, None)
        .unwrap();
    assert_eq!(matrix.n_rows, 1);
    assert_eq!(matrix.n_cols, 2);
    assert!((matrix.row(0)[0] - 2.0).abs() < 1e-9);
    assert!((matrix.row(0)[1] - 15.0).abs() < 1e-9);
}

#[test]
fn build_skips_nan_when_reducing() {
    let source = FakeSource {
        n_cells: 4,
        rows: vec![("G1".to_string(), vec![1.0, f32::NAN, 10.0, 20.0])],
    };
    let builder = MatrixBuilder::new(&source);
    let matrix = builder
        .build(&["G1".to_string()], &groups(), Transform::None, None, None, None, None)
        .unwrap();
    assert!((matrix.row(0)[0] - 1.0).abs() < 1e-9);
}

#[test]
fn build_yields_nan_when_group_has_no_finite_values() {
    let source = FakeSource {
        n_cells: 4,
        rows: vec![("G1".to_string(), vec![f32::NAN, f32::NAN, 10.0, 20.0])],
    };
    let builder = MatrixBuilder::new(&source);
    let matrix = builder
        .build(&["G1".to_string()], &groups(), Transform::None, None, None, None, None)
        .unwrap();
    assert!(matrix.row(0)[0].is_nan());
}

#[test]
fn build_rejects_empty_group() {
    let source = FakeSource {
        n_cells: 4,
        rows: vec![("G1".to_string(), vec![1.0, 2.0, 3.0, 4.0])],
    };
    let mut groups = groups();
    groups[1].cell_indices.clear();
    let builder = MatrixBuilder::new(&source);
    let err = builder
        .build(&["G1".to_string()], &groups, Transform::None, None, None, None, None)
        .unwrap_err();
    assert!(matches!(err, CoreError::TooFewCells { .. }));
}

#[test]
fn build_rejects_empty_gene_list() {
    let source = FakeSource { n_cells: 4, rows: vec![] };
    let builder = MatrixBuilder::new(&source);
    let err = builder.build(&[], &groups(), Transform::None, None, None, None, None).unwrap_err();
    assert!(matches!(err, CoreError::NoGenes));
}

#[test]
fn retransform_recomputes_from_raw_values() {
    let source = FakeSource {
        n_cells: 4,
        rows: vec![("G1".to_string(), vec![1.0, 3.0, 10.0, 20.0])],
    };
    let builder = MatrixBuilder::new(&source);
    let mut matrix = builder
        .build(&["G1".to_string()], &groups(), Transform::None, None, None, None, None)
        .unwrap();
    matrix.retransform(Transform::Log1p);
    assert!((matrix.row(0)[0] - 3.0f64.ln()).abs() < 1e-9);
}

#[test]
fn reorder_permutes_rows_cols_and_metadata() {
    let source = FakeSource {
        n_cells: 4,
        rows: vec![
            ("G1".to_string(), vec![1.0, 3.0, 10.0, 20.0]),
            ("G2".to_string(), vec![5.0, 5.0, 5.0, 5.0]),
        ],
    };
    let builder = MatrixBuilder::new(&source);
    let matrix = builder
        .build(&["G1".to_string(), "G2".to_string()], &groups(), Transform::None, None, None, None, None)
        .unwrap();
    let reordered = matrix.reorder(&[1, 0], &[1, 0]);
    assert_eq!(reordered.genes, vec!["G2", "G1"]);
    assert_eq!(reordered.group_ids, vec!["B", "A"]);
    assert_eq!(reordered.row(0)[0], matrix.row(1)[1]);
    assert_eq!(reordered.row(1)[1], matrix.row(0)[0]);
}

struct CountingYieldHook(usize);

impl crate::progress::YieldHook for CountingYieldHook {
    fn yield_now(&mut self) {
        self.0 += 1;
    }
}

#[test]
fn yield_hook_fires_once_per_gene_boundary() {
    let source = FakeSource {
        n_cells: 4,
        rows: vec![
            ("G1".to_string(), vec![1.0, 3.0, 10.0, 20.0]),
            ("G2".to_string(), vec![5.0, 5.0, 5.0, 5.0]),
            ("G3".to_string(), vec![2.0, 2.0, 9.0, 9.0]),
        ],
    };
    let builder = MatrixBuilder::new(&source);
    let mut hook = CountingYieldHook(0);
    builder
        .build(
            &["G1".to_string(), "G2".to_string(), "G3".to_string()],
            &groups(),
            Transform::None,
            None,
            None,
            None,
            Some(&mut hook),
        )
        .unwrap();
    assert_eq!(hook.0, 3);
}
