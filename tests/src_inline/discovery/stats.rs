use super::*;

fn group_context(n_a: usize, n_b: usize) -> Vec<i32> {
    let mut ctx = vec![0i32; n_a];
    ctx.extend(std::iter::repeat(1i32).take(n_b));
    ctx
}

#[test]
fn synthetic_two_group_ttest_matches_literal_log2fc() {
    // §8 scenario 1: N=200, group A = 0..99 (value 1.0), group B = 100..199 (value 0.0).
    let mut values = vec![1.0f32; 100];
    values.extend(vec![0.0f32; 100]);
    let ctx = group_context(100, 100);

    let stats = compute_one_vs_rest(&values, &ctx, 2, 10, Method::TTest);
    let group_a = stats[0].unwrap();
    assert!((group_a.log2_fc - 6.658_211).abs() < 1e-3);
    assert_eq!(group_a.n_in, 100);
    assert_eq!(group_a.n_out, 100);

    let group_b = stats[1].unwrap();
    assert!((group_b.log2_fc + 6.658_211).abs() < 1e-3);
}

#[test]
fn constant_gene_everywhere_has_zero_log2fc() {
    let values = vec![5.0f32; 200];
    let ctx = group_context(100, 100);
    let stats = compute_one_vs_rest(&values, &ctx, 2, 10, Method::TTest);
    assert!(stats[0].unwrap().log2_fc.abs() < 1e-9);
}

#[test]
fn all_nan_gene_yields_no_group_stats() {
    let values = vec![f32::NAN; 200];
    let ctx = group_context(100, 100);
    let stats = compute_one_vs_rest(&values, &ctx, 2, 10, Method::TTest);
    assert!(stats.iter().all(Option::is_none));
}

#[test]
fn wilcoxon_rejects_on_perfect_separation() {
    // §8 scenario 3: two groups of 50, gene value equals group index.
    let mut values = vec![0.0f32; 50];
    values.extend(vec![1.0f32; 50]);
    let ctx = group_context(50, 50);

    let stats = compute_one_vs_rest(&values, &ctx, 2, 10, Method::Wilcoxon);
    let group_a = stats[0].unwrap();
    assert!(group_a.p_value < 0.05);
    let group_b = stats[1].unwrap();
    assert!(group_b.p_value < 0.05);
    // complementary one-vs-rest groups see the same two-sided p-value.
    assert!((group_a.p_value - group_b.p_value).abs() < 1e-9);
}

#[test]
fn wilcoxon_tie_correction_term_zero_without_ties() {
    assert_eq!(tie_correction_term(&[1.0, 2.0, 3.0, 4.0]), 0.0);
}

#[test]
fn wilcoxon_tie_correction_term_nonzero_with_ties() {
    // four-way tie: t=4, t^3 - t = 60.
    assert_eq!(tie_correction_term(&[1.0, 1.0, 1.0, 1.0]), 60.0);
}

#[test]
fn midranks_average_tied_values() {
    let ranks = midranks(&[10.0, 20.0, 20.0, 30.0]);
    assert_eq!(ranks, vec![1.0, 2.5, 2.5, 4.0]);
}

#[test]
fn too_few_cells_in_group_yields_none() {
    let values = vec![1.0f32; 20];
    let ctx = group_context(2, 18);
    let stats = compute_one_vs_rest(&values, &ctx, 2, 10, Method::TTest);
    assert!(stats[0].is_none());
}
