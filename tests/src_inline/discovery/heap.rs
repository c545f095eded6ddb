use super::*;

fn candidate(gene_index: usize, p: f64, log2fc: f64) -> MarkerCandidate {
    MarkerCandidate {
        gene_key: format!("g{gene_index}"),
        gene_index,
        p_value: p,
        adj_p_value: None,
        log2_fc: log2fc,
        stats: GeneStats {
            p_value: p,
            log2_fc: log2fc,
            mean_in: 0.0,
            mean_out: 0.0,
            pct_in: 0.0,
            pct_out: 0.0,
            n_in: 10,
            n_out: 10,
        },
    }
}

#[test]
fn top_n_keeps_only_best_candidates_under_capacity() {
    let mut heap = TopNHeap::new(2);
    heap.offer(candidate(0, 0.5, 1.0));
    heap.offer(candidate(1, 0.01, 1.0));
    heap.offer(candidate(2, 0.9, 5.0));
    // 0.9 is worse than both 0.5 and 0.01, so it never displaces anything.
    let sorted = heap.into_sorted_best_first();
    assert_eq!(sorted.len(), 2);
    assert_eq!(sorted[0].gene_index, 1);
    assert_eq!(sorted[1].gene_index, 0);
}

#[test]
fn top_n_evicts_worst_on_better_arrival() {
    let mut heap = TopNHeap::new(1);
    heap.offer(candidate(0, 0.5, 1.0));
    heap.offer(candidate(1, 0.01, 1.0));
    let sorted = heap.into_sorted_best_first();
    assert_eq!(sorted.len(), 1);
    assert_eq!(sorted[0].gene_index, 1);
}

#[test]
fn ties_broken_by_abs_log2fc_then_gene_index() {
    let mut heap = TopNHeap::new(3);
    heap.offer(candidate(5, 0.01, 1.0));
    heap.offer(candidate(2, 0.01, 3.0));
    heap.offer(candidate(9, 0.01, 3.0));
    let sorted = heap.into_sorted_best_first();
    // same p; larger |log2fc| wins; among equal |log2fc| smaller gene index wins.
    assert_eq!(sorted[0].gene_index, 2);
    assert_eq!(sorted[1].gene_index, 9);
    assert_eq!(sorted[2].gene_index, 5);
}
