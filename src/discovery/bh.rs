//! NaN-aware Benjamini-Hochberg false discovery rate correction
//! (§4.1 "Benjamini–Hochberg (NaN-aware)"). Non-finite p-values
//! (genes skipped because a group had zero finite observations) are
//! left untouched in both the input and the output.

/// Adjusts `p_values` in place order, returning a same-length vector.
/// Only finite entries participate in the correction; their ordinal
/// rank among themselves (not the full vector) is `m` the number of
/// finite entries.
pub fn benjamini_hochberg(p_values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..p_values.len()).filter(|&i| p_values[i].is_finite()).collect();
    order.sort_by(|&a, &b| p_values[a].partial_cmp(&p_values[b]).unwrap());

    let m = order.len() as f64;
    let mut raw: Vec<f64> = order
        .iter()
        .enumerate()
        .map(|(idx, &i)| (p_values[i] * m / (idx as f64 + 1.0)).min(1.0))
        .collect();

    // Enforce monotone non-increasing from the largest p (last rank)
    // down to the smallest, by propagating the running minimum.
    let mut running_min = f64::INFINITY;
    for v in raw.iter_mut().rev() {
        running_min = running_min.min(*v);
        *v = running_min;
    }

    let mut adjusted = vec![f64::NAN; p_values.len()];
    for (rank_idx, &orig_idx) in order.iter().enumerate() {
        adjusted[orig_idx] = raw[rank_idx];
    }
    adjusted
}
