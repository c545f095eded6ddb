//! One-vs-rest per-gene statistics: a single pass over a gene's value
//! vector accumulates running sums per group, then either a Welch
//! t-test or a tie-corrected Wilcoxon rank-sum is derived from those
//! sums (§4.1 "Algorithm — one-vs-rest per gene").

use crate::config::Method;
use crate::discovery::distributions::{normal_cdf, student_t_cdf};

pub const LOG2FC_EPSILON: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeneStats {
    pub p_value: f64,
    pub log2_fc: f64,
    pub mean_in: f64,
    pub mean_out: f64,
    pub pct_in: f64,
    pub pct_out: f64,
    pub n_in: usize,
    pub n_out: usize,
}

#[derive(Default, Clone, Copy)]
struct RunningSums {
    n: u64,
    sum: f64,
    sum_sq: f64,
    expr: u64,
}

impl RunningSums {
    fn push(&mut self, v: f64) {
        self.n += 1;
        self.sum += v;
        self.sum_sq += v * v;
        if v > 0.0 {
            self.expr += 1;
        }
    }
}

/// Computes one-vs-rest statistics for every group. Returns `None` for
/// groups whose in/out cell counts fall below `max(2, min_cells)`; the
/// caller folds those into a NaN row, never into a heap.
pub fn compute_one_vs_rest(
    values: &[f32],
    cell_to_group: &[i32],
    group_count: usize,
    min_cells: usize,
    method: Method,
) -> Vec<Option<GeneStats>> {
    let threshold = min_cells.max(2);
    let mut total = RunningSums::default();
    let mut per_group = vec![RunningSums::default(); group_count];

    for (i, &raw) in values.iter().enumerate() {
        let v = raw as f64;
        if !v.is_finite() {
            continue;
        }
        total.push(v);
        let g = cell_to_group.get(i).copied().unwrap_or(-1);
        if g >= 0 {
            if let Some(acc) = per_group.get_mut(g as usize) {
                acc.push(v);
            }
        }
    }

    // Wilcoxon needs a single rank pass shared across all groups.
    let ranks = if matches!(method, Method::Wilcoxon) {
        Some(midranks(values))
    } else {
        None
    };

    let mut out = Vec::with_capacity(group_count);
    for g in 0..group_count {
        let acc = per_group[g];
        let n_in = acc.n as usize;
        let n_out = (total.n - acc.n) as usize;
        if n_in < threshold || n_out < threshold {
            out.push(None);
            continue;
        }

        let mean_in = acc.sum / acc.n as f64;
        let mean_out = (total.sum - acc.sum) / n_out as f64;
        let log2_fc = ((mean_in + LOG2FC_EPSILON) / (mean_out + LOG2FC_EPSILON)).log2();
        let expr_out = total.expr - acc.expr;
        let pct_in = 100.0 * acc.expr as f64 / n_in as f64;
        let pct_out = 100.0 * expr_out as f64 / n_out as f64;

        let p_value = match method {
            Method::TTest => welch_t_test(acc, n_in, total, n_out, mean_in, mean_out),
            Method::Wilcoxon => {
                wilcoxon_rank_sum(ranks.as_ref().unwrap(), values, cell_to_group, g, n_in, n_out)
            }
        };

        out.push(Some(GeneStats {
            p_value,
            log2_fc,
            mean_in,
            mean_out,
            pct_in,
            pct_out,
            n_in,
            n_out,
        }));
    }
    out
}

fn welch_t_test(
    acc: RunningSums,
    n_in: usize,
    total: RunningSums,
    n_out: usize,
    mean_in: f64,
    mean_out: f64,
) -> f64 {
    if n_in < 2 || n_out < 2 {
        return f64::NAN;
    }
    let var_in = (acc.sum_sq - acc.sum * acc.sum / acc.n as f64) / (acc.n as f64 - 1.0);
    let sum_out = total.sum - acc.sum;
    let sum_sq_out = total.sum_sq - acc.sum_sq;
    let var_out = (sum_sq_out - sum_out * sum_out / n_out as f64) / (n_out as f64 - 1.0);

    let se_in = var_in.max(0.0) / n_in as f64;
    let se_out = var_out.max(0.0) / n_out as f64;
    let se_total = se_in + se_out;
    if se_total <= 0.0 {
        return if mean_in == mean_out { 1.0 } else { 0.0 };
    }
    let t = (mean_in - mean_out) / se_total.sqrt();
    let df = se_total * se_total
        / (se_in * se_in / (n_in as f64 - 1.0) + se_out * se_out / (n_out as f64 - 1.0));
    2.0 * (1.0 - student_t_cdf(t.abs(), df))
}

fn wilcoxon_rank_sum(
    ranks: &[f64],
    values: &[f32],
    cell_to_group: &[i32],
    group: usize,
    n_in: usize,
    n_out: usize,
) -> f64 {
    let mut r_sum = 0.0;
    let mut n_total_finite = 0u64;
    for (i, &raw) in values.iter().enumerate() {
        if !(raw as f64).is_finite() {
            continue;
        }
        n_total_finite += 1;
        if cell_to_group.get(i).copied().unwrap_or(-1) == group as i32 {
            r_sum += ranks[i];
        }
    }
    let n = n_total_finite as f64;
    let n_in_f = n_in as f64;
    let n_out_f = n_out as f64;

    let u = r_sum - n_in_f * (n_in_f + 1.0) / 2.0;
    let mu = n_in_f * n_out_f / 2.0;

    let tie_term = tie_correction_term(values);
    let sigma_sq = (n_in_f * n_out_f / 12.0) * ((n + 1.0) - tie_term / (n * (n - 1.0)).max(1.0));
    if sigma_sq <= 0.0 {
        return 1.0;
    }
    let sigma = sigma_sq.sqrt();
    let diff = u - mu;
    let continuity = if diff > 0.0 {
        -0.5
    } else if diff < 0.0 {
        0.5
    } else {
        0.0
    };
    let z = (diff + continuity) / sigma;
    2.0 * (1.0 - normal_cdf(z.abs()))
}

/// Sum of `t_k^3 - t_k` over every tie group of finite values, for the
/// Wilcoxon tie-correction term.
fn tie_correction_term(values: &[f32]) -> f64 {
    let mut finite: Vec<f64> = values.iter().map(|&v| v as f64).filter(|v| v.is_finite()).collect();
    finite.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mut term = 0.0;
    let mut i = 0usize;
    while i < finite.len() {
        let mut j = i + 1;
        while j < finite.len() && finite[j] == finite[i] {
            j += 1;
        }
        let t = (j - i) as f64;
        if t > 1.0 {
            term += t * t * t - t;
        }
        i = j;
    }
    term
}

/// Midranks (average rank for ties), aligned to the original index.
/// Non-finite entries get rank `0.0` and are never read by callers.
fn midranks(values: &[f32]) -> Vec<f64> {
    let mut indexed: Vec<(usize, f64)> = values
        .iter()
        .enumerate()
        .filter_map(|(i, &v)| {
            let v = v as f64;
            v.is_finite().then_some((i, v))
        })
        .collect();
    indexed.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());

    let mut ranks = vec![0.0f64; values.len()];
    let mut i = 0usize;
    while i < indexed.len() {
        let mut j = i + 1;
        while j < indexed.len() && indexed[j].1 == indexed[i].1 {
            j += 1;
        }
        // 1-based ranks [i+1 .. j], averaged across the tie group.
        let avg_rank = ((i + 1) + j) as f64 / 2.0;
        for item in indexed.iter().take(j).skip(i) {
            ranks[item.0] = avg_rank;
        }
        i = j;
    }
    ranks
}

#[cfg(test)]
#[path = "../../tests/src_inline/discovery/stats.rs"]
mod tests;
