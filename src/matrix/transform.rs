//! Row-wise transforms applied to a built expression matrix (§4.2
//! "Transforms").

use crate::config::Transform;

/// Applies `transform` in place to one row of `nCols` values.
pub fn apply_row(row: &mut [f64], transform: Transform) {
    match transform {
        Transform::None => {}
        Transform::Log1p => {
            for v in row.iter_mut() {
                if v.is_finite() {
                    *v = (1.0 + v.max(0.0)).ln();
                }
            }
        }
        Transform::ZScore => {
            let finite: Vec<f64> = row.iter().copied().filter(|v| v.is_finite()).collect();
            if finite.is_empty() {
                return;
            }
            let n = finite.len() as f64;
            let mean = finite.iter().sum::<f64>() / n;
            let var = finite.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
            let sigma = var.sqrt();
            for v in row.iter_mut() {
                if !v.is_finite() {
                    continue;
                }
                *v = if sigma < 1e-12 { 0.0 } else { (*v - mean) / sigma };
            }
        }
    }
}
