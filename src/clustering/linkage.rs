//! Lance-Williams linkage update rules (§4.3 "Lance-Williams linkage").

use crate::config::Linkage;

/// Computes the updated distance from the newly merged cluster
/// `i union j` to another active cluster `m`, given the prior
/// pairwise distances `d_im`, `d_jm` and the pre-merge cluster sizes.
pub fn update(linkage: Linkage, d_im: f64, d_jm: f64, size_i: usize, size_j: usize) -> f64 {
    match linkage {
        Linkage::Single => d_im.min(d_jm),
        Linkage::Complete => d_im.max(d_jm),
        Linkage::Average => {
            if d_im.is_finite() && d_jm.is_finite() {
                let si = size_i as f64;
                let sj = size_j as f64;
                (si * d_im + sj * d_jm) / (si + sj)
            } else if d_im.is_finite() {
                d_im
            } else if d_jm.is_finite() {
                d_jm
            } else {
                f64::INFINITY
            }
        }
    }
}
