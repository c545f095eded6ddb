//! Row/column distance metrics shared by the matrix builder and the
//! clustering engine (§4.3 "Distance metrics"). NaN entries are skipped
//! pairwise; a distance is infinite when no coincident finite pair
//! remains between the two vectors.

use crate::config::DistanceMetric;

/// Computes the `n x n` symmetric distance matrix (row-major, zero
/// diagonal) for the given set of vectors (all the same length).
pub fn distance_matrix(vectors: &[Vec<f64>], metric: DistanceMetric) -> Vec<f64> {
    let n = vectors.len();
    let mut out = vec![0.0f64; n * n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d = pairwise(&vectors[i], &vectors[j], metric);
            out[i * n + j] = d;
            out[j * n + i] = d;
        }
    }
    out
}

fn pairwise(a: &[f64], b: &[f64], metric: DistanceMetric) -> f64 {
    match metric {
        DistanceMetric::Euclidean => euclidean(a, b),
        DistanceMetric::Cosine => cosine(a, b),
        DistanceMetric::Correlation => correlation(a, b),
    }
}

fn coincident_pairs(a: &[f64], b: &[f64]) -> Vec<(f64, f64)> {
    a.iter()
        .zip(b.iter())
        .filter(|(&x, &y)| x.is_finite() && y.is_finite())
        .map(|(&x, &y)| (x, y))
        .collect()
}

pub fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    let pairs = coincident_pairs(a, b);
    if pairs.is_empty() {
        return f64::INFINITY;
    }
    pairs.iter().map(|(x, y)| (x - y) * (x - y)).sum::<f64>().sqrt()
}

pub fn cosine(a: &[f64], b: &[f64]) -> f64 {
    let pairs = coincident_pairs(a, b);
    if pairs.is_empty() {
        return f64::INFINITY;
    }
    let dot: f64 = pairs.iter().map(|(x, y)| x * y).sum();
    let norm_a = pairs.iter().map(|(x, _)| x * x).sum::<f64>().sqrt();
    let norm_b = pairs.iter().map(|(_, y)| y * y).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

pub fn correlation(a: &[f64], b: &[f64]) -> f64 {
    let pairs = coincident_pairs(a, b);
    if pairs.is_empty() {
        return f64::INFINITY;
    }
    let n = pairs.len() as f64;
    let mean_a = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_b = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in &pairs {
        let da = x - mean_a;
        let db = y - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    if var_a == 0.0 || var_b == 0.0 {
        return 1.0;
    }
    let r = cov / (var_a.sqrt() * var_b.sqrt());
    1.0 - r
}
