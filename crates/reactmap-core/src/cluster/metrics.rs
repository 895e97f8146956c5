//! Distances and the silhouette quality score.

use crate::features::{l2_norm, FeatureMatrix};
use linfa::metrics::SilhouetteScore;
use linfa::DatasetBase;
use ndarray::{Array1, Array2, ArrayView1, Axis, Zip};
use reactmap_types::{DistanceMetric, NOISE_LABEL};
use std::collections::BTreeSet;

pub fn euclidean_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    Zip::from(&a)
        .and(&b)
        .fold(0.0, |acc, x, y| acc + (x - y) * (x - y))
        .sqrt()
}

pub fn manhattan_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    Zip::from(&a).and(&b).fold(0.0, |acc, x, y| acc + (x - y).abs())
}

/// `1 - cos(a, b)`, in `[0, 2]`. A zero vector is at distance 1 from anything.
pub fn cosine_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    (1.0 - a.dot(&b) / (norm_a * norm_b)).clamp(0.0, 2.0)
}

pub fn distance(metric: DistanceMetric, a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    match metric {
        DistanceMetric::Euclidean => euclidean_distance(a, b),
        DistanceMetric::Manhattan => manhattan_distance(a, b),
        DistanceMetric::Cosine => cosine_distance(a, b),
    }
}

/// Dense symmetric distance matrix with a zero diagonal.
pub fn pairwise_distances(data: &FeatureMatrix, metric: DistanceMetric) -> Array2<f64> {
    let n = data.nrows();
    let mut out = Array2::zeros((n, n));
    for i in 0..n {
        for j in (i + 1)..n {
            let d = distance(metric, data.row(i), data.row(j));
            out[[i, j]] = d;
            out[[j, i]] = d;
        }
    }
    out
}

/// Mean silhouette over the non-noise rows (euclidean), computed by linfa.
///
/// `None` when fewer than two clusters or fewer than two assigned rows exist.
pub fn silhouette_score(data: &FeatureMatrix, labels: &[i32]) -> Option<f64> {
    let assigned: Vec<usize> = (0..labels.len())
        .filter(|&i| labels[i] != NOISE_LABEL)
        .collect();
    let clusters: BTreeSet<i32> = assigned.iter().map(|&i| labels[i]).collect();
    if assigned.len() < 2 || clusters.len() < 2 {
        return None;
    }

    let records = data.select(Axis(0), &assigned);
    let targets: Array1<usize> = assigned.iter().map(|&i| labels[i] as usize).collect();
    DatasetBase::new(records, targets).silhouette_score().ok()
}
