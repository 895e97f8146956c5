//! k-means through linfa, k-means++ seeded.

use crate::features::FeatureMatrix;
use crate::{ReactmapError, Result};
use linfa::prelude::*;
use linfa_clustering::KMeans;
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

const RESTARTS: usize = 10;
const MAX_ITERATIONS: u64 = 300;
const TOLERANCE: f64 = 1e-4;

/// Best of several k-means runs.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionFit {
    pub labels: Vec<i32>,
    pub inertia: f64,
}

/// Requested `k` clamped to the number of rows, but never below 2.
pub fn effective_k(requested: usize, rows: usize) -> usize {
    requested.min(rows).max(2)
}

/// Run k-means `RESTARTS` times and keep the lowest inertia.
///
/// `seed = None` draws the RNG state from the OS. With fewer rows than `k`
/// every row becomes its own cluster.
pub fn kmeans(data: &FeatureMatrix, k: usize, seed: Option<u64>) -> Result<PartitionFit> {
    let n = data.nrows();
    if n == 0 || k == 0 {
        return Ok(PartitionFit {
            labels: Vec::new(),
            inertia: 0.0,
        });
    }
    if n < k {
        return Ok(PartitionFit {
            labels: (0..n as i32).collect(),
            inertia: 0.0,
        });
    }

    let rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let dataset = DatasetBase::new(data.clone(), Array1::from_elem(n, ()));
    let model = KMeans::params_with_rng(k, rng)
        .n_runs(RESTARTS)
        .max_n_iterations(MAX_ITERATIONS)
        .tolerance(TOLERANCE)
        .fit(&dataset)
        .map_err(|e| ReactmapError::Clustering(format!("k-means with k={}: {}", k, e)))?;

    let predictions = model.predict(&dataset);
    let labels: Vec<i32> = predictions.iter().map(|&c| c as i32).collect();
    let inertia = model.inertia();
    debug!(
        target: "reactmap::cluster",
        "k-means k={} over {} rows: inertia {:.4}",
        k,
        n,
        inertia
    );
    Ok(PartitionFit { labels, inertia })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(rows: &[[f64; 2]]) -> FeatureMatrix {
        FeatureMatrix::from_shape_fn((rows.len(), 2), |(i, j)| rows[i][j])
    }

    #[test]
    fn test_effective_k() {
        assert_eq!(effective_k(10, 5), 5);
        assert_eq!(effective_k(3, 5), 3);
        assert_eq!(effective_k(5, 1), 2);
        assert_eq!(effective_k(1, 8), 2);
    }

    #[test]
    fn test_separates_blobs() {
        let data = points(&[
            [0.0, 0.0],
            [0.0, 1.0],
            [1.0, 0.0],
            [20.0, 20.0],
            [20.0, 21.0],
            [21.0, 20.0],
        ]);
        let fit = kmeans(&data, 2, Some(42)).unwrap();
        assert_eq!(fit.labels[0], fit.labels[1]);
        assert_eq!(fit.labels[0], fit.labels[2]);
        assert_eq!(fit.labels[3], fit.labels[4]);
        assert_eq!(fit.labels[3], fit.labels[5]);
        assert_ne!(fit.labels[0], fit.labels[3]);
        assert!(fit.inertia.is_finite() && fit.inertia < 10.0);
    }

    #[test]
    fn test_same_seed_same_labels() {
        let data = points(&[
            [0.0, 0.0],
            [3.0, 1.0],
            [1.0, 4.0],
            [6.0, 2.0],
            [2.0, 2.0],
            [5.0, 5.0],
        ]);
        assert_eq!(
            kmeans(&data, 3, Some(7)).unwrap(),
            kmeans(&data, 3, Some(7)).unwrap()
        );
    }

    #[test]
    fn test_k_equals_rows_gives_singletons() {
        let data = points(&[[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [4.0, 4.0], [9.0, 1.0]]);
        let fit = kmeans(&data, 5, Some(42)).unwrap();
        let mut labels = fit.labels.clone();
        labels.sort();
        assert_eq!(labels, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_duplicate_rows_do_not_panic() {
        let data = points(&[[1.0, 1.0], [1.0, 1.0], [1.0, 1.0]]);
        let fit = kmeans(&data, 2, Some(1)).unwrap();
        assert_eq!(fit.labels.len(), 3);
        assert!(fit.labels.iter().all(|&l| (0..2).contains(&l)));
    }

    #[test]
    fn test_fewer_rows_than_k() {
        let fit = kmeans(&points(&[[3.0, 3.0]]), 2, Some(42)).unwrap();
        assert_eq!(fit.labels, vec![0]);
    }

    #[test]
    fn test_unseeded_run_still_partitions() {
        let data = points(&[[0.0, 0.0], [0.0, 1.0], [50.0, 50.0], [50.0, 51.0]]);
        let fit = kmeans(&data, 2, None).unwrap();
        assert_eq!(fit.labels[0], fit.labels[1]);
        assert_eq!(fit.labels[2], fit.labels[3]);
        assert_ne!(fit.labels[0], fit.labels[2]);
    }
}
