//! Clustering of reaction feature rows.
//!
//! A [`ClusterAlgorithm`] is resolved once from configuration and then
//! fitted through the [`Clusterer`] trait. Both strategies standardise the
//! feature matrix first, and the silhouette score is computed on that
//! standardised matrix.

mod density;
mod metrics;
mod partition;

pub use density::{hdbscan, validate_params, DensityFit};
pub use metrics::{
    cosine_distance, distance, euclidean_distance, manhattan_distance, pairwise_distances,
    silhouette_score,
};
pub use partition::{effective_k, kmeans, PartitionFit};

use crate::features::{standardize, FeatureMatrix};
use crate::{ReactmapError, Result};
use chrono::Utc;
use reactmap_types::{
    AlgorithmKind, ClusterAlgorithm, ClusterAssignment, ClusterReport, ClusteringRun,
    DensityParams, PartitionParams, ReportAssignment, NOISE_LABEL,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;
use uuid::Uuid;

/// Outcome of one fit: a label and confidence per reaction symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusteringResult {
    pub run_id: Uuid,
    pub algorithm: AlgorithmKind,
    /// Effective parameters, e.g. the clamped `n_clusters`.
    pub parameters: serde_json::Value,
    pub labels: Vec<i32>,
    pub confidences: Vec<f64>,
    pub reaction_names: Vec<String>,
    pub cluster_count: usize,
    pub quality_score: Option<f64>,
}

impl ClusteringResult {
    fn empty(algorithm: AlgorithmKind, parameters: serde_json::Value) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            algorithm,
            parameters,
            labels: Vec::new(),
            confidences: Vec::new(),
            reaction_names: Vec::new(),
            cluster_count: 0,
            quality_score: None,
        }
    }

    /// Members of one cluster with their confidence, strongest first.
    pub fn cluster_members(&self, cluster_id: i32) -> Vec<(String, f64)> {
        let mut members: Vec<(String, f64)> = self
            .reaction_names
            .iter()
            .zip(self.labels.iter().zip(&self.confidences))
            .filter(|(_, (label, _))| **label == cluster_id)
            .map(|(name, (_, confidence))| (name.clone(), *confidence))
            .collect();
        members.sort_by(|a, b| b.1.total_cmp(&a.1));
        members
    }

    /// Symbols grouped by cluster id, noise under [`NOISE_LABEL`].
    pub fn clusters_summary(&self) -> BTreeMap<i32, Vec<String>> {
        let mut clusters: BTreeMap<i32, Vec<String>> = BTreeMap::new();
        for (name, label) in self.reaction_names.iter().zip(&self.labels) {
            clusters.entry(*label).or_default().push(name.clone());
        }
        clusters
    }

    pub fn to_report(&self) -> ClusterReport {
        ClusterReport {
            run_id: self.run_id,
            algorithm: self.algorithm.to_string(),
            parameters: self.parameters.clone(),
            cluster_count: self.cluster_count,
            quality_score: self.quality_score,
            clusters: self.clusters_summary(),
            assignments: self
                .reaction_names
                .iter()
                .zip(self.labels.iter().zip(&self.confidences))
                .map(|(name, (label, confidence))| ReportAssignment {
                    reaction: name.clone(),
                    cluster: *label,
                    confidence: *confidence,
                })
                .collect(),
        }
    }

    /// Persistable run record stamped with the current time.
    pub fn to_run(&self, text_weight: f64, behavior_weight: f64) -> ClusteringRun {
        ClusteringRun {
            run_id: self.run_id,
            algorithm: self.algorithm.to_string(),
            parameters: self.parameters.clone(),
            text_weight,
            behavior_weight,
            cluster_count: self.cluster_count,
            quality_score: self.quality_score,
            created_at: Utc::now(),
            assignments: self
                .reaction_names
                .iter()
                .zip(self.labels.iter().zip(&self.confidences))
                .map(|(name, (label, confidence))| ClusterAssignment {
                    run_id: self.run_id,
                    reaction_name: name.clone(),
                    cluster_id: *label,
                    confidence: *confidence,
                })
                .collect(),
        }
    }
}

/// Something that turns a feature matrix into a clustering.
pub trait Clusterer {
    /// `features` has one row per entry of `reactions`, in the same order.
    fn fit(&self, features: &FeatureMatrix, reactions: &[String]) -> Result<ClusteringResult>;
}

/// Build the strategy called `name` from the two parameter sets.
///
/// Unknown names and invalid parameters are configuration errors.
pub fn algorithm_from_name(
    name: &str,
    density: DensityParams,
    partition: PartitionParams,
) -> Result<ClusterAlgorithm> {
    let kind: AlgorithmKind = name.parse().map_err(ReactmapError::InvalidConfig)?;
    let algorithm = match kind {
        AlgorithmKind::Hdbscan => ClusterAlgorithm::Density(density),
        AlgorithmKind::Kmeans => ClusterAlgorithm::Partition(partition),
    };
    validate_algorithm(&algorithm)?;
    Ok(algorithm)
}

pub fn validate_algorithm(algorithm: &ClusterAlgorithm) -> Result<()> {
    match algorithm {
        ClusterAlgorithm::Density(params) => validate_params(params),
        ClusterAlgorithm::Partition(params) => {
            if params.n_clusters == 0 {
                return Err(ReactmapError::invalid_config("n_clusters must be at least 1"));
            }
            Ok(())
        }
    }
}

impl Clusterer for ClusterAlgorithm {
    fn fit(&self, features: &FeatureMatrix, reactions: &[String]) -> Result<ClusteringResult> {
        validate_algorithm(self)?;
        if features.nrows() != reactions.len() {
            return Err(ReactmapError::DimensionMismatch {
                expected: reactions.len(),
                actual: features.nrows(),
            });
        }

        if features.nrows() == 0 {
            let parameters = match self {
                ClusterAlgorithm::Density(params) => serde_json::to_value(params)?,
                ClusterAlgorithm::Partition(params) => serde_json::to_value(params)?,
            };
            return Ok(ClusteringResult::empty(self.kind(), parameters));
        }

        let scaled = standardize(features);
        let (labels, confidences, parameters, cluster_count) = match self {
            ClusterAlgorithm::Density(params) => {
                let fit = hdbscan(&scaled, params)?;
                let found = fit
                    .labels
                    .iter()
                    .filter(|&&l| l != NOISE_LABEL)
                    .collect::<BTreeSet<_>>()
                    .len();
                (fit.labels, fit.probabilities, serde_json::to_value(params)?, found)
            }
            ClusterAlgorithm::Partition(params) => {
                // k-means always reports k clusters, even when duplicate rows leave one empty
                let k = effective_k(params.n_clusters, scaled.nrows());
                let fit = kmeans(&scaled, k, params.seed)?;
                let effective = PartitionParams {
                    n_clusters: k,
                    seed: params.seed,
                };
                let confidences = vec![1.0; fit.labels.len()];
                (fit.labels, confidences, serde_json::to_value(effective)?, k)
            }
        };
        let quality_score = silhouette_score(&scaled, &labels);
        let noise = labels.iter().filter(|&&l| l == NOISE_LABEL).count();

        info!(
            target: "reactmap::cluster",
            "{}: {} reactions -> {} clusters, {} noise, silhouette {}",
            self.kind(),
            reactions.len(),
            cluster_count,
            noise,
            quality_score.map_or_else(|| "n/a".to_string(), |s| format!("{:.3}", s))
        );

        Ok(ClusteringResult {
            run_id: Uuid::new_v4(),
            algorithm: self.kind(),
            parameters,
            labels,
            confidences,
            reaction_names: reactions.to_vec(),
            cluster_count,
            quality_score,
        })
    }
}
