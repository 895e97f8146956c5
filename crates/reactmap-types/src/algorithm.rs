//! Clustering algorithm selection and parameters.

use serde::{Deserialize, Serialize};

/// Distance metric used by the density-based clusterer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    #[default]
    Euclidean,
    Manhattan,
    /// `1 - cosine similarity`; zero vectors are at distance 1 from everything.
    Cosine,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Euclidean => "euclidean",
            DistanceMetric::Manhattan => "manhattan",
            DistanceMetric::Cosine => "cosine",
        }
    }
}

impl std::str::FromStr for DistanceMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "euclidean" | "l2" => Ok(DistanceMetric::Euclidean),
            "manhattan" | "l1" => Ok(DistanceMetric::Manhattan),
            "cosine" => Ok(DistanceMetric::Cosine),
            _ => Err(format!(
                "Invalid metric: '{}'. Use 'euclidean', 'manhattan' or 'cosine'.",
                s
            )),
        }
    }
}

/// Parameters for density-based (HDBSCAN) clustering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DensityParams {
    /// Smallest group of symbols that counts as a cluster.
    pub min_cluster_size: usize,
    /// Neighbourhood size for core distances, counting the point itself.
    pub min_samples: usize,
    /// Clusters born below this distance are merged into their parent.
    pub cluster_selection_epsilon: f64,
    pub metric: DistanceMetric,
}

impl Default for DensityParams {
    fn default() -> Self {
        Self {
            min_cluster_size: 2,
            min_samples: 1,
            cluster_selection_epsilon: 0.0,
            metric: DistanceMetric::Euclidean,
        }
    }
}

/// Parameters for partition-based (k-means) clustering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionParams {
    /// Requested number of clusters, clamped to `[2, symbol count]` at fit time.
    pub n_clusters: usize,
    /// RNG seed. `None` makes the run nondeterministic.
    pub seed: Option<u64>,
}

impl Default for PartitionParams {
    fn default() -> Self {
        Self {
            n_clusters: 5,
            seed: Some(42),
        }
    }
}

/// Name-level algorithm choice, as given on the command line or in config.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmKind {
    #[default]
    Hdbscan,
    Kmeans,
}

impl AlgorithmKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlgorithmKind::Hdbscan => "hdbscan",
            AlgorithmKind::Kmeans => "kmeans",
        }
    }
}

impl std::fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AlgorithmKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hdbscan" => Ok(AlgorithmKind::Hdbscan),
            "kmeans" | "k-means" => Ok(AlgorithmKind::Kmeans),
            _ => Err(format!("Unknown algorithm: '{}'. Use 'hdbscan' or 'kmeans'.", s)),
        }
    }
}

/// A fully resolved clustering strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum ClusterAlgorithm {
    #[serde(rename = "hdbscan")]
    Density(DensityParams),
    #[serde(rename = "kmeans")]
    Partition(PartitionParams),
}

impl ClusterAlgorithm {
    pub fn kind(&self) -> AlgorithmKind {
        match self {
            ClusterAlgorithm::Density(_) => AlgorithmKind::Hdbscan,
            ClusterAlgorithm::Partition(_) => AlgorithmKind::Kmeans,
        }
    }
}

impl Default for ClusterAlgorithm {
    fn default() -> Self {
        ClusterAlgorithm::Density(DensityParams::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_kind_from_str() {
        assert_eq!("hdbscan".parse::<AlgorithmKind>().unwrap(), AlgorithmKind::Hdbscan);
        assert_eq!("KMeans".parse::<AlgorithmKind>().unwrap(), AlgorithmKind::Kmeans);
        assert!("dbscan".parse::<AlgorithmKind>().is_err());
    }

    #[test]
    fn test_metric_from_str() {
        assert_eq!("cosine".parse::<DistanceMetric>().unwrap(), DistanceMetric::Cosine);
        assert_eq!("L1".parse::<DistanceMetric>().unwrap(), DistanceMetric::Manhattan);
        assert!("hamming".parse::<DistanceMetric>().is_err());
    }

    #[test]
    fn test_params_serialize_flat() {
        let params = serde_json::to_value(PartitionParams::default()).unwrap();
        assert_eq!(params, serde_json::json!({"n_clusters": 5, "seed": 42}));

        let algo = ClusterAlgorithm::Density(DensityParams::default());
        let value = serde_json::to_value(&algo).unwrap();
        assert_eq!(value["algorithm"], "hdbscan");
        assert_eq!(value["metric"], "euclidean");
    }
}
