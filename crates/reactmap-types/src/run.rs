//! Persisted clustering runs and their exported report format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Cluster id given to symbols the density-based clusterer leaves unassigned.
pub const NOISE_LABEL: i32 = -1;

/// Placement of one reaction symbol within one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    pub run_id: Uuid,
    pub reaction_name: String,
    /// Cluster id, or [`NOISE_LABEL`].
    pub cluster_id: i32,
    /// Membership strength in `[0, 1]`.
    pub confidence: f64,
}

/// One clustering invocation and everything needed to reproduce it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringRun {
    pub run_id: Uuid,
    /// Algorithm name (`"hdbscan"` or `"kmeans"`).
    pub algorithm: String,
    /// Effective algorithm parameters.
    pub parameters: serde_json::Value,
    /// Text block weight as requested by the caller.
    pub text_weight: f64,
    /// Behavior block weight as requested by the caller.
    pub behavior_weight: f64,
    /// Number of real clusters (noise excluded).
    pub cluster_count: usize,
    /// Silhouette score, absent when undefined.
    pub quality_score: Option<f64>,
    pub created_at: DateTime<Utc>,
    /// One entry per reaction symbol, in symbol order.
    pub assignments: Vec<ClusterAssignment>,
}

impl ClusteringRun {
    /// Group symbols by cluster id, preserving assignment order within a group.
    pub fn clusters_summary(&self) -> BTreeMap<i32, Vec<String>> {
        group_by_cluster(
            self.assignments
                .iter()
                .map(|a| (a.cluster_id, a.reaction_name.as_str())),
        )
    }
}

/// One row of the `assignments` list in a [`ClusterReport`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportAssignment {
    pub reaction: String,
    pub cluster: i32,
    pub confidence: f64,
}

/// Serializable report of a run, the externally consumed output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterReport {
    pub run_id: Uuid,
    pub algorithm: String,
    pub parameters: serde_json::Value,
    pub cluster_count: usize,
    /// Always serialized; `null` when the score is undefined.
    pub quality_score: Option<f64>,
    pub clusters: BTreeMap<i32, Vec<String>>,
    pub assignments: Vec<ReportAssignment>,
}

impl ClusterReport {
    /// Re-derive the cluster grouping from the assignment list.
    pub fn clusters_from_assignments(&self) -> BTreeMap<i32, Vec<String>> {
        group_by_cluster(
            self.assignments
                .iter()
                .map(|a| (a.cluster, a.reaction.as_str())),
        )
    }
}

impl From<&ClusteringRun> for ClusterReport {
    fn from(run: &ClusteringRun) -> Self {
        Self {
            run_id: run.run_id,
            algorithm: run.algorithm.clone(),
            parameters: run.parameters.clone(),
            cluster_count: run.cluster_count,
            quality_score: run.quality_score,
            clusters: run.clusters_summary(),
            assignments: run
                .assignments
                .iter()
                .map(|a| ReportAssignment {
                    reaction: a.reaction_name.clone(),
                    cluster: a.cluster_id,
                    confidence: a.confidence,
                })
                .collect(),
        }
    }
}

/// Human label for a cluster id.
pub fn cluster_label(cluster_id: i32) -> String {
    if cluster_id == NOISE_LABEL {
        "Noise".to_string()
    } else {
        format!("Cluster {}", cluster_id)
    }
}

fn group_by_cluster<'a>(
    pairs: impl Iterator<Item = (i32, &'a str)>,
) -> BTreeMap<i32, Vec<String>> {
    let mut clusters: BTreeMap<i32, Vec<String>> = BTreeMap::new();
    for (cluster_id, name) in pairs {
        clusters.entry(cluster_id).or_default().push(name.to_string());
    }
    clusters
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_run() -> ClusteringRun {
        let run_id = Uuid::new_v4();
        let assignment = |name: &str, cluster_id: i32, confidence: f64| ClusterAssignment {
            run_id,
            reaction_name: name.to_string(),
            cluster_id,
            confidence,
        };
        ClusteringRun {
            run_id,
            algorithm: "hdbscan".to_string(),
            parameters: serde_json::json!({"min_cluster_size": 2}),
            text_weight: 0.5,
            behavior_weight: 0.5,
            cluster_count: 2,
            quality_score: None,
            created_at: Utc::now(),
            assignments: vec![
                assignment("heart", 0, 0.9),
                assignment("joy", 1, 1.0),
                assignment("eyes", NOISE_LABEL, 0.0),
                assignment("tada", 0, 0.7),
            ],
        }
    }

    #[test]
    fn test_clusters_summary_groups_in_order() {
        let summary = sample_run().clusters_summary();
        assert_eq!(summary[&0], vec!["heart", "tada"]);
        assert_eq!(summary[&1], vec!["joy"]);
        assert_eq!(summary[&NOISE_LABEL], vec!["eyes"]);
    }

    #[test]
    fn test_report_json_keeps_null_score_and_round_trips() {
        let run = sample_run();
        let report = ClusterReport::from(&run);
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"quality_score\":null"));

        let parsed: ClusterReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.clusters, run.clusters_summary());
        assert_eq!(parsed.clusters_from_assignments(), run.clusters_summary());
    }

    #[test]
    fn test_cluster_label() {
        assert_eq!(cluster_label(NOISE_LABEL), "Noise");
        assert_eq!(cluster_label(3), "Cluster 3");
    }
}
