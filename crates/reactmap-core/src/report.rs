//! JSON report files.

use crate::Result;
use reactmap_types::ClusterReport;
use std::path::Path;
use tracing::info;

/// Read and write a [`ClusterReport`] as pretty-printed JSON.
pub trait ReportFile: Sized {
    /// Write to `path`, creating parent directories.
    fn save(&self, path: &Path) -> Result<()>;

    fn load(path: &Path) -> Result<Self>;
}

impl ReportFile for ClusterReport {
    fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!(target: "reactmap::pipeline", "Wrote report {} to {}", self.run_id, path.display());
        Ok(())
    }

    fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reactmap_types::{ReportAssignment, NOISE_LABEL};
    use std::collections::BTreeMap;
    use tempfile::TempDir;
    use uuid::Uuid;

    #[test]
    fn test_save_creates_dirs_and_loads_back() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out").join("clusters.json");

        let mut clusters = BTreeMap::new();
        clusters.insert(0, vec!["heart".to_string()]);
        clusters.insert(NOISE_LABEL, vec!["eyes".to_string()]);
        let report = ClusterReport {
            run_id: Uuid::new_v4(),
            algorithm: "hdbscan".to_string(),
            parameters: serde_json::json!({"min_cluster_size": 2}),
            cluster_count: 1,
            quality_score: None,
            clusters,
            assignments: vec![
                ReportAssignment {
                    reaction: "heart".to_string(),
                    cluster: 0,
                    confidence: 1.0,
                },
                ReportAssignment {
                    reaction: "eyes".to_string(),
                    cluster: NOISE_LABEL,
                    confidence: 0.0,
                },
            ],
        };

        report.save(&path).unwrap();
        let loaded = ClusterReport::load(&path).unwrap();
        assert_eq!(loaded, report);
        assert_eq!(loaded.clusters_from_assignments(), report.clusters);

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"-1\""));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let temp_dir = TempDir::new().unwrap();
        let err = ClusterReport::load(&temp_dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, crate::ReactmapError::IoError(_)));
    }
}
