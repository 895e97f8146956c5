//! Loading configuration files from disk.

use reactmap_cli::config::{Config, EmbedderKind};
use reactmap_types::DistanceMetric;
use std::path::PathBuf;
use tempfile::TempDir;

fn write_config(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("reactmap.toml");
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_load_full_config() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
        db_path = "/data/slack.db"
        models_dir = "/data/models"
        embedder = "hashed"
        hashed_dimension = 64

        [clustering]
        text_weight = 0.7
        behavior_weight = 0.3
        algorithm = "kmeans"
        min_cluster_size = 3
        min_samples = 2
        cluster_selection_epsilon = 0.25
        metric = "manhattan"
        n_clusters = 12
        seed = 7
        output = "out/reactions.json"
        "#,
    );

    let config = Config::load_from(&path).unwrap();
    assert_eq!(config.db_path, PathBuf::from("/data/slack.db"));
    assert_eq!(config.models_dir, PathBuf::from("/data/models"));
    assert_eq!(config.embedder, EmbedderKind::Hashed);
    assert_eq!(config.hashed_dimension, 64);

    let c = &config.clustering;
    assert_eq!(c.text_weight, 0.7);
    assert_eq!(c.behavior_weight, 0.3);
    assert_eq!(c.algorithm, "kmeans");
    assert_eq!(c.min_cluster_size, 3);
    assert_eq!(c.min_samples, 2);
    assert_eq!(c.cluster_selection_epsilon, 0.25);
    assert_eq!(c.metric, DistanceMetric::Manhattan);
    assert_eq!(c.n_clusters, 12);
    assert_eq!(c.seed, Some(7));
    assert_eq!(c.output, PathBuf::from("out/reactions.json"));
}

#[test]
fn test_empty_file_is_all_defaults() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "");

    let config = Config::load_from(&path).unwrap();
    let defaults = Config::default();
    assert_eq!(config.db_path, defaults.db_path);
    assert_eq!(config.embedder, defaults.embedder);
    assert_eq!(config.clustering, defaults.clustering);
}

#[test]
fn test_invalid_files_are_rejected() {
    let dir = TempDir::new().unwrap();

    let path = write_config(&dir, "embedder = \"openai\"\n");
    assert!(Config::load_from(&path).is_err());

    let path = write_config(&dir, "[clustering]\nmetric = \"hamming\"\n");
    assert!(Config::load_from(&path).is_err());

    let path = write_config(&dir, "embedder = \"hashed\"\nhashed_dimension = 0\n");
    assert!(Config::load_from(&path).is_err());

    let path = write_config(&dir, "db_path = [");
    assert!(Config::load_from(&path).is_err());
}

#[test]
fn test_missing_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    assert!(Config::load_from(&dir.path().join("absent.toml")).is_err());
}
