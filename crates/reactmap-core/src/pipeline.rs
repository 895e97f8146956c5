//! End-to-end clustering run: contexts, features, fit, persist.

use crate::cluster::{validate_algorithm, ClusteringResult, Clusterer};
use crate::embedding::Embedder;
use crate::features::{BehaviorFeatureExtractor, FeatureCombiner, TextFeatureExtractor};
use crate::store::ReactionStore;
use crate::{ReactmapError, Result};
use reactmap_types::ClusterAlgorithm;
use tracing::info;

/// Settings for one [`run_clustering`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    pub text_weight: f64,
    pub behavior_weight: f64,
    pub algorithm: ClusterAlgorithm,
    /// Read and write the embedding cache.
    pub use_cache: bool,
    /// Rebuild the context table even when it already has rows.
    pub rebuild_contexts: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            text_weight: 0.5,
            behavior_weight: 0.5,
            algorithm: ClusterAlgorithm::default(),
            use_cache: true,
            rebuild_contexts: false,
        }
    }
}

/// Cluster every reaction symbol in the store and persist the run.
///
/// Configuration is validated before the store is touched. Nothing is
/// written to the run tables unless every stage succeeds.
pub fn run_clustering(
    store: &ReactionStore,
    embedder: &dyn Embedder,
    options: &PipelineOptions,
) -> Result<ClusteringResult> {
    let combiner = FeatureCombiner::new(options.text_weight, options.behavior_weight)?;
    validate_algorithm(&options.algorithm)?;

    if options.rebuild_contexts || store.context_row_count()? == 0 {
        info!(target: "reactmap::pipeline", "Building reaction contexts");
        store.build_reaction_contexts()?;
    }

    let (text, reactions) = TextFeatureExtractor::new(embedder)
        .with_cache(options.use_cache)
        .reaction_embeddings(store)?;
    if reactions.is_empty() {
        return Err(ReactmapError::NoReactions);
    }

    let behavior = BehaviorFeatureExtractor::new().behavior_features(store, &reactions)?;
    let features = combiner.combine(&text, &behavior)?;
    let result = options.algorithm.fit(&features, &reactions)?;

    store.save_run(&result.to_run(options.text_weight, options.behavior_weight))?;
    info!(
        target: "reactmap::pipeline",
        "Run {} complete: {} reactions, {} clusters",
        result.run_id,
        reactions.len(),
        result.cluster_count
    );
    Ok(result)
}
