//! Per-reaction text embeddings averaged over the messages that received them.

use super::matrix::FeatureMatrix;
use crate::embedding::{content_key, Embedder};
use crate::store::ReactionStore;
use crate::{ReactmapError, Result};
use ndarray::ArrayView1;
use tracing::{debug, info};

/// Cache activity for one extraction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
}

/// Computes one mean embedding per reaction symbol.
pub struct TextFeatureExtractor<'a> {
    embedder: &'a dyn Embedder,
    use_cache: bool,
}

impl<'a> TextFeatureExtractor<'a> {
    pub fn new(embedder: &'a dyn Embedder) -> Self {
        Self {
            embedder,
            use_cache: true,
        }
    }

    /// Enable or bypass the persistent embedding cache.
    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    /// Embeddings for every distinct reaction in the context table.
    ///
    /// Returns the matrix and the sorted symbol list that indexes its rows.
    pub fn reaction_embeddings(&self, store: &ReactionStore) -> Result<(FeatureMatrix, Vec<String>)> {
        let reactions = store.unique_reactions()?;
        let (matrix, _) = self.embeddings_for(store, &reactions)?;
        Ok((matrix, reactions))
    }

    /// Embeddings for the given symbols, one row each in the same order.
    ///
    /// Symbols without any message text get the zero vector.
    pub fn embeddings_for(
        &self,
        store: &ReactionStore,
        reactions: &[String],
    ) -> Result<(FeatureMatrix, CacheStats)> {
        let dim = self.embedder.dimension();
        let mut matrix = FeatureMatrix::zeros((reactions.len(), dim));
        let mut stats = CacheStats::default();

        for (i, reaction) in reactions.iter().enumerate() {
            let messages = store.messages_for_reaction(reaction)?;
            if messages.is_empty() {
                debug!(target: "reactmap::features", "No messages for :{}:, using zero vector", reaction);
                continue;
            }

            let vectors = if self.use_cache {
                self.cached_vectors(store, &messages, &mut stats)?
            } else {
                let texts: Vec<&str> = messages.iter().map(String::as_str).collect();
                self.embed_checked(&texts)?
            };

            let mut row = matrix.row_mut(i);
            for vector in &vectors {
                row.zip_mut_with(&ArrayView1::from(vector.as_slice()), |acc, &v| *acc += v as f64);
            }
            row /= vectors.len() as f64;
        }

        info!(
            target: "reactmap::features",
            "Text features: {} reactions x {} dims (cache hits {}, misses {})",
            reactions.len(),
            dim,
            stats.hits,
            stats.misses
        );
        Ok((matrix, stats))
    }

    /// Vectors for each message, reading the cache first and persisting misses.
    fn cached_vectors(
        &self,
        store: &ReactionStore,
        messages: &[String],
        stats: &mut CacheStats,
    ) -> Result<Vec<Vec<f32>>> {
        let model_id = self.embedder.model_id();
        let keys: Vec<String> = messages.iter().map(|m| content_key(m)).collect();
        let mut slots: Vec<Option<Vec<f32>>> = Vec::with_capacity(messages.len());
        let mut missing: Vec<usize> = Vec::new();

        for (idx, key) in keys.iter().enumerate() {
            match store.cached_embedding(key, model_id)? {
                Some(vector) => {
                    self.check_dimension(vector.len())?;
                    stats.hits += 1;
                    slots.push(Some(vector));
                }
                None => {
                    missing.push(idx);
                    slots.push(None);
                }
            }
        }

        if !missing.is_empty() {
            let texts: Vec<&str> = missing.iter().map(|&idx| messages[idx].as_str()).collect();
            let fresh = self.embed_checked(&texts)?;
            for (idx, vector) in missing.into_iter().zip(fresh) {
                let (stored, _) = store.store_embedding(&keys[idx], model_id, &vector)?;
                slots[idx] = Some(stored);
                stats.misses += 1;
            }
        }

        slots
            .into_iter()
            .map(|slot| slot.ok_or_else(|| ReactmapError::Embedding("missing message vector".into())))
            .collect()
    }

    fn embed_checked(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let vectors = self.embedder.embed(texts)?;
        if vectors.len() != texts.len() {
            return Err(ReactmapError::DimensionMismatch {
                expected: texts.len(),
                actual: vectors.len(),
            });
        }
        for vector in &vectors {
            self.check_dimension(vector.len())?;
        }
        Ok(vectors)
    }

    fn check_dimension(&self, len: usize) -> Result<()> {
        let dim = self.embedder.dimension();
        if len != dim {
            return Err(ReactmapError::DimensionMismatch {
                expected: dim,
                actual: len,
            });
        }
        Ok(())
    }
}
