//! Text embedding backends and the persistent embedding cache.
//!
//! Cache entries are keyed by the SHA-256 of the message text together with
//! the model identifier, and are write-once: a second writer for the same key
//! never replaces the stored vector.

use crate::store::ReactionStore;
use crate::{ReactmapError, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use sha2::{Digest, Sha256};
use tracing::warn;

/// Something that turns texts into fixed-length vectors.
pub trait Embedder {
    /// Identifier stored next to cached vectors.
    fn model_id(&self) -> &str;

    /// Length of every vector returned by [`Embedder::embed`].
    fn dimension(&self) -> usize;

    /// Embed a batch of texts, one vector per input, in input order.
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;
}

/// Stable cache key for a message text: lowercase hex SHA-256 of its UTF-8 bytes.
pub fn content_key(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Deterministic embedder that derives vectors from SHA-256 digests.
///
/// Identical texts map to identical vectors and nothing else is implied; the
/// output carries no semantic signal. Useful offline and in tests.
#[derive(Debug, Clone)]
pub struct HashedEmbedder {
    dimension: usize,
    model_id: String,
}

impl HashedEmbedder {
    pub const DEFAULT_DIMENSION: usize = 384;

    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            model_id: format!("hashed-sha256-{}", dimension),
        }
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector = Vec::with_capacity(self.dimension);
        let mut block: u32 = 0;
        while vector.len() < self.dimension {
            let mut hasher = Sha256::new();
            hasher.update(block.to_le_bytes());
            hasher.update(text.as_bytes());
            for byte in hasher.finalize() {
                if vector.len() == self.dimension {
                    break;
                }
                vector.push((byte as f32 / 255.0) * 2.0 - 1.0);
            }
            block += 1;
        }
        vector
    }
}

impl Default for HashedEmbedder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DIMENSION)
    }
}

impl Embedder for HashedEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.vector_for(text)).collect())
    }
}

#[cfg(feature = "fastembed")]
pub use self::fast::FastEmbedder;

#[cfg(feature = "fastembed")]
mod fast {
    use super::Embedder;
    use crate::{ReactmapError, Result};
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tracing::info;

    /// Multilingual sentence embeddings through fastembed (ONNX Runtime).
    pub struct FastEmbedder {
        model: Mutex<TextEmbedding>,
        model_id: String,
    }

    impl FastEmbedder {
        /// Model name recorded in the cache.
        pub const MODEL_ID: &'static str = "paraphrase-multilingual-MiniLM-L12-v2";
        const DIMENSION: usize = 384;

        /// Load the model, downloading it into `cache_dir` on first use.
        pub fn new(cache_dir: Option<PathBuf>) -> Result<Self> {
            let mut options = InitOptions::new(EmbeddingModel::ParaphraseMLMiniLML12V2)
                .with_show_download_progress(false);
            if let Some(dir) = cache_dir {
                options = options.with_cache_dir(dir);
            }

            let model = TextEmbedding::try_new(options)
                .map_err(|e| ReactmapError::Embedding(e.to_string()))?;
            info!(target: "reactmap::embedding", "Loaded embedding model {}", Self::MODEL_ID);

            Ok(Self {
                model: Mutex::new(model),
                model_id: Self::MODEL_ID.to_string(),
            })
        }
    }

    impl Embedder for FastEmbedder {
        fn model_id(&self) -> &str {
            &self.model_id
        }

        fn dimension(&self) -> usize {
            Self::DIMENSION
        }

        fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            let model = self.model.lock().map_err(|_| ReactmapError::LockPoisoned)?;
            model
                .embed(texts.to_vec(), None)
                .map_err(|e| ReactmapError::Embedding(e.to_string()))
        }
    }
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8], dim: usize) -> Result<Vec<f32>> {
    if bytes.len() != dim * 4 {
        return Err(ReactmapError::DimensionMismatch {
            expected: dim * 4,
            actual: bytes.len(),
        });
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

impl ReactionStore {
    /// Look up a cached vector.
    pub fn cached_embedding(&self, content_key: &str, model_id: &str) -> Result<Option<Vec<f32>>> {
        let conn = self.conn()?;
        let row: Option<(Vec<u8>, i64)> = conn
            .query_row(
                "SELECT embedding, embedding_dim FROM embeddings_cache WHERE content_key = ?1 AND model_name = ?2",
                params![content_key, model_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((bytes, dim)) => Ok(Some(decode_vector(&bytes, dim as usize)?)),
            None => Ok(None),
        }
    }

    /// Insert a vector unless one is already stored for the key.
    ///
    /// Returns `(stored_vector, is_new)`. When the key already exists the
    /// previously stored vector is returned and the new one is discarded.
    pub fn store_embedding(
        &self,
        content_key: &str,
        model_id: &str,
        vector: &[f32],
    ) -> Result<(Vec<f32>, bool)> {
        let inserted = {
            let conn = self.conn()?;
            conn.execute(
                r#"
                INSERT OR IGNORE INTO embeddings_cache
                    (content_key, model_name, embedding, embedding_dim, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    content_key,
                    model_id,
                    encode_vector(vector),
                    vector.len() as i64,
                    Utc::now().to_rfc3339(),
                ],
            )?
        };

        if inserted > 0 {
            return Ok((vector.to_vec(), true));
        }

        let existing = self
            .cached_embedding(content_key, model_id)?
            .ok_or_else(|| ReactmapError::Embedding(format!("cache entry {} vanished", content_key)))?;
        if existing != vector {
            warn!(
                target: "reactmap::embedding",
                "Kept existing cached vector for {} ({}); recomputed vector differs",
                content_key,
                model_id
            );
        }
        Ok((existing, false))
    }

    /// Number of cached vectors for a model.
    pub fn embedding_cache_len(&self, model_id: &str) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM embeddings_cache WHERE model_name = ?1",
            params![model_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::memory_store;

    #[test]
    fn test_content_key_is_stable_sha256() {
        assert_eq!(
            content_key("hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(content_key("héllo 世界"), content_key("héllo 世界"));
        assert_ne!(content_key("a"), content_key("b"));
    }

    #[test]
    fn test_hashed_embedder_deterministic() {
        let embedder = HashedEmbedder::new(70);
        let first = embedder.embed(&["おはよう", "good morning"]).unwrap();
        let second = embedder.embed(&["おはよう"]).unwrap();
        assert_eq!(first[0].len(), 70);
        assert_eq!(first[0], second[0]);
        assert_ne!(first[0], first[1]);
        assert!(first[0].iter().all(|v| (-1.0..=1.0).contains(v)));
        assert_eq!(embedder.model_id(), "hashed-sha256-70");
    }

    #[test]
    fn test_cache_is_write_once() {
        let store = memory_store();
        let key = content_key("ship it");

        assert!(store.cached_embedding(&key, "m").unwrap().is_none());

        let (stored, is_new) = store.store_embedding(&key, "m", &[0.5, -1.0]).unwrap();
        assert!(is_new);
        assert_eq!(stored, vec![0.5, -1.0]);

        let (stored, is_new) = store.store_embedding(&key, "m", &[9.0, 9.0]).unwrap();
        assert!(!is_new);
        assert_eq!(stored, vec![0.5, -1.0]);
        assert_eq!(store.cached_embedding(&key, "m").unwrap(), Some(vec![0.5, -1.0]));
        assert_eq!(store.embedding_cache_len("m").unwrap(), 1);
    }

    #[test]
    fn test_cache_scoped_by_model() {
        let store = memory_store();
        let key = content_key("ship it");
        store.store_embedding(&key, "model-a", &[1.0]).unwrap();
        let (_, is_new) = store.store_embedding(&key, "model-b", &[2.0]).unwrap();
        assert!(is_new);
        assert_eq!(store.cached_embedding(&key, "model-a").unwrap(), Some(vec![1.0]));
        assert_eq!(store.cached_embedding(&key, "model-b").unwrap(), Some(vec![2.0]));
    }

    #[test]
    fn test_decode_rejects_truncated_blob() {
        assert!(matches!(
            decode_vector(&[0, 0, 0], 1),
            Err(ReactmapError::DimensionMismatch { .. })
        ));
    }
}
