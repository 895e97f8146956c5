//! Reaction clustering engine for reactmap.

pub mod cluster;
mod context;
mod embedding;
mod error;
pub mod features;
mod pipeline;
mod report;
mod results;
mod store;

pub use cluster::{algorithm_from_name, ClusteringResult, Clusterer};
pub use context::{CooccurrenceCounts, UserReactionCounts};
#[cfg(feature = "fastembed")]
pub use embedding::FastEmbedder;
pub use embedding::{content_key, Embedder, HashedEmbedder};
pub use error::ReactmapError;
pub use pipeline::{run_clustering, PipelineOptions};
pub use report::ReportFile;
pub use store::{BaseCounts, ReactionStore};

/// Result type alias for reactmap operations.
pub type Result<T> = std::result::Result<T, ReactmapError>;
