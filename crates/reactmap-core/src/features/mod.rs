//! Feature extraction: per-reaction text and behavior blocks and their fusion.

mod behavior;
mod combine;
mod matrix;
mod text;

pub use behavior::{
    cooccurrence_counts, cooccurrence_matrix, user_preference_matrix, BehaviorFeatureExtractor,
};
pub use combine::FeatureCombiner;
pub use matrix::{hstack, l2_norm, l2_normalize_rows, standardize, FeatureMatrix};
pub use text::{CacheStats, TextFeatureExtractor};
