//! Usage-pattern features: who uses a reaction and what it appears next to.

use super::matrix::{hstack, l2_normalize_rows, FeatureMatrix};
use crate::context::{CooccurrenceCounts, UserReactionCounts};
use crate::store::ReactionStore;
use crate::Result;
use std::collections::HashMap;
use tracing::info;

/// Builds the behavior block `[user preference | co-occurrence]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BehaviorFeatureExtractor;

impl BehaviorFeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Concatenated behavior features for the given symbols, one row each.
    pub fn behavior_features(
        &self,
        store: &ReactionStore,
        reactions: &[String],
    ) -> Result<FeatureMatrix> {
        let preferences = user_preference_matrix(&store.user_reaction_counts()?, reactions);
        let cooccurrence = cooccurrence_matrix(&store.reaction_cooccurrence()?, reactions);
        let features = hstack(&preferences, &cooccurrence)?;

        info!(
            target: "reactmap::features",
            "Behavior features: {} reactions x {} dims ({} user + {} co-occurrence)",
            features.nrows(),
            features.ncols(),
            preferences.ncols(),
            cooccurrence.ncols()
        );
        Ok(features)
    }
}

/// Rows are reactions, columns are users in sorted id order, entries are
/// usage counts; each row is L2-normalised.
///
/// With no users at all the result is a single zero column.
pub fn user_preference_matrix(counts: &UserReactionCounts, reactions: &[String]) -> FeatureMatrix {
    // BTreeMap keys are already sorted
    let users: Vec<&String> = counts.keys().collect();
    if users.is_empty() || reactions.is_empty() {
        return FeatureMatrix::zeros((reactions.len(), 1));
    }

    let mut matrix = FeatureMatrix::from_shape_fn((reactions.len(), users.len()), |(i, j)| {
        counts
            .get(users[j])
            .and_then(|per_user| per_user.get(&reactions[i]))
            .copied()
            .unwrap_or(0) as f64
    });
    l2_normalize_rows(&mut matrix);
    matrix
}

/// Raw shared-message counts as a symmetric `N x N` matrix with a zero diagonal.
///
/// Pairs naming a symbol outside `reactions` are ignored.
pub fn cooccurrence_counts(counts: &CooccurrenceCounts, reactions: &[String]) -> FeatureMatrix {
    let n = reactions.len();
    let mut matrix = FeatureMatrix::zeros((n, n));
    if n == 0 {
        return matrix;
    }

    let index: HashMap<&str, usize> = reactions
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();

    for (a, related) in counts {
        let Some(&i) = index.get(a.as_str()) else {
            continue;
        };
        for (b, &count) in related {
            let Some(&j) = index.get(b.as_str()) else {
                continue;
            };
            if i == j {
                continue;
            }
            matrix[[i, j]] = count as f64;
            matrix[[j, i]] = count as f64;
        }
    }
    matrix
}

/// [`cooccurrence_counts`] with each row L2-normalised.
pub fn cooccurrence_matrix(counts: &CooccurrenceCounts, reactions: &[String]) -> FeatureMatrix {
    let mut matrix = cooccurrence_counts(counts, reactions);
    l2_normalize_rows(&mut matrix);
    matrix
}
