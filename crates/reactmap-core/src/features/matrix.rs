//! Dense feature matrices: one `f64` row per reaction symbol.

use crate::{ReactmapError, Result};
use ndarray::{concatenate, Array2, ArrayView1, Axis};

pub type FeatureMatrix = Array2<f64>;

/// Z-score every column over the rows (population standard deviation).
///
/// Constant columns have zero spread; they are centred and left unscaled,
/// which turns them into zeros.
pub fn standardize(features: &FeatureMatrix) -> FeatureMatrix {
    let Some(mean) = features.mean_axis(Axis(0)) else {
        return features.clone();
    };
    let spread = features
        .std_axis(Axis(0), 0.0)
        .mapv(|s| if s > f64::EPSILON { s } else { 1.0 });
    (features - &mean) / &spread
}

/// Scale every row to unit L2 norm; all-zero rows stay zero.
pub fn l2_normalize_rows(features: &mut FeatureMatrix) {
    for mut row in features.rows_mut() {
        let norm = l2_norm(row.view());
        if norm > 0.0 {
            row /= norm;
        }
    }
}

/// Join two blocks column-wise. Row counts must agree.
pub fn hstack(left: &FeatureMatrix, right: &FeatureMatrix) -> Result<FeatureMatrix> {
    if left.nrows() != right.nrows() {
        return Err(ReactmapError::DimensionMismatch {
            expected: left.nrows(),
            actual: right.nrows(),
        });
    }
    Ok(concatenate![Axis(1), left.view(), right.view()])
}

pub fn l2_norm(values: ArrayView1<'_, f64>) -> f64 {
    values.dot(&values).sqrt()
}
