//! Intensity-weighted centroid of the illumination.

use ndarray::ArrayView2;
use ptychoprep_core::{Error, Result};

/// Zeroes negative intensities before centroid weighting.
///
/// Negative values are detector or interpolation artifacts and must not
/// pull the centroid.
#[must_use]
pub fn mask_negative(frame: ArrayView2<'_, f64>) -> ndarray::Array2<f64> {
    frame.mapv(|v| if v > 0.0 { v } else { 0.0 })
}

/// Computes the intensity-weighted mean `[row, column]` coordinate.
///
/// Runs exactly once per pipeline invocation, on the representative center
/// frame; the resulting shift is reused identically for every frame.
///
/// # Errors
/// Returns [`Error::DegenerateCentroid`] when the total intensity is zero,
/// since a NaN here would silently corrupt the alignment of every frame.
pub fn center_of_mass(frame: ArrayView2<'_, f64>, frame_index: usize) -> Result<[f64; 2]> {
    let mut total = 0.0f64;
    let mut row_weighted = 0.0f64;
    let mut col_weighted = 0.0f64;
    for ((row, col), &value) in frame.indexed_iter() {
        total += value;
        row_weighted += to_f64(row) * value;
        col_weighted += to_f64(col) * value;
    }
    if total == 0.0 || !total.is_finite() {
        return Err(Error::DegenerateCentroid { frame_index });
    }
    Ok([row_weighted / total, col_weighted / total])
}

#[allow(clippy::cast_precision_loss)]
fn to_f64(value: usize) -> f64 {
    value as f64
}
