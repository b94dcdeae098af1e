//! Averaged dark-current backgrounds.

use ndarray::{s, Array2, ArrayView3, Axis};
use ptychoprep_core::{Error, Result};

/// Averaged dark frames, one per exposure slot.
///
/// Computed once before any frame processing and shared read-only for the
/// remainder of the run.
#[derive(Debug, Clone)]
pub enum BackgroundAverage {
    /// Single-exposure acquisition: one averaged dark frame.
    Single(Array2<f64>),
    /// Double-exposure acquisition: even-index darks average into `first`,
    /// odd-index darks into `second`.
    Double {
        /// Background for the first (long) exposure slot.
        first: Array2<f64>,
        /// Background for the second (short) exposure slot.
        second: Array2<f64>,
    },
}

impl BackgroundAverage {
    /// Averages a dark-frame stack into per-slot backgrounds.
    ///
    /// # Errors
    /// Returns [`Error::Config`] for an empty stack, or one too short to
    /// populate both exposure slots.
    pub fn from_stack(darks: ArrayView3<'_, f64>, double_exposure: bool) -> Result<Self> {
        if double_exposure {
            let first = darks
                .slice(s![0..;2, .., ..])
                .mean_axis(Axis(0))
                .ok_or_else(|| Error::Config("dark stack is empty".to_string()))?;
            let second = darks
                .slice(s![1..;2, .., ..])
                .mean_axis(Axis(0))
                .ok_or_else(|| {
                    Error::Config("dark stack has no second-exposure frames".to_string())
                })?;
            Ok(Self::Double { first, second })
        } else {
            let avg = darks
                .mean_axis(Axis(0))
                .ok_or_else(|| Error::Config("dark stack is empty".to_string()))?;
            Ok(Self::Single(avg))
        }
    }

    /// Spatial shape of the averaged background.
    #[must_use]
    pub fn frame_shape(&self) -> (usize, usize) {
        match self {
            Self::Single(avg) | Self::Double { first: avg, .. } => avg.dim(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array3;

    #[test]
    fn single_exposure_averages_all_darks() {
        let mut darks = Array3::<f64>::zeros((4, 2, 2));
        for i in 0..4 {
            darks.slice_mut(s![i, .., ..]).fill(i as f64);
        }
        let bg = BackgroundAverage::from_stack(darks.view(), false).unwrap();
        match bg {
            BackgroundAverage::Single(avg) => assert_relative_eq!(avg[[0, 0]], 1.5),
            BackgroundAverage::Double { .. } => panic!("expected single background"),
        }
    }

    #[test]
    fn double_exposure_splits_even_and_odd() {
        let mut darks = Array3::<f64>::zeros((4, 2, 2));
        for i in 0..4 {
            darks.slice_mut(s![i, .., ..]).fill(i as f64);
        }
        let bg = BackgroundAverage::from_stack(darks.view(), true).unwrap();
        match bg {
            BackgroundAverage::Double { first, second } => {
                assert_relative_eq!(first[[0, 0]], 1.0); // (0 + 2) / 2
                assert_relative_eq!(second[[1, 1]], 2.0); // (1 + 3) / 2
            }
            BackgroundAverage::Single(_) => panic!("expected double background"),
        }
    }

    #[test]
    fn empty_stack_is_a_config_error() {
        let darks = Array3::<f64>::zeros((0, 2, 2));
        assert!(BackgroundAverage::from_stack(darks.view(), false).is_err());
    }

    #[test]
    fn single_dark_cannot_fill_both_slots() {
        let darks = Array3::<f64>::zeros((1, 2, 2));
        assert!(BackgroundAverage::from_stack(darks.view(), true).is_err());
    }
}
