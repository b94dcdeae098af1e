//! Box pre-filter applied before downsampling.

use ndarray::Array2;
use ptychoprep_core::CleanFrame;

/// Convolves the frame with a square all-ones kernel, same-size output,
/// zero-fill boundary.
///
/// This is the shot-noise-suppressing blur applied before the resampler
/// shrinks the frame; the kernel width comes from the run calibration and
/// a width of one is a no-op. The kernel is separable, so the convolution
/// runs as two windowed sums with the `same`-mode alignment of a full
/// convolution crop: for width `k` the window spans `ceil((k-1)/2)` pixels
/// below and `floor((k-1)/2)` above.
#[must_use]
pub fn box_filter(frame: &CleanFrame, kernel_width: usize) -> CleanFrame {
    if kernel_width <= 1 {
        return frame.clone();
    }
    let reach_below = kernel_width - 1 - (kernel_width - 1) / 2;
    let reach_above = (kernel_width - 1) / 2;

    let (rows, cols) = frame.dim();
    let mut by_cols = Array2::<f64>::zeros((rows, cols));
    let mut prefix = vec![0.0f64; cols + 1];
    for r in 0..rows {
        for c in 0..cols {
            prefix[c + 1] = prefix[c] + frame[[r, c]];
        }
        for c in 0..cols {
            let lo = c.saturating_sub(reach_below);
            let hi = (c + reach_above + 1).min(cols);
            by_cols[[r, c]] = prefix[hi] - prefix[lo];
        }
    }

    let mut filtered = Array2::<f64>::zeros((rows, cols));
    let mut prefix = vec![0.0f64; rows + 1];
    for c in 0..cols {
        for r in 0..rows {
            prefix[r + 1] = prefix[r] + by_cols[[r, c]];
        }
        for r in 0..rows {
            let lo = r.saturating_sub(reach_below);
            let hi = (r + reach_above + 1).min(rows);
            filtered[[r, c]] = prefix[hi] - prefix[lo];
        }
    }
    filtered
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    #[test]
    fn width_one_is_identity() {
        let mut frame = Array2::<f64>::zeros((3, 3));
        frame[[1, 1]] = 5.0;
        let filtered = box_filter(&frame, 1);
        assert_eq!(filtered, frame);
    }

    #[test]
    fn delta_spreads_over_odd_window() {
        let mut frame = Array2::<f64>::zeros((5, 5));
        frame[[2, 2]] = 1.0;
        let filtered = box_filter(&frame, 3);
        for r in 1..4 {
            for c in 1..4 {
                assert_relative_eq!(filtered[[r, c]], 1.0);
            }
        }
        assert_relative_eq!(filtered[[0, 0]], 0.0);
        assert_relative_eq!(filtered[[4, 2]], 0.0);
    }

    #[test]
    fn even_window_reaches_further_below() {
        let mut frame = Array2::<f64>::zeros((6, 6));
        frame[[3, 3]] = 1.0;
        let filtered = box_filter(&frame, 4);
        // Window spans offsets -2..=+1 around each output pixel, so the
        // delta at (3, 3) is seen from rows/cols 2..=5.
        for r in 2..6 {
            for c in 2..6 {
                assert_relative_eq!(filtered[[r, c]], 1.0);
            }
        }
        assert_relative_eq!(filtered[[1, 3]], 0.0);
        assert_relative_eq!(filtered[[3, 1]], 0.0);
    }

    #[test]
    fn boundary_is_zero_filled() {
        let frame = Array2::<f64>::ones((4, 4));
        let filtered = box_filter(&frame, 3);
        // Corners see only a 2x2 neighborhood of ones.
        assert_relative_eq!(filtered[[0, 0]], 4.0);
        // Interior pixels see the full 3x3 window.
        assert_relative_eq!(filtered[[1, 1]], 9.0);
        assert_relative_eq!(filtered[[2, 2]], 9.0);
    }
}
