//! Centroid-anchored bilinear resampling onto the output grid.

use ndarray::Array2;
use ptychoprep_core::{Calibration, CleanFrame, OutputFrame};

/// Weight columns whose total falls below this are treated as empty.
const WEIGHT_EPSILON: f64 = 1000.0 * f32::EPSILON as f64;

/// Separable bilinear scale-and-translate resampler.
///
/// The sampling grid, centroid shift, and scale are fixed for the whole
/// run: the weight matrices are built once from the calibration and applied
/// unchanged to every frame. Rebuilding them per frame would be an
/// alignment bug, not a performance choice.
#[derive(Debug, Clone)]
pub struct Resampler {
    weights_rows: Array2<f64>,
    weights_cols: Array2<f64>,
    output_width: usize,
}

impl Resampler {
    /// Builds the resampler for the given input width, output width, scale
    /// factor, and `[row, column]` centroid shift in output pixels.
    #[must_use]
    pub fn new(input_width: usize, output_width: usize, scale: f64, shift: [f64; 2]) -> Self {
        Self {
            weights_rows: axis_weights(input_width, output_width, scale, shift[0]),
            weights_cols: axis_weights(input_width, output_width, scale, shift[1]),
            output_width,
        }
    }

    /// Builds the run resampler from the finished calibration.
    #[must_use]
    pub fn from_calibration(calibration: &Calibration) -> Self {
        Self::new(
            calibration.raw_frame_width,
            calibration.output_frame_width,
            calibration.scale,
            calibration.centroid_shift,
        )
    }

    /// Output frame width in pixels.
    #[must_use]
    pub fn output_width(&self) -> usize {
        self.output_width
    }

    /// Resamples one filtered frame onto the output grid.
    ///
    /// Bilinear, no antialiasing; negative interpolation artifacts are
    /// clamped to zero and the result is fixed single precision.
    #[must_use]
    pub fn resample(&self, frame: &CleanFrame) -> OutputFrame {
        let resampled = self.weights_rows.t().dot(frame).dot(&self.weights_cols);
        resampled.mapv(|v| if v > 0.0 { to_f32(v) } else { 0.0 })
    }
}

/// Sampling weights for one axis, shape `(input_size, output_size)`.
///
/// Output pixel `o` samples the input at `s = (o + 0.5 - t)/scale - 0.5`
/// with a triangle kernel of unit support. Each output column is
/// renormalized by its weight total; columns whose sample point falls
/// entirely outside `[-0.5, input - 0.5]` contribute nothing.
fn axis_weights(
    input_size: usize,
    output_size: usize,
    scale: f64,
    translation: f64,
) -> Array2<f64> {
    let mut weights = Array2::<f64>::zeros((input_size, output_size));
    for o in 0..output_size {
        let sample = (to_f64(o) + 0.5 - translation) / scale - 0.5;
        if sample < -0.5 || sample > to_f64(input_size) - 0.5 {
            continue;
        }
        let mut total = 0.0f64;
        for i in 0..input_size {
            let w = (1.0 - (sample - to_f64(i)).abs()).max(0.0);
            weights[[i, o]] = w;
            total += w;
        }
        if total > WEIGHT_EPSILON {
            for i in 0..input_size {
                weights[[i, o]] /= total;
            }
        } else {
            for i in 0..input_size {
                weights[[i, o]] = 0.0;
            }
        }
    }
    weights
}

#[allow(clippy::cast_precision_loss)]
fn to_f64(value: usize) -> f64 {
    value as f64
}

#[allow(clippy::cast_possible_truncation)]
fn to_f32(value: f64) -> f32 {
    value as f32
}
