//! Frame type aliases and the per-frame result record.

use ndarray::{Array2, Array3};

/// A raw detector frame as read from the source.
pub type RawFrame = Array2<f64>;

/// A calibrated intensity frame, same spatial shape as the raw frame.
pub type CleanFrame = Array2<f64>;

/// A centered, resampled output frame (fixed single precision).
pub type OutputFrame = Array2<f32>;

/// The assembled output stack, shape `(n_frames, output_width, output_width)`.
pub type OutputStack = Array3<f32>;

/// One processed frame tagged with its destination in acquisition order.
///
/// Workers may process non-contiguous, interleaved indices; the assembler
/// scatters by `index`, so ordering never depends on processing order.
#[derive(Debug, Clone)]
pub struct FrameRecord {
    /// The resampled output frame.
    pub frame: OutputFrame,
    /// Destination index in acquisition order (pair index under double
    /// exposure).
    pub index: usize,
}

impl FrameRecord {
    /// Creates a record for a frame destined for `index`.
    #[must_use]
    pub fn new(frame: OutputFrame, index: usize) -> Self {
        Self { frame, index }
    }
}
