//! Error types for ptychoprep-core.

use thiserror::Error;

/// Result type alias for ptychoprep operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for ptychoprep operations.
///
/// The pipeline runs to completion or aborts: none of these are retried.
/// Calibration and alignment are cross-frame decisions, so a failure in any
/// stage invalidates the whole run.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed scan metadata or pipeline configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A chunk or rank partition violated its covering invariant.
    ///
    /// Indicates an algorithmic defect, never a user-recoverable condition.
    #[error("partition invariant violated: {0}")]
    Partition(String),

    /// Centroid requested for a frame with zero total intensity.
    #[error("degenerate centroid: frame {frame_index} has zero total intensity")]
    DegenerateCentroid {
        /// Acquisition index of the offending frame.
        frame_index: usize,
    },

    /// A worker failed during a collective gather.
    #[error("gather failed on rank {rank}: {reason}")]
    Gather {
        /// Rank that reported the failure.
        rank: usize,
        /// Underlying failure description.
        reason: String,
    },

    /// Frame index outside the source range.
    #[error("frame index {index} out of range for source of {len} frames")]
    FrameOutOfRange {
        /// Requested absolute frame index.
        index: usize,
        /// Total frames available.
        len: usize,
    },
}
