//! ptychoprep-core: Core types for ptychography frame-stack preprocessing.
//!
//! This crate provides the foundational pieces shared by the numeric and
//! pipeline layers: the scan metadata record, the immutable run calibration,
//! the chunk/rank partitioner, and the error taxonomy.
//!

pub mod calibration;
pub mod error;
pub mod frame;
pub mod metadata;
pub mod partition;
pub mod role;

pub use calibration::{resolution_to_padded_width, wavelength_m, Calibration};
pub use error::{Error, Result};
pub use frame::{CleanFrame, FrameRecord, OutputFrame, OutputStack, RawFrame};
pub use metadata::{convert_translations, ScanMetadata, DEFAULT_OUTPUT_FRAME_WIDTH};
pub use partition::{loop_chunks, rank_slices, ChunkPlan};
pub use role::Role;
