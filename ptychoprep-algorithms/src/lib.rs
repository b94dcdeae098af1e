//! ptychoprep-algorithms: Per-frame numerics for ptychography preprocessing.
//!
//! This crate implements the numeric pipeline applied to every frame:
//! - **cleaning** - dark subtraction, detector correction, HDR exposure merge
//! - **filtering** - all-ones box pre-filter before downsampling
//! - **centroid** - intensity-weighted center of the illumination
//! - **resampling** - centroid-anchored bilinear scale-and-translate
//!
//! plus the once-per-run calibration step that fixes the centroid shift and
//! background averages for the whole stack.
//!
#![warn(missing_docs)]

mod background;
mod centroid;
mod clean;
mod filter;
mod prepare;
mod resample;

pub use background::BackgroundAverage;
pub use centroid::{center_of_mass, mask_negative};
pub use clean::{
    clean_frame, combine_double_exposure, subtract_dark, DetectorCorrection, Exposure,
    IdentityCorrection, SATURATION_THRESHOLD,
};
pub use filter::box_filter;
pub use prepare::{calibrate, center_frame_index, prepare_item};
pub use resample::Resampler;
