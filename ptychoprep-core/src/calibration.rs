//! Run calibration: geometry derived once from the scan metadata.
//!
//! The calibration is computed by the coordinator on one representative
//! frame and then treated as immutable broadcast state. Recomputing any of
//! these values per frame would break alignment consistency across the
//! stack, so nothing here is mutable after construction.

use crate::error::{Error, Result};
use crate::metadata::ScanMetadata;
use serde::{Deserialize, Serialize};

/// Planck constant, J s.
pub const PLANCK: f64 = 6.626_070_15e-34;

/// Speed of light in vacuum, m/s.
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Elementary charge, C.
pub const ELEMENTARY_CHARGE: f64 = 1.602_176_634e-19;

/// Photon wavelength in meters for an energy in electron-volts.
#[must_use]
pub fn wavelength_m(energy_ev: f64) -> f64 {
    PLANCK * SPEED_OF_LIGHT / ELEMENTARY_CHARGE / energy_ev
}

/// Padded input frame width that yields `final_res` at the given geometry.
#[must_use]
pub fn resolution_to_padded_width(
    final_res: f64,
    detector_distance_m: f64,
    energy_ev: f64,
    detector_pixel_size_m: f64,
) -> f64 {
    detector_distance_m * wavelength_m(energy_ev) / (detector_pixel_size_m * final_res)
}

/// Immutable per-run calibration.
///
/// Built in two steps: [`Calibration::resolve`] derives the geometry from
/// the metadata and the discovered raw frame width, and the calibration
/// stage fills in the centroid shift via [`Calibration::with_centroid_shift`].
/// Every frame in the run is resampled with the same values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Calibration {
    /// Spatial width of one cleaned raw frame, in pixels.
    pub raw_frame_width: usize,
    /// Padded input width the resampler maps onto the output grid.
    pub padded_frame_width: f64,
    /// Output frame width in pixels.
    pub output_frame_width: usize,
    /// Rescaled pixel size of the output grid, meters (both axes).
    pub pixel_size_m: f64,
    /// Detector corner position `[x, y, z]` in meters.
    pub corner_position_m: [f64; 3],
    /// Photon energy converted to joules for persistence.
    pub energy_joules: f64,
    /// Width of the square all-ones pre-filter kernel, pixels.
    pub kernel_width: usize,
    /// Integer-rounded centroid alignment shift, output pixel units.
    pub centroid_shift: [f64; 2],
    /// Resample scale factor, `output_frame_width / padded_frame_width`.
    pub scale: f64,
    /// Long/short exposure time ratio under double exposure.
    pub exposure_ratio: Option<f64>,
}

impl Calibration {
    /// Derives the geometry half of the calibration.
    ///
    /// The centroid shift starts at zero; the calibration stage computes it
    /// on the representative frame and attaches it with
    /// [`Calibration::with_centroid_shift`].
    ///
    /// # Errors
    /// Returns [`Error::Config`] when the metadata is invalid or the raw
    /// frame width is zero.
    pub fn resolve(metadata: &ScanMetadata, raw_frame_width: usize) -> Result<Self> {
        metadata.validate()?;
        if raw_frame_width == 0 {
            return Err(Error::Config("raw frame width must be positive".to_string()));
        }

        let padded_frame_width = match (metadata.desired_padded_width, metadata.final_resolution_m)
        {
            (Some(width), _) => width,
            (None, Some(final_res)) => resolution_to_padded_width(
                final_res,
                metadata.detector_distance_m,
                metadata.energy_ev,
                metadata.detector_pixel_size_m,
            ),
            (None, None) => unreachable!("validate() requires one of the two"),
        };

        let output_frame_width = metadata.output_frame_width;
        let out_f = to_f64(output_frame_width);
        let pixel_size_m = metadata.detector_pixel_size_m * padded_frame_width / out_f;
        let corner_xy = pixel_size_m * out_f / 2.0;

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let kernel_width = ((padded_frame_width / out_f).floor().max(1.0)) as usize;

        Ok(Self {
            raw_frame_width,
            padded_frame_width,
            output_frame_width,
            pixel_size_m,
            corner_position_m: [corner_xy, corner_xy, metadata.detector_distance_m],
            energy_joules: metadata.energy_ev * ELEMENTARY_CHARGE,
            kernel_width,
            centroid_shift: [0.0, 0.0],
            scale: out_f / padded_frame_width,
            exposure_ratio: metadata.exposure_ratio()?,
        })
    }

    /// Attaches the centroid alignment shift computed on the representative
    /// frame.
    #[must_use]
    pub fn with_centroid_shift(mut self, shift: [f64; 2]) -> Self {
        self.centroid_shift = shift;
        self
    }
}

#[allow(clippy::cast_precision_loss)]
fn to_f64(value: usize) -> f64 {
    value as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn metadata() -> ScanMetadata {
        ScanMetadata {
            energy_ev: 1300.0,
            detector_distance_m: 0.121,
            detector_pixel_size_m: 30e-6,
            final_resolution_m: Some(5e-9),
            desired_padded_width: None,
            output_frame_width: 256,
            double_exposure: false,
            dwell1: None,
            dwell2: None,
            translations_um: None,
        }
    }

    #[test]
    fn wavelength_matches_physical_constants() {
        // 1300 eV soft x-rays are just under a nanometer.
        let lambda = wavelength_m(1300.0);
        assert_relative_eq!(lambda, 9.537e-10, max_relative = 1e-3);
    }

    #[test]
    fn resolve_derives_padded_width_from_resolution() {
        let calib = Calibration::resolve(&metadata(), 980).unwrap();
        let expected = 0.121 * wavelength_m(1300.0) / (30e-6 * 5e-9);
        assert_relative_eq!(calib.padded_frame_width, expected);
        assert_relative_eq!(calib.scale, 256.0 / expected);
    }

    #[test]
    fn explicit_padded_width_wins() {
        let mut meta = metadata();
        meta.desired_padded_width = Some(1200.0);
        let calib = Calibration::resolve(&meta, 980).unwrap();
        assert_relative_eq!(calib.padded_frame_width, 1200.0);
        assert_eq!(calib.kernel_width, 4); // floor(1200 / 256)
    }

    #[test]
    fn kernel_width_clamps_to_one() {
        let mut meta = metadata();
        meta.desired_padded_width = Some(100.0);
        let calib = Calibration::resolve(&meta, 980).unwrap();
        assert_eq!(calib.kernel_width, 1);
    }

    #[test]
    fn pixel_size_and_corner_follow_rescale() {
        let mut meta = metadata();
        meta.desired_padded_width = Some(1024.0);
        let calib = Calibration::resolve(&meta, 980).unwrap();
        let expected_pixel = 30e-6 * 1024.0 / 256.0;
        assert_relative_eq!(calib.pixel_size_m, expected_pixel);
        assert_relative_eq!(calib.corner_position_m[0], expected_pixel * 128.0);
        assert_relative_eq!(calib.corner_position_m[2], 0.121);
    }

    #[test]
    fn energy_persisted_in_joules() {
        let calib = Calibration::resolve(&metadata(), 980).unwrap();
        assert_relative_eq!(calib.energy_joules, 1300.0 * ELEMENTARY_CHARGE);
    }

    #[test]
    fn centroid_shift_attaches_without_touching_geometry() {
        let calib = Calibration::resolve(&metadata(), 980).unwrap();
        let padded = calib.padded_frame_width;
        let shifted = calib.with_centroid_shift([3.0, -2.0]);
        assert_relative_eq!(shifted.centroid_shift[0], 3.0);
        assert_relative_eq!(shifted.padded_frame_width, padded);
    }
}
