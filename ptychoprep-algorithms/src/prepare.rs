//! Once-per-run calibration and the shared per-item numeric path.

use crate::background::BackgroundAverage;
use crate::centroid::{center_of_mass, mask_negative};
use crate::clean::{clean_frame, DetectorCorrection, Exposure};
use crate::filter::box_filter;
use crate::resample::Resampler;
use ndarray::{ArrayView3, Axis};
use ptychoprep_core::{Calibration, Error, OutputFrame, Result, ScanMetadata};

/// Raw index of the representative frame used for centroid calibration.
///
/// The temporal middle of the scan, rounded down to an even index so an
/// exposure pair is never split. Using the scan center instead of the first
/// frame reduces systematic alignment bias.
#[must_use]
pub fn center_frame_index(n_raw_frames: usize) -> usize {
    let mut center = n_raw_frames / 2;
    if center % 2 == 1 {
        center -= 1;
    }
    center
}

/// Runs the calibration step on the representative center frame.
///
/// `center_frames` holds one raw frame, or the two frames of the center
/// exposure pair under double exposure; `center_index` is that frame's raw
/// acquisition index and only feeds failure diagnostics. Produces the
/// immutable run calibration (geometry plus integer centroid shift) and the
/// shared background averages; both are broadcast state for the rest of the
/// run and must not be recomputed per frame.
///
/// # Errors
/// Returns [`Error::Config`] for invalid metadata or a malformed center
/// selection, and [`Error::DegenerateCentroid`] naming `center_index` when
/// the representative frame carries no intensity.
pub fn calibrate<C: DetectorCorrection + ?Sized>(
    metadata: &ScanMetadata,
    center_frames: ArrayView3<'_, f64>,
    center_index: usize,
    dark_frames: ArrayView3<'_, f64>,
    correction: &C,
) -> Result<(Calibration, BackgroundAverage)> {
    metadata.validate()?;

    let background = BackgroundAverage::from_stack(dark_frames, metadata.double_exposure)?;

    let expected = metadata.frames_per_item();
    if center_frames.dim().0 != expected {
        return Err(Error::Config(format!(
            "expected {expected} center frame(s), got {}",
            center_frames.dim().0
        )));
    }
    let exposure = if metadata.double_exposure {
        Exposure::Double {
            first: center_frames.index_axis(Axis(0), 0),
            second: center_frames.index_axis(Axis(0), 1),
        }
    } else {
        Exposure::Single(center_frames.index_axis(Axis(0), 0))
    };

    let clean = clean_frame(
        &exposure,
        &background,
        correction,
        metadata.exposure_ratio()?,
    )?;

    // The raw frame width is discovered here, from the first cleaned frame.
    let calibration = Calibration::resolve(metadata, clean.nrows())?;

    let filtered = box_filter(&clean, calibration.kernel_width);
    let trial = Resampler::new(
        calibration.raw_frame_width,
        calibration.output_frame_width,
        calibration.scale,
        [0.0, 0.0],
    );
    let resampled = trial.resample(&filtered).mapv(f64::from);

    let masked = mask_negative(resampled.view());
    let com = center_of_mass(masked.view(), center_index)?;

    let half = to_f64(calibration.output_frame_width / 2);
    let shift = [half - com[0].round(), half - com[1].round()];
    Ok((calibration.with_centroid_shift(shift), background))
}

/// Cleans, filters, and resamples one item (frame or exposure pair).
///
/// This is the single numeric path shared by both pipeline drivers; the
/// calibration and resampler are fixed broadcast state.
///
/// # Errors
/// Propagates cleaning failures; see [`clean_frame`].
pub fn prepare_item<C: DetectorCorrection + ?Sized>(
    exposure: &Exposure<'_>,
    background: &BackgroundAverage,
    correction: &C,
    calibration: &Calibration,
    resampler: &Resampler,
) -> Result<OutputFrame> {
    let clean = clean_frame(exposure, background, correction, calibration.exposure_ratio)?;
    let filtered = box_filter(&clean, calibration.kernel_width);
    Ok(resampler.resample(&filtered))
}

#[allow(clippy::cast_precision_loss)]
fn to_f64(value: usize) -> f64 {
    value as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clean::IdentityCorrection;
    use approx::assert_relative_eq;
    use ndarray::{Array2, Array3};

    fn metadata(width: usize) -> ScanMetadata {
        ScanMetadata {
            energy_ev: 1300.0,
            detector_distance_m: 0.121,
            detector_pixel_size_m: 30e-6,
            final_resolution_m: None,
            desired_padded_width: Some(to_f64(width)),
            output_frame_width: width,
            double_exposure: false,
            dwell1: None,
            dwell2: None,
            translations_um: None,
        }
    }

    fn stack_with_peak(width: usize, row: usize, col: usize) -> Array3<f64> {
        let mut frames = Array3::<f64>::zeros((1, width, width));
        frames[[0, row, col]] = 100.0;
        frames
    }

    #[test]
    fn center_index_rounds_down_to_even() {
        assert_eq!(center_frame_index(10), 4);
        assert_eq!(center_frame_index(8), 4);
        assert_eq!(center_frame_index(7), 2);
        assert_eq!(center_frame_index(2), 0);
    }

    #[test]
    fn calibrate_centers_an_offset_peak() {
        let width = 16;
        let frames = stack_with_peak(width, 5, 9);
        let darks = Array3::<f64>::zeros((2, width, width));
        let (calib, _) = calibrate(
            &metadata(width),
            frames.view(),
            0,
            darks.view(),
            &IdentityCorrection,
        )
        .unwrap();
        // Peak at (5, 9), output half-width 8: shift is (8-5, 8-9).
        assert_relative_eq!(calib.centroid_shift[0], 3.0);
        assert_relative_eq!(calib.centroid_shift[1], -1.0);
    }

    #[test]
    fn calibrated_shift_recenters_the_peak() {
        let width = 16;
        let frames = stack_with_peak(width, 5, 9);
        let darks = Array3::<f64>::zeros((2, width, width));
        let meta = metadata(width);
        let (calib, background) =
            calibrate(&meta, frames.view(), 0, darks.view(), &IdentityCorrection).unwrap();

        let resampler = Resampler::from_calibration(&calib);
        let exposure = Exposure::Single(frames.index_axis(Axis(0), 0));
        let out = prepare_item(
            &exposure,
            &background,
            &IdentityCorrection,
            &calib,
            &resampler,
        )
        .unwrap();
        assert_relative_eq!(f64::from(out[[8, 8]]), 100.0);
    }

    #[test]
    fn empty_center_frame_is_degenerate() {
        let width = 8;
        let frames = Array3::<f64>::zeros((1, width, width));
        let darks = Array3::<f64>::zeros((2, width, width));
        let err = calibrate(
            &metadata(width),
            frames.view(),
            4,
            darks.view(),
            &IdentityCorrection,
        )
        .unwrap_err();
        // The error names the representative frame, not a placeholder.
        assert!(matches!(err, Error::DegenerateCentroid { frame_index: 4 }));
    }

    #[test]
    fn wrong_center_selection_is_rejected() {
        let width = 8;
        let frames = Array3::<f64>::zeros((2, width, width));
        let darks = Array3::<f64>::zeros((2, width, width));
        // Single exposure expects exactly one center frame.
        assert!(calibrate(
            &metadata(width),
            frames.view(),
            0,
            darks.view(),
            &IdentityCorrection,
        )
        .is_err());
    }
}
