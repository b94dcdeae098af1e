//! Raw frame cleaning: dark subtraction, detector correction, HDR merge.

use crate::background::BackgroundAverage;
use ndarray::{ArrayView2, Zip};
use ptychoprep_core::{CleanFrame, Error, RawFrame, Result};

/// Intensity above which the first (long) exposure is treated as saturated.
pub const SATURATION_THRESHOLD: f64 = 3000.0;

/// Detector-specific raw-to-intensity correction.
///
/// The correction is opaque to the pipeline beyond being deterministic and
/// frame-shape-preserving; detector backends implement it for their readout
/// quirks.
pub trait DetectorCorrection: Send + Sync {
    /// Correction name, for diagnostics.
    fn name(&self) -> &'static str;

    /// Applies the correction to a dark-subtracted frame.
    fn apply(&self, frame: &RawFrame) -> CleanFrame;
}

/// Pass-through correction for detectors whose raw counts are already
/// linear intensities.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityCorrection;

impl DetectorCorrection for IdentityCorrection {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn apply(&self, frame: &RawFrame) -> CleanFrame {
        frame.clone()
    }
}

/// One raw frame or a short/long exposure pair.
#[derive(Debug, Clone, Copy)]
pub enum Exposure<'a> {
    /// Single-exposure acquisition.
    Single(ArrayView2<'a, f64>),
    /// Double-exposure acquisition: the first frame of a pair carries the
    /// long dwell, the second the short one.
    Double {
        /// First exposure of the pair.
        first: ArrayView2<'a, f64>,
        /// Second exposure of the pair.
        second: ArrayView2<'a, f64>,
    },
}

/// Subtracts the matching averaged dark frame.
#[must_use]
pub fn subtract_dark(raw: &ArrayView2<'_, f64>, dark: &ArrayView2<'_, f64>) -> RawFrame {
    raw - dark
}

/// Merges a cleaned exposure pair into one high-dynamic-range frame.
///
/// Pixels where the first exposure sits below `threshold` are unsaturated
/// and blend both exposures; saturated pixels fall back to the second
/// exposure alone. Both branches share the masked formula
/// `(ratio + 1) * (e1 * mask + e2) / (ratio * mask + 1)`, so the merge is
/// continuous at the threshold when `ratio == 1`.
#[must_use]
pub fn combine_double_exposure(
    first: &CleanFrame,
    second: &CleanFrame,
    ratio: f64,
    threshold: f64,
) -> CleanFrame {
    Zip::from(first).and(second).map_collect(|&e1, &e2| {
        let mask = if e1 < threshold { 1.0 } else { 0.0 };
        (ratio + 1.0) * (e1 * mask + e2) / (ratio * mask + 1.0)
    })
}

/// Turns one raw frame (or exposure pair) into one calibrated intensity
/// frame of the same spatial shape.
///
/// # Errors
/// Returns [`Error::Config`] when the exposure layout disagrees with the
/// background slots, or when a pair arrives without an exposure ratio.
pub fn clean_frame<C: DetectorCorrection + ?Sized>(
    exposure: &Exposure<'_>,
    background: &BackgroundAverage,
    correction: &C,
    exposure_ratio: Option<f64>,
) -> Result<CleanFrame> {
    match (exposure, background) {
        (Exposure::Single(raw), BackgroundAverage::Single(dark)) => {
            Ok(correction.apply(&subtract_dark(raw, &dark.view())))
        }
        (
            Exposure::Double { first, second },
            BackgroundAverage::Double {
                first: dark1,
                second: dark2,
            },
        ) => {
            let ratio = exposure_ratio.ok_or_else(|| {
                Error::Config("double exposure requires an exposure-time ratio".to_string())
            })?;
            let e1 = correction.apply(&subtract_dark(first, &dark1.view()));
            let e2 = correction.apply(&subtract_dark(second, &dark2.view()));
            Ok(combine_double_exposure(&e1, &e2, ratio, SATURATION_THRESHOLD))
        }
        _ => Err(Error::Config(
            "exposure layout does not match background slots".to_string(),
        )),
    }
}
