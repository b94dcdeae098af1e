//! Scan metadata record and validation.
//!
//! The metadata arrives as a JSON object written by the acquisition side.
//! It is validated once, before any frame is touched; every numeric problem
//! found here is a fatal configuration error.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Default width of the resampled output frames, in pixels.
pub const DEFAULT_OUTPUT_FRAME_WIDTH: usize = 256;

fn default_output_frame_width() -> usize {
    DEFAULT_OUTPUT_FRAME_WIDTH
}

/// Experiment metadata for one scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanMetadata {
    /// Photon energy in electron-volts.
    pub energy_ev: f64,
    /// Sample-to-detector distance in meters.
    pub detector_distance_m: f64,
    /// Physical detector pixel size in meters.
    pub detector_pixel_size_m: f64,
    /// Desired final pixel resolution in meters. Ignored when
    /// `desired_padded_width` is set.
    #[serde(default)]
    pub final_resolution_m: Option<f64>,
    /// Explicit padded input frame width override, in pixels.
    #[serde(default)]
    pub desired_padded_width: Option<f64>,
    /// Width of the resampled output frames, in pixels.
    #[serde(default = "default_output_frame_width")]
    pub output_frame_width: usize,
    /// Whether frames were acquired as short/long exposure pairs.
    #[serde(default)]
    pub double_exposure: bool,
    /// Dwell time of the long exposure (required under double exposure).
    #[serde(default)]
    pub dwell1: Option<f64>,
    /// Dwell time of the short exposure (required under double exposure).
    #[serde(default)]
    pub dwell2: Option<f64>,
    /// Scan positions in micrometers, acquisition order.
    #[serde(default)]
    pub translations_um: Option<Vec<[f64; 2]>>,
}

impl ScanMetadata {
    /// Validates the record before any frame processing begins.
    ///
    /// # Errors
    /// Returns [`Error::Config`] for missing or non-positive required fields.
    pub fn validate(&self) -> Result<()> {
        if !(self.energy_ev.is_finite() && self.energy_ev > 0.0) {
            return Err(Error::Config(format!(
                "energy must be positive, got {} eV",
                self.energy_ev
            )));
        }
        if !(self.detector_distance_m.is_finite() && self.detector_distance_m > 0.0) {
            return Err(Error::Config(format!(
                "detector distance must be positive, got {} m",
                self.detector_distance_m
            )));
        }
        if !(self.detector_pixel_size_m.is_finite() && self.detector_pixel_size_m > 0.0) {
            return Err(Error::Config(format!(
                "detector pixel size must be positive, got {} m",
                self.detector_pixel_size_m
            )));
        }
        if self.output_frame_width == 0 {
            return Err(Error::Config(
                "output frame width must be positive".to_string(),
            ));
        }
        match (self.desired_padded_width, self.final_resolution_m) {
            (Some(width), _) if !(width.is_finite() && width > 0.0) => {
                return Err(Error::Config(format!(
                    "desired padded width must be positive, got {width}"
                )));
            }
            (None, Some(res)) if !(res.is_finite() && res > 0.0) => {
                return Err(Error::Config(format!(
                    "final resolution must be positive, got {res} m"
                )));
            }
            (None, None) => {
                return Err(Error::Config(
                    "either final_resolution_m or desired_padded_width is required".to_string(),
                ));
            }
            _ => {}
        }
        if self.double_exposure {
            let (dwell1, dwell2) = match (self.dwell1, self.dwell2) {
                (Some(d1), Some(d2)) => (d1, d2),
                _ => {
                    return Err(Error::Config(
                        "double exposure requires dwell1 and dwell2".to_string(),
                    ));
                }
            };
            if !(dwell1.is_finite() && dwell1 > 0.0 && dwell2.is_finite() && dwell2 > 0.0) {
                return Err(Error::Config(format!(
                    "dwell times must be positive, got dwell1={dwell1} dwell2={dwell2}"
                )));
            }
        }
        Ok(())
    }

    /// Validates the raw frame count against the exposure layout.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if double exposure is enabled and the raw
    /// frame count is odd, since exposure pairs must never be split.
    pub fn validate_frame_count(&self, n_raw_frames: usize) -> Result<()> {
        if self.double_exposure && n_raw_frames % 2 != 0 {
            return Err(Error::Config(format!(
                "double exposure requires an even raw frame count, got {n_raw_frames}"
            )));
        }
        Ok(())
    }

    /// Number of output items: frames, or exposure pairs under double
    /// exposure.
    #[must_use]
    pub fn item_count(&self, n_raw_frames: usize) -> usize {
        if self.double_exposure {
            n_raw_frames / 2
        } else {
            n_raw_frames
        }
    }

    /// Raw frames consumed per output item.
    #[must_use]
    pub fn frames_per_item(&self) -> usize {
        if self.double_exposure {
            2
        } else {
            1
        }
    }

    /// Time ratio between the long and short exposure, floored to an
    /// integer as the acquisition software reports it.
    ///
    /// # Errors
    /// Returns [`Error::Config`] when dwell times are missing under double
    /// exposure.
    pub fn exposure_ratio(&self) -> Result<Option<f64>> {
        if !self.double_exposure {
            return Ok(None);
        }
        match (self.dwell1, self.dwell2) {
            (Some(d1), Some(d2)) if d2 > 0.0 => Ok(Some((d1 / d2).floor())),
            _ => Err(Error::Config(
                "double exposure requires dwell1 and dwell2".to_string(),
            )),
        }
    }
}

/// Converts raw scan positions (micrometers) to meter triples.
///
/// The second axis is read in reverse acquisition order, matching the stage
/// raster direction.
#[must_use]
pub fn convert_translations(translations_um: &[[f64; 2]]) -> Vec<[f64; 3]> {
    let n = translations_um.len();
    (0..n)
        .map(|i| {
            [
                translations_um[i][1] * 1e-6,
                translations_um[n - 1 - i][0] * 1e-6,
                0.0,
            ]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn valid_metadata() -> ScanMetadata {
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
    fn valid_record_passes() {
        valid_metadata().validate().unwrap();
    }

    #[test]
    fn missing_resolution_and_override_rejected() {
        let mut meta = valid_metadata();
        meta.final_resolution_m = None;
        assert!(meta.validate().is_err());
    }

    #[test]
    fn non_positive_energy_rejected() {
        let mut meta = valid_metadata();
        meta.energy_ev = 0.0;
        assert!(meta.validate().is_err());
    }

    #[test]
    fn double_exposure_requires_dwell_times() {
        let mut meta = valid_metadata();
        meta.double_exposure = true;
        assert!(meta.validate().is_err());
        meta.dwell1 = Some(500.0);
        meta.dwell2 = Some(100.0);
        meta.validate().unwrap();
    }

    #[test]
    fn odd_frame_count_under_double_exposure_rejected() {
        let mut meta = valid_metadata();
        meta.double_exposure = true;
        meta.dwell1 = Some(500.0);
        meta.dwell2 = Some(100.0);
        assert!(meta.validate_frame_count(11).is_err());
        meta.validate_frame_count(10).unwrap();
    }

    #[test]
    fn exposure_ratio_is_floored() {
        let mut meta = valid_metadata();
        meta.double_exposure = true;
        meta.dwell1 = Some(500.0);
        meta.dwell2 = Some(300.0);
        let ratio = meta.exposure_ratio().unwrap().unwrap();
        assert_relative_eq!(ratio, 1.0);
    }

    #[test]
    fn item_count_halves_under_double_exposure() {
        let mut meta = valid_metadata();
        assert_eq!(meta.item_count(8), 8);
        meta.double_exposure = true;
        assert_eq!(meta.item_count(8), 4);
        assert_eq!(meta.frames_per_item(), 2);
    }

    #[test]
    fn translations_convert_to_meter_triples() {
        let raw = vec![[1.0, 2.0], [3.0, 4.0]];
        let converted = convert_translations(&raw);
        assert_relative_eq!(converted[0][0], 2e-6);
        assert_relative_eq!(converted[0][1], 3e-6);
        assert_relative_eq!(converted[0][2], 0.0);
        assert_relative_eq!(converted[1][0], 4e-6);
        assert_relative_eq!(converted[1][1], 1e-6);
    }

    #[test]
    fn deserializes_with_defaults() {
        let json = r#"{
            "energy_ev": 1300.0,
            "detector_distance_m": 0.121,
            "detector_pixel_size_m": 3e-5,
            "final_resolution_m": 5e-9
        }"#;
        let meta: ScanMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.output_frame_width, DEFAULT_OUTPUT_FRAME_WIDTH);
        assert!(!meta.double_exposure);
        meta.validate().unwrap();
    }
}
