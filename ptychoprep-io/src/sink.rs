//! Frame sinks: where assembled results go.

use crate::Result;
use ptychoprep_core::{Calibration, OutputStack, ScanMetadata};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Consumer for one assembled run: the output stack plus the calibration it
/// was produced under.
pub trait FrameSink {
    /// Writes the assembled stack and its provenance.
    ///
    /// # Errors
    /// Returns an error if the destination cannot be written.
    fn write(
        &mut self,
        metadata: &ScanMetadata,
        calibration: &Calibration,
        frames: &OutputStack,
    ) -> Result<()>;
}

/// Sidecar record describing one written frame file.
#[derive(Debug, Serialize)]
struct Sidecar<'a> {
    metadata: &'a ScanMetadata,
    calibration: &'a Calibration,
    shape: [usize; 3],
    translations_m: Option<Vec<[f64; 3]>>,
}

/// Writes the stack as flat little-endian `f32` samples with a JSON sidecar.
///
/// The data file holds the frames back to back, row-major, no header; the
/// sidecar at `<path>.json` carries the scan metadata, the resolved
/// calibration, the stack shape, and the converted scan positions. The data
/// file is readable back through
/// [`MappedFrameFile`](crate::source::MappedFrameFile).
#[derive(Debug)]
pub struct BinaryFrameSink {
    path: PathBuf,
}

impl BinaryFrameSink {
    /// Creates a sink targeting `path` (sidecar at `<path>.json`).
    #[must_use]
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Destination path of the data file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sidecar_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".json");
        PathBuf::from(name)
    }
}

impl FrameSink for BinaryFrameSink {
    fn write(
        &mut self,
        metadata: &ScanMetadata,
        calibration: &Calibration,
        frames: &OutputStack,
    ) -> Result<()> {
        let mut writer = BufWriter::new(File::create(&self.path)?);
        for &sample in frames {
            writer.write_all(&sample.to_le_bytes())?;
        }
        writer.flush()?;

        let (n, rows, cols) = frames.dim();
        let sidecar = Sidecar {
            metadata,
            calibration,
            shape: [n, rows, cols],
            translations_m: metadata
                .translations_um
                .as_deref()
                .map(ptychoprep_core::convert_translations),
        };
        let file = BufWriter::new(File::create(self.sidecar_path())?);
        serde_json::to_writer_pretty(file, &sidecar)?;
        Ok(())
    }
}
