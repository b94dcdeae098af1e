//! Frame sources: where raw detector frames come from.

use crate::{Error, Result};
use memmap2::Mmap;
use ndarray::{s, Array2, Array3};
use ptychoprep_core::RawFrame;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Random-access supplier of raw detector frames in acquisition order.
///
/// Sources are shared read-only across worker ranks, so implementations must
/// be [`Sync`]. Frames are returned as owned arrays; a source never hands out
/// references into its backing storage.
pub trait FrameSource: Sync {
    /// Total raw frame count.
    fn len(&self) -> usize;

    /// Returns true when the source holds no frames.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spatial shape `(rows, cols)` of every frame.
    fn frame_shape(&self) -> (usize, usize);

    /// Reads the raw frame at `index`.
    ///
    /// # Errors
    /// Returns [`ptychoprep_core::Error::FrameOutOfRange`] for an index past
    /// the end, or an I/O error from the backing storage.
    fn frame(&self, index: usize) -> Result<RawFrame>;

    /// Reads every frame into one stack, `(len, rows, cols)`.
    ///
    /// Intended for small auxiliary stacks such as dark frames; the main
    /// scan should be consumed frame by frame.
    ///
    /// # Errors
    /// Propagates per-frame read failures.
    fn read_stack(&self) -> Result<Array3<f64>> {
        let (rows, cols) = self.frame_shape();
        let mut stack = Array3::<f64>::zeros((self.len(), rows, cols));
        for i in 0..self.len() {
            stack.slice_mut(s![i, .., ..]).assign(&self.frame(i)?);
        }
        Ok(stack)
    }
}

/// An in-memory frame stack, already resident as one contiguous array.
#[derive(Debug, Clone)]
pub struct StackSource {
    frames: Array3<f64>,
}

impl StackSource {
    /// Wraps a resident `(n, rows, cols)` stack.
    #[must_use]
    pub fn new(frames: Array3<f64>) -> Self {
        Self { frames }
    }
}

impl FrameSource for StackSource {
    fn len(&self) -> usize {
        self.frames.dim().0
    }

    fn frame_shape(&self) -> (usize, usize) {
        let (_, rows, cols) = self.frames.dim();
        (rows, cols)
    }

    fn frame(&self, index: usize) -> Result<RawFrame> {
        if index >= self.len() {
            return Err(ptychoprep_core::Error::FrameOutOfRange {
                index,
                len: self.len(),
            }
            .into());
        }
        Ok(self.frames.slice(s![index, .., ..]).to_owned())
    }
}

/// A memory-mapped flat frame file.
///
/// The on-disk layout is raw little-endian `f32` samples, row-major, one
/// frame after another with no header. The frame shape comes from the scan
/// metadata; the frame count is derived from the file length.
pub struct MappedFrameFile {
    mmap: Mmap,
    path: PathBuf,
    rows: usize,
    cols: usize,
    n_frames: usize,
}

impl MappedFrameFile {
    /// Opens and maps a flat frame file with the given frame shape.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or mapped, or if its
    /// length is not a whole number of `rows * cols` frames.
    pub fn open<P: AsRef<Path>>(path: P, rows: usize, cols: usize) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(Error::InvalidFormat(
                "frame shape must be non-empty".to_string(),
            ));
        }
        let file = File::open(&path)?;
        // SAFETY: The file is opened read-only and we assume it is not modified concurrently.
        // This is the standard safety contract for memory mapping.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };

        let frame_bytes = rows * cols * std::mem::size_of::<f32>();
        if mmap.len() % frame_bytes != 0 {
            return Err(Error::InvalidFormat(format!(
                "file length {} is not a multiple of the {frame_bytes}-byte frame size",
                mmap.len()
            )));
        }
        let n_frames = mmap.len() / frame_bytes;
        Ok(Self {
            mmap,
            path: path.as_ref().to_path_buf(),
            rows,
            cols,
            n_frames,
        })
    }

    /// Path of the mapped file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameSource for MappedFrameFile {
    fn len(&self) -> usize {
        self.n_frames
    }

    fn frame_shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    fn frame(&self, index: usize) -> Result<RawFrame> {
        if index >= self.n_frames {
            return Err(ptychoprep_core::Error::FrameOutOfRange {
                index,
                len: self.n_frames,
            }
            .into());
        }
        let frame_bytes = self.rows * self.cols * std::mem::size_of::<f32>();
        let start = index * frame_bytes;
        let bytes = &self.mmap[start..start + frame_bytes];

        let mut frame = Array2::<f64>::zeros((self.rows, self.cols));
        for (slot, chunk) in frame.iter_mut().zip(bytes.chunks_exact(4)) {
            let sample = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            *slot = f64::from(sample);
        }
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Write;

    #[test]
    fn stack_source_reads_frames_in_order() {
        let mut frames = Array3::<f64>::zeros((3, 2, 2));
        for i in 0..3 {
            frames.slice_mut(s![i, .., ..]).fill(i as f64);
        }
        let source = StackSource::new(frames);
        assert_eq!(source.len(), 3);
        assert_eq!(source.frame_shape(), (2, 2));
        assert_relative_eq!(source.frame(2).unwrap()[[0, 0]], 2.0);
        assert!(source.frame(3).is_err());
    }

    #[test]
    fn mapped_file_round_trips_samples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frames.raw");
        let samples: Vec<f32> = (0..8).map(|i| i as f32 * 0.5).collect();
        let mut file = File::create(&path).unwrap();
        for s in &samples {
            file.write_all(&s.to_le_bytes()).unwrap();
        }
        drop(file);

        let source = MappedFrameFile::open(&path, 2, 2).unwrap();
        assert_eq!(source.len(), 2);
        let second = source.frame(1).unwrap();
        assert_relative_eq!(second[[0, 0]], 2.0);
        assert_relative_eq!(second[[1, 1]], 3.5);
    }

    #[test]
    fn truncated_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.raw");
        std::fs::write(&path, [0u8; 10]).unwrap();
        assert!(MappedFrameFile::open(&path, 2, 2).is_err());
    }

    #[test]
    fn read_stack_collects_all_frames() {
        let mut frames = Array3::<f64>::zeros((2, 2, 2));
        frames.slice_mut(s![1, .., ..]).fill(7.0);
        let source = StackSource::new(frames);
        let stack = source.read_stack().unwrap();
        assert_eq!(stack.dim(), (2, 2, 2));
        assert_relative_eq!(stack[[1, 1, 1]], 7.0);
    }
}
