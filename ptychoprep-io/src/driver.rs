//! Distributed pipeline drivers: stack and batch execution strategies.
//!
//! Both strategies share one per-item numeric path and one index-scatter
//! assembly; they differ only in how items are handed to ranks and how often
//! results are gathered. Stack mode gathers collectively after every loop
//! chunk, bounding peak resident frames. Batch mode lets each rank
//! accumulate its results locally and gathers once at the end.
//!
//! Equal inputs produce bit-identical stacks under either strategy.

use crate::assemble::assemble;
use crate::config::PipelineConfig;
use crate::progress::{Progress, ProgressSink};
use crate::source::FrameSource;
use crate::{Error, Result};
use ndarray::{s, Array3};
use ptychoprep_algorithms::{
    calibrate, center_frame_index, BackgroundAverage, DetectorCorrection, Exposure, Resampler,
};
use ptychoprep_core::{
    Calibration, ChunkPlan, Error as CoreError, FrameRecord, OutputStack, Role, ScanMetadata,
};
use rayon::prelude::*;

/// Shared read-only state for one run: the broadcast calibration products
/// plus the execution configuration.
pub struct PipelineContext<'a> {
    /// Validated scan metadata.
    pub metadata: &'a ScanMetadata,
    /// Resolved run calibration, centroid shift included.
    pub calibration: &'a Calibration,
    /// Averaged dark backgrounds.
    pub background: &'a BackgroundAverage,
    /// Detector-specific correction.
    pub correction: &'a dyn DetectorCorrection,
    /// Execution configuration.
    pub config: &'a PipelineConfig,
    resampler: Resampler,
}

impl<'a> PipelineContext<'a> {
    /// Builds the run context, constructing the resampler once from the
    /// calibration.
    #[must_use]
    pub fn new(
        metadata: &'a ScanMetadata,
        calibration: &'a Calibration,
        background: &'a BackgroundAverage,
        correction: &'a dyn DetectorCorrection,
        config: &'a PipelineConfig,
    ) -> Self {
        let resampler = Resampler::from_calibration(calibration);
        Self {
            metadata,
            calibration,
            background,
            correction,
            config,
            resampler,
        }
    }

    /// Processes one item (frame or exposure pair) into its tagged record.
    fn process_item(&self, source: &dyn FrameSource, item: usize) -> Result<FrameRecord> {
        let fpi = self.metadata.frames_per_item();
        let first = source.frame(item * fpi)?;
        let frame = if self.metadata.double_exposure {
            let second = source.frame(item * fpi + 1)?;
            let exposure = Exposure::Double {
                first: first.view(),
                second: second.view(),
            };
            ptychoprep_algorithms::prepare_item(
                &exposure,
                self.background,
                self.correction,
                self.calibration,
                &self.resampler,
            )?
        } else {
            let exposure = Exposure::Single(first.view());
            ptychoprep_algorithms::prepare_item(
                &exposure,
                self.background,
                self.correction,
                self.calibration,
                &self.resampler,
            )?
        };
        Ok(FrameRecord::new(frame, item))
    }

    /// Processes a contiguous item range on one rank, tagging failures with
    /// the rank for the gather.
    fn process_range(
        &self,
        source: &dyn FrameSource,
        rank: usize,
        start: usize,
        stop: usize,
        out: &mut Vec<FrameRecord>,
    ) -> Result<()> {
        for item in start..stop {
            let record = self.process_item(source, item).map_err(|e| {
                Error::Core(CoreError::Gather {
                    rank,
                    reason: e.to_string(),
                })
            })?;
            out.push(record);
        }
        Ok(())
    }

    fn resident_bytes_per_item(&self, source: &dyn FrameSource) -> usize {
        let (rows, cols) = source.frame_shape();
        self.metadata.frames_per_item() * rows * cols * std::mem::size_of::<f64>()
    }
}

/// One execution strategy for a preprocessing run.
pub trait PipelineDriver {
    /// Strategy name, for diagnostics.
    fn name(&self) -> &'static str;

    /// Runs the whole pipeline over `source`, returning the assembled
    /// acquisition-ordered stack.
    ///
    /// # Errors
    /// Returns a configuration error before any frame is touched when the
    /// source layout is invalid, and a gather error when any rank fails.
    fn run(
        &self,
        ctx: &PipelineContext<'_>,
        source: &dyn FrameSource,
        progress: &dyn ProgressSink,
    ) -> Result<OutputStack>;
}

fn validated_item_count(ctx: &PipelineContext<'_>, source: &dyn FrameSource) -> Result<usize> {
    ctx.config.validate()?;
    ctx.metadata.validate_frame_count(source.len())?;
    Ok(ctx.metadata.item_count(source.len()))
}

/// Chunk-synchronized strategy for frame stacks.
///
/// The run is divided into loop chunks sized so that no rank ever holds more
/// than its per-rank item bound; within each chunk every rank processes one
/// contiguous slice, and a collective gather closes the chunk before the
/// next begins. Any rank failure aborts the gather and the run.
#[derive(Debug, Clone, Copy, Default)]
pub struct StackDriver;

impl PipelineDriver for StackDriver {
    fn name(&self) -> &'static str {
        "stack"
    }

    fn run(
        &self,
        ctx: &PipelineContext<'_>,
        source: &dyn FrameSource,
        progress: &dyn ProgressSink,
    ) -> Result<OutputStack> {
        let n_items = validated_item_count(ctx, source)?;
        let max_per_rank = ctx
            .config
            .resolve_max_items_per_rank(ctx.resident_bytes_per_item(source))?;
        let plan = ChunkPlan::new(n_items, ctx.config.ranks, max_per_rank)?;

        let mut records = Vec::with_capacity(n_items);
        for chunk in 0..plan.n_chunks() {
            let gathered: Vec<Vec<FrameRecord>> = (0..plan.ranks())
                .into_par_iter()
                .map(|rank| {
                    let (start, stop) = plan.rank_slice(chunk, rank)?;
                    let mut local = Vec::with_capacity(stop - start);
                    ctx.process_range(source, rank, start, stop, &mut local)?;
                    Ok(local)
                })
                .collect::<Result<_>>()?;
            for rank_records in gathered {
                records.extend(rank_records);
            }
            progress.report(
                Role::Coordinator,
                Progress {
                    items_done: plan.chunk_range(chunk).1,
                    n_items,
                    step: chunk + 1,
                    n_steps: plan.n_chunks(),
                },
            );
        }
        assemble(records, n_items, ctx.calibration.output_frame_width)
    }
}

/// Locally-accumulating strategy for batched acquisition.
///
/// Items are dealt out in rounds of `ranks * local_batch_size`; in round
/// `r`, rank `k` takes the `k`-th batch of the round's span. Ranks keep
/// their results until the single gather at the end, so there is no
/// per-round synchronization point.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchDriver;

impl PipelineDriver for BatchDriver {
    fn name(&self) -> &'static str {
        "batch"
    }

    fn run(
        &self,
        ctx: &PipelineContext<'_>,
        source: &dyn FrameSource,
        progress: &dyn ProgressSink,
    ) -> Result<OutputStack> {
        let n_items = validated_item_count(ctx, source)?;
        let ranks = ctx.config.ranks;
        let batch = ctx.config.local_batch_size;
        let round_span = ranks * batch;
        let n_rounds = n_items.div_ceil(round_span);

        let gathered: Vec<Vec<FrameRecord>> = (0..ranks)
            .into_par_iter()
            .map(|rank| {
                let role = Role::of_rank(rank);
                let mut local = Vec::new();
                for round in 0..n_rounds {
                    let span_start = round * round_span;
                    let span_end = ((round + 1) * round_span).min(n_items);
                    let start = (span_start + rank * batch).min(span_end);
                    let stop = (span_start + (rank + 1) * batch).min(span_end);
                    ctx.process_range(source, rank, start, stop, &mut local)?;
                    if role.is_coordinator() {
                        progress.report(
                            role,
                            Progress {
                                items_done: span_end,
                                n_items,
                                step: round + 1,
                                n_steps: n_rounds,
                            },
                        );
                    }
                }
                Ok(local)
            })
            .collect::<Result<_>>()?;

        let mut records = Vec::with_capacity(n_items);
        for rank_records in gathered {
            records.extend(rank_records);
        }
        assemble(records, n_items, ctx.calibration.output_frame_width)
    }
}

/// Runs the calibration step against a frame source.
///
/// Validates the metadata and frame count, averages the darks, and derives
/// the full calibration (geometry plus centroid shift) from the scan's
/// representative center item. Layout errors surface here, before any
/// per-frame work starts.
///
/// # Errors
/// Returns configuration errors for invalid metadata or layout, and a
/// degenerate-centroid error when the representative frame is empty.
pub fn calibrate_source(
    metadata: &ScanMetadata,
    source: &dyn FrameSource,
    darks: &dyn FrameSource,
    correction: &dyn DetectorCorrection,
) -> Result<(Calibration, BackgroundAverage)> {
    metadata.validate()?;
    metadata.validate_frame_count(source.len())?;
    if source.is_empty() {
        return Err(Error::InvalidFormat("scan holds no frames".to_string()));
    }

    let fpi = metadata.frames_per_item();
    let center = center_frame_index(source.len());
    let (rows, cols) = source.frame_shape();
    let mut center_frames = Array3::<f64>::zeros((fpi, rows, cols));
    for slot in 0..fpi {
        center_frames
            .slice_mut(s![slot, .., ..])
            .assign(&source.frame(center + slot)?);
    }
    let dark_stack = darks.read_stack()?;

    Ok(calibrate(
        metadata,
        center_frames.view(),
        center,
        dark_stack.view(),
        correction,
    )?)
}

/// Calibrates and runs one full preprocessing pass.
///
/// Convenience wrapper over [`calibrate_source`] and the chosen driver.
/// Returns the calibration alongside the stack so callers can persist both.
///
/// # Errors
/// Propagates calibration and driver failures.
pub fn run_pipeline(
    driver: &dyn PipelineDriver,
    metadata: &ScanMetadata,
    source: &dyn FrameSource,
    darks: &dyn FrameSource,
    correction: &dyn DetectorCorrection,
    config: &PipelineConfig,
    progress: &dyn ProgressSink,
) -> Result<(Calibration, OutputStack)> {
    let (calibration, background) = calibrate_source(metadata, source, darks, correction)?;
    let ctx = PipelineContext::new(metadata, &calibration, &background, correction, config);
    let stack = driver.run(&ctx, source, progress)?;
    Ok((calibration, stack))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use crate::source::StackSource;
    use approx::assert_relative_eq;
    use ptychoprep_algorithms::IdentityCorrection;

    fn metadata(width: usize) -> ScanMetadata {
        ScanMetadata {
            energy_ev: 1300.0,
            detector_distance_m: 0.121,
            detector_pixel_size_m: 30e-6,
            final_resolution_m: None,
            desired_padded_width: Some(width as f64),
            output_frame_width: width,
            double_exposure: false,
            dwell1: None,
            dwell2: None,
            translations_um: None,
        }
    }

    fn peaked_scan(n: usize, width: usize) -> StackSource {
        // Every frame peaks at the center so calibration needs no shift,
        // with a per-frame amplitude to tell frames apart.
        let mut frames = Array3::<f64>::zeros((n, width, width));
        for i in 0..n {
            frames[[i, width / 2, width / 2]] = 10.0 + i as f64;
        }
        StackSource::new(frames)
    }

    fn darks(width: usize) -> StackSource {
        StackSource::new(Array3::<f64>::zeros((2, width, width)))
    }

    #[test]
    fn stack_driver_preserves_acquisition_order() {
        let width = 8;
        let meta = metadata(width);
        let source = peaked_scan(6, width);
        let config = PipelineConfig::default().with_ranks(3);
        let (_, stack) = run_pipeline(
            &StackDriver,
            &meta,
            &source,
            &darks(width),
            &IdentityCorrection,
            &config,
            &NoProgress,
        )
        .unwrap();
        assert_eq!(stack.dim(), (6, width, width));
        for i in 0..6 {
            assert_relative_eq!(f64::from(stack[[i, 4, 4]]), 10.0 + i as f64);
        }
    }

    #[test]
    fn bounded_stack_run_matches_unbounded() {
        let width = 8;
        let meta = metadata(width);
        let source = peaked_scan(7, width);
        let dark = darks(width);
        let unbounded = PipelineConfig::default().with_ranks(2);
        let bounded = PipelineConfig::default().with_ranks(2).with_max_items_per_rank(2);

        let (_, a) = run_pipeline(
            &StackDriver,
            &meta,
            &source,
            &dark,
            &IdentityCorrection,
            &unbounded,
            &NoProgress,
        )
        .unwrap();
        let (_, b) = run_pipeline(
            &StackDriver,
            &meta,
            &source,
            &dark,
            &IdentityCorrection,
            &bounded,
            &NoProgress,
        )
        .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn batch_rounds_deal_items_without_overlap() {
        let width = 8;
        let meta = metadata(width);
        // 11 items, 3 ranks, batch 2: two rounds, remainder in the second.
        let source = peaked_scan(11, width);
        let config = PipelineConfig::default()
            .with_ranks(3)
            .with_local_batch_size(2);
        let (_, stack) = run_pipeline(
            &BatchDriver,
            &meta,
            &source,
            &darks(width),
            &IdentityCorrection,
            &config,
            &NoProgress,
        )
        .unwrap();
        assert_eq!(stack.dim(), (11, width, width));
        for i in 0..11 {
            assert_relative_eq!(f64::from(stack[[i, 4, 4]]), 10.0 + i as f64);
        }
    }

    #[test]
    fn degenerate_center_frame_reports_its_raw_index() {
        let width = 8;
        // Six frames: the representative center frame (raw index 2) is the
        // only empty one.
        let mut frames = Array3::<f64>::zeros((6, width, width));
        for i in 0..6 {
            if i != 2 {
                frames[[i, width / 2, width / 2]] = 50.0;
            }
        }
        let err = calibrate_source(
            &metadata(width),
            &StackSource::new(frames),
            &darks(width),
            &IdentityCorrection,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::Core(CoreError::DegenerateCentroid { frame_index: 2 })
        ));
    }

    #[test]
    fn batch_progress_comes_from_the_coordinator_only() {
        use crate::progress::{Progress, ProgressSink};
        use std::sync::Mutex;

        #[derive(Default)]
        struct RoleTally(Mutex<Vec<Role>>);

        impl ProgressSink for RoleTally {
            fn report(&self, role: Role, _progress: Progress) {
                self.0.lock().unwrap().push(role);
            }
        }

        let width = 8;
        let meta = metadata(width);
        // 11 items, 3 ranks, batch 2: two rounds.
        let source = peaked_scan(11, width);
        let config = PipelineConfig::default()
            .with_ranks(3)
            .with_local_batch_size(2);
        let sink = RoleTally::default();
        run_pipeline(
            &BatchDriver,
            &meta,
            &source,
            &darks(width),
            &IdentityCorrection,
            &config,
            &sink,
        )
        .unwrap();

        let roles = sink.0.lock().unwrap();
        assert_eq!(roles.len(), 2);
        assert!(roles.iter().all(|role| role.is_coordinator()));
    }

    #[test]
    fn empty_scan_is_rejected_before_processing() {
        let width = 8;
        let source = StackSource::new(Array3::<f64>::zeros((0, width, width)));
        let err = calibrate_source(
            &metadata(width),
            &source,
            &darks(width),
            &IdentityCorrection,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(_)));
    }

    #[test]
    fn more_ranks_than_items_still_covers_the_run() {
        let width = 8;
        let meta = metadata(width);
        let source = peaked_scan(2, width);
        let config = PipelineConfig::default().with_ranks(5);
        let (_, stack) = run_pipeline(
            &StackDriver,
            &meta,
            &source,
            &darks(width),
            &IdentityCorrection,
            &config,
            &NoProgress,
        )
        .unwrap();
        assert_eq!(stack.dim(), (2, width, width));
    }
}
