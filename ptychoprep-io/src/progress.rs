//! Progress reporting hooks.

use ptychoprep_core::Role;

/// One progress observation during a run.
///
/// Purely observational: drivers never change behavior based on what a sink
/// does with these.
#[derive(Debug, Clone, Copy)]
pub struct Progress {
    /// Items finished so far (monotonic within a run).
    pub items_done: usize,
    /// Total items in the run.
    pub n_items: usize,
    /// Finished chunk or round, 1-based.
    pub step: usize,
    /// Total chunks or rounds.
    pub n_steps: usize,
}

/// Receiver for progress observations.
///
/// Called from inside the worker fan-out, so implementations must be
/// [`Sync`] and take `&self`. Only the coordinator reports.
pub trait ProgressSink: Sync {
    /// Records one observation.
    fn report(&self, role: Role, progress: Progress);
}

/// Discards all progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _role: Role, _progress: Progress) {}
}
