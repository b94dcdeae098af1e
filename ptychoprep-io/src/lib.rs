//! ptychoprep-io: Frame sources, sinks, and the distributed pipeline
//! drivers.
//!
//! This crate turns the per-frame numerics into whole-run execution:
//! - **sources/sinks** - in-memory and memory-mapped frame suppliers, raw
//!   binary output with a JSON sidecar
//! - **drivers** - the stack (chunk-synchronized) and batch (locally
//!   accumulating) execution strategies
//! - **assembly** - index-scatter reassembly into acquisition order
//! - **config** - rank counts, batch sizes, and memory-budget sizing
//!
#![warn(missing_docs)]

pub mod assemble;
pub mod config;
pub mod driver;
mod error;
pub mod progress;
pub mod sink;
pub mod source;

pub use assemble::assemble;
pub use config::PipelineConfig;
pub use driver::{
    calibrate_source, run_pipeline, BatchDriver, PipelineContext, PipelineDriver, StackDriver,
};
pub use error::{Error, Result};
pub use progress::{NoProgress, Progress, ProgressSink};
pub use sink::{BinaryFrameSink, FrameSink};
pub use source::{FrameSource, MappedFrameFile, StackSource};
