//!
//! Command-line front end for the ptychography preprocessing pipeline.
#![allow(
    clippy::uninlined_format_args,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::too_many_lines
)]

use clap::{Parser, Subcommand, ValueEnum};

use ptychoprep_algorithms::IdentityCorrection;
use ptychoprep_core::{Role, ScanMetadata};
use ptychoprep_io::{
    run_pipeline, BatchDriver, BinaryFrameSink, FrameSink, FrameSource, MappedFrameFile,
    PipelineConfig, PipelineDriver, Progress, ProgressSink, StackDriver,
};
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error: {0}")]
    PtychoprepIo(#[from] ptychoprep_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] ptychoprep_core::Error),

    #[error("Metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
}

/// Pipeline execution strategy selection.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Chunk-synchronized processing with bounded resident frames
    Stack,
    /// Locally accumulating rounds with a single final gather
    Batch,
}

/// Ptychography frame-stack preprocessor.
#[derive(Parser)]
#[command(name = "ptychoprep")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Preprocess a raw frame file into a centered, resampled stack
    Process {
        /// Raw scan frame file (flat little-endian f32)
        input: PathBuf,

        /// Dark frame file, same layout as the scan
        #[arg(short, long)]
        darks: PathBuf,

        /// Scan metadata JSON file
        #[arg(short, long)]
        metadata: PathBuf,

        /// Output file path (sidecar written to <output>.json)
        #[arg(short, long)]
        output: PathBuf,

        /// Raw frame rows
        #[arg(long)]
        rows: usize,

        /// Raw frame columns
        #[arg(long)]
        cols: usize,

        /// Execution strategy
        #[arg(long, value_enum, default_value = "stack")]
        mode: Mode,

        /// Number of cooperating worker ranks
        #[arg(short, long, default_value = "1")]
        ranks: usize,

        /// Per-rank item bound for stack mode (default: from memory budget)
        #[arg(long)]
        max_items_per_rank: Option<usize>,

        /// Per-rank batch size for batch mode
        #[arg(long, default_value = "10")]
        local_batch_size: usize,

        /// Fraction of available memory to target for chunk sizing
        #[arg(long)]
        memory_fraction: Option<f64>,

        /// Explicit memory budget in bytes (overrides the fraction)
        #[arg(long)]
        memory_budget_bytes: Option<usize>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show information about a raw frame file
    Info {
        /// Raw frame file (flat little-endian f32)
        input: PathBuf,

        /// Raw frame rows
        #[arg(long)]
        rows: usize,

        /// Raw frame columns
        #[arg(long)]
        cols: usize,
    },
}

/// Coordinator-only status line on stderr.
struct ConsoleProgress;

impl ProgressSink for ConsoleProgress {
    fn report(&self, role: Role, progress: Progress) {
        if !role.is_coordinator() {
            return;
        }
        eprint!(
            "\r  step {}/{}: {}/{} items",
            progress.step, progress.n_steps, progress.items_done, progress.n_items
        );
        if progress.step == progress.n_steps {
            eprintln!();
        }
        let _ = std::io::stderr().flush();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Process {
            input,
            darks,
            metadata,
            output,
            rows,
            cols,
            mode,
            ranks,
            max_items_per_rank,
            local_batch_size,
            memory_fraction,
            memory_budget_bytes,
            verbose,
        } => {
            let meta: ScanMetadata = serde_json::from_reader(File::open(&metadata)?)?;
            meta.validate()?;

            let source = MappedFrameFile::open(&input, rows, cols)?;
            let dark_source = MappedFrameFile::open(&darks, rows, cols)?;

            if verbose {
                eprintln!("Input: {} ({} frames)", input.display(), source.len());
                eprintln!("Darks: {} ({} frames)", darks.display(), dark_source.len());
                eprintln!("Mode: {:?}, ranks: {}", mode, ranks);
            }

            let mut config = PipelineConfig::default()
                .with_ranks(ranks)
                .with_local_batch_size(local_batch_size);
            if let Some(max) = max_items_per_rank {
                config = config.with_max_items_per_rank(max);
            }
            if let Some(fraction) = memory_fraction {
                config = config.with_memory_fraction(fraction);
            }
            if let Some(bytes) = memory_budget_bytes {
                config = config.with_memory_budget_bytes(bytes);
            }
            config.validate()?;

            let driver: &dyn PipelineDriver = match mode {
                Mode::Stack => &StackDriver,
                Mode::Batch => &BatchDriver,
            };

            let start = Instant::now();
            let (calibration, stack) = run_pipeline(
                driver,
                &meta,
                &source,
                &dark_source,
                &IdentityCorrection,
                &config,
                &ConsoleProgress,
            )?;

            let mut sink = BinaryFrameSink::new(&output);
            sink.write(&meta, &calibration, &stack)?;

            let elapsed = start.elapsed();
            let (n, out_rows, out_cols) = stack.dim();
            println!(
                "Processed {} frames into {}x{}x{} in {:.2}s",
                source.len(),
                n,
                out_rows,
                out_cols,
                elapsed.as_secs_f64()
            );
            println!("Output: {}", output.display());
            if verbose {
                eprintln!(
                    "Calibration: padded width {:.1}, kernel {}, shift [{:.0}, {:.0}]",
                    calibration.padded_frame_width,
                    calibration.kernel_width,
                    calibration.centroid_shift[0],
                    calibration.centroid_shift[1]
                );
            }
        }

        Commands::Info { input, rows, cols } => {
            let source = MappedFrameFile::open(&input, rows, cols)?;
            let file_size = std::fs::metadata(&input)?.len();

            println!("File: {}", input.display());
            println!(
                "Size: {} bytes ({:.2} MB)",
                file_size,
                file_size as f64 / 1_000_000.0
            );
            println!("Frame shape: {}x{}", rows, cols);
            println!("Frames: {}", source.len());

            if !source.is_empty() {
                let first = source.frame(0)?;
                let last = source.frame(source.len() - 1)?;
                let range = |frame: &ptychoprep_core::RawFrame| {
                    frame.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |acc, &v| {
                        (acc.0.min(v), acc.1.max(v))
                    })
                };
                let (min_first, max_first) = range(&first);
                let (min_last, max_last) = range(&last);
                println!("First frame range: {} - {}", min_first, max_first);
                println!("Last frame range: {} - {}", min_last, max_last);
            }
        }
    }

    Ok(())
}
