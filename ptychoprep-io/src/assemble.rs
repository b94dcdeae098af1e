//! Index-scatter assembly of gathered frame records.

use crate::Result;
use ndarray::s;
use ptychoprep_core::{Error, FrameRecord, OutputStack};

/// Scatters gathered records into an acquisition-ordered output stack.
///
/// Records may arrive in any order and from any rank; each one lands at its
/// own `index`. The scatter enforces exact coverage: every slot filled once,
/// no duplicates, no stragglers.
///
/// # Errors
/// Returns [`Error::Partition`] when coverage is violated or a record's
/// frame shape disagrees with `output_width`.
pub fn assemble(
    records: Vec<FrameRecord>,
    n_items: usize,
    output_width: usize,
) -> Result<OutputStack> {
    let mut stack = OutputStack::zeros((n_items, output_width, output_width));
    let mut seen = vec![false; n_items];
    for record in records {
        if record.index >= n_items {
            return Err(Error::Partition(format!(
                "record index {} outside run of {n_items} items",
                record.index
            ))
            .into());
        }
        if seen[record.index] {
            return Err(Error::Partition(format!(
                "duplicate record for index {}",
                record.index
            ))
            .into());
        }
        if record.frame.dim() != (output_width, output_width) {
            return Err(Error::Partition(format!(
                "record {} has shape {:?}, expected ({output_width}, {output_width})",
                record.index,
                record.frame.dim()
            ))
            .into());
        }
        stack
            .slice_mut(s![record.index, .., ..])
            .assign(&record.frame);
        seen[record.index] = true;
    }
    if let Some(missing) = seen.iter().position(|&filled| !filled) {
        return Err(Error::Partition(format!(
            "no record produced for index {missing}"
        ))
        .into());
    }
    Ok(stack)
}
