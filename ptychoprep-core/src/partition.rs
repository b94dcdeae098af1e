//! Load-balanced partitioning of the frame count across worker ranks.
//!
//! Two independent splits: [`rank_slices`] divides one chunk across ranks,
//! [`loop_chunks`] divides the whole run into bounded-size chunks so peak
//! simultaneous memory stays proportional to `ranks * max_per_rank`.
//!
//! All arithmetic here operates on *item* counts: frames, or exposure pairs
//! under double exposure. Callers convert so that pairs are never split
//! across a boundary.

use crate::error::{Error, Result};

/// Splits `n_items` into `ranks` contiguous, order-preserving ranges.
///
/// The first `ranks - overshoot` ranges get `ceil(n/ranks)` items and the
/// trailing ranges one fewer, where `overshoot = ceil(n/ranks)*ranks - n`.
/// Shorter ranges deliberately land last; preserve this tie-break.
///
/// # Errors
/// Returns [`Error::Config`] for a zero rank count and [`Error::Partition`]
/// if the produced ranges fail to cover `[0, n)` exactly.
pub fn rank_slices(n_items: usize, ranks: usize) -> Result<Vec<(usize, usize)>> {
    if ranks == 0 {
        return Err(Error::Config("rank count must be positive".to_string()));
    }
    let chunk = n_items.div_ceil(ranks);
    let overshoot = chunk * ranks - n_items;
    let full = ranks - overshoot;

    let mut slices = Vec::with_capacity(ranks);
    let mut start = 0usize;
    for rank in 0..ranks {
        let size = if rank < full { chunk } else { chunk - 1 };
        slices.push((start, start + size));
        start += size;
    }
    if start != n_items {
        return Err(Error::Partition(format!(
            "rank slices cover {start} of {n_items} items"
        )));
    }
    Ok(slices)
}

/// Divides `n_items` into successive loop-chunk boundaries such that no
/// chunk exceeds `ranks * max_per_rank` items.
///
/// An unbounded `max_per_rank` yields the single chunk `[0, n]`. Otherwise
/// the minimal number of chunks is used: leading chunks take the full
/// `ranks * max_per_rank` capacity and only the trailing chunks shrink to
/// absorb the remainder, with the last boundary landing exactly on `n`.
///
/// # Errors
/// Returns [`Error::Config`] for zero ranks or a zero bound, and
/// [`Error::Partition`] if the boundary arithmetic breaks its invariant.
pub fn loop_chunks(
    n_items: usize,
    ranks: usize,
    max_per_rank: Option<usize>,
) -> Result<Vec<usize>> {
    if ranks == 0 {
        return Err(Error::Config("rank count must be positive".to_string()));
    }
    let Some(max_per_rank) = max_per_rank else {
        return Ok(vec![0, n_items]);
    };
    if max_per_rank == 0 {
        return Err(Error::Config(
            "max items per rank must be positive".to_string(),
        ));
    }
    if n_items == 0 {
        return Ok(vec![0, 0]);
    }

    let capacity = ranks * max_per_rank;
    let n_chunks = n_items.div_ceil(capacity);
    // How far the full-capacity layout overshoots the item count.
    let overshoot = n_chunks * capacity - n_items;

    let (full_chunks, reduced_chunks, reduced_step) = if overshoot == 0 {
        (n_chunks, 0, 0)
    } else {
        let shrink = overshoot.div_ceil(ranks * n_chunks);
        let reduced = (overshoot / ranks) / shrink;
        let step = max_per_rank.checked_sub(shrink).ok_or_else(|| {
            Error::Partition(format!(
                "chunk shrink {shrink} exceeds per-rank bound {max_per_rank}"
            ))
        })?;
        (n_chunks - reduced, reduced, ranks * step)
    };

    let mut boundaries = Vec::with_capacity(n_chunks + 1);
    for i in 0..full_chunks {
        boundaries.push(i * capacity);
    }
    let base = full_chunks * capacity;
    for j in 0..reduced_chunks {
        boundaries.push(base + j * reduced_step);
    }
    boundaries.push(n_items);

    validate_boundaries(&boundaries, n_items, Some(capacity))?;
    Ok(boundaries)
}

fn validate_boundaries(
    boundaries: &[usize],
    n_items: usize,
    capacity: Option<usize>,
) -> Result<()> {
    if boundaries.first() != Some(&0) || boundaries.last() != Some(&n_items) {
        return Err(Error::Partition(format!(
            "boundaries must span [0, {n_items}], got {boundaries:?}"
        )));
    }
    for pair in boundaries.windows(2) {
        if pair[1] < pair[0] {
            return Err(Error::Partition(format!(
                "boundaries must be non-decreasing, got {boundaries:?}"
            )));
        }
        if let Some(capacity) = capacity {
            if pair[1] - pair[0] > capacity {
                return Err(Error::Partition(format!(
                    "chunk [{}, {}) exceeds capacity {capacity}",
                    pair[0], pair[1]
                )));
            }
        }
    }
    Ok(())
}

/// The full partition of a run: loop-chunk boundaries plus per-chunk rank
/// slices.
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    boundaries: Vec<usize>,
    ranks: usize,
    n_items: usize,
}

impl ChunkPlan {
    /// Plans `n_items` across `ranks` workers under the given per-rank
    /// memory bound.
    ///
    /// # Errors
    /// Propagates [`Error::Config`] and [`Error::Partition`] from the
    /// underlying splits.
    pub fn new(n_items: usize, ranks: usize, max_per_rank: Option<usize>) -> Result<Self> {
        let boundaries = loop_chunks(n_items, ranks, max_per_rank)?;
        Ok(Self {
            boundaries,
            ranks,
            n_items,
        })
    }

    /// Number of loop chunks.
    #[must_use]
    pub fn n_chunks(&self) -> usize {
        self.boundaries.len() - 1
    }

    /// Total item count covered by the plan.
    #[must_use]
    pub fn n_items(&self) -> usize {
        self.n_items
    }

    /// Worker rank count.
    #[must_use]
    pub fn ranks(&self) -> usize {
        self.ranks
    }

    /// Loop-chunk boundaries, `n_chunks + 1` entries.
    #[must_use]
    pub fn boundaries(&self) -> &[usize] {
        &self.boundaries
    }

    /// Global `(start, stop)` item range of loop chunk `chunk`.
    #[must_use]
    pub fn chunk_range(&self, chunk: usize) -> (usize, usize) {
        (self.boundaries[chunk], self.boundaries[chunk + 1])
    }

    /// Global `(start, stop)` item range handled by `rank` inside `chunk`.
    ///
    /// # Errors
    /// Propagates partition failures from the rank split.
    pub fn rank_slice(&self, chunk: usize, rank: usize) -> Result<(usize, usize)> {
        let (start, stop) = self.chunk_range(chunk);
        let local = rank_slices(stop - start, self.ranks)?;
        let (lo, hi) = local[rank];
        Ok((start + lo, start + hi))
    }
}
