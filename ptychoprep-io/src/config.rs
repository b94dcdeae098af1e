//! Pipeline execution configuration and memory-budget sizing.

use crate::{Error, Result};
use sysinfo::System;

const MEMORY_OVERHEAD_FACTOR: f64 = 1.2;

/// Configuration for a distributed preprocessing run.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Number of cooperating worker ranks.
    pub ranks: usize,
    /// Explicit per-rank item bound for stack mode. `None` derives a bound
    /// from the memory budget when one is configured, otherwise unbounded.
    pub max_items_per_rank: Option<usize>,
    /// Per-rank, per-round item count for batch mode. Counted in items:
    /// under double exposure a short/long pair is one item, not two frames.
    pub local_batch_size: usize,
    /// Fraction of available system memory to target (0.0 < fraction <= 1.0).
    pub memory_fraction: Option<f64>,
    /// Explicit memory budget override (bytes). If set, `memory_fraction` is ignored.
    pub memory_budget_bytes: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ranks: 1,
            max_items_per_rank: None,
            local_batch_size: 10,
            memory_fraction: None,
            memory_budget_bytes: None,
        }
    }
}

impl PipelineConfig {
    /// Set the worker rank count.
    #[must_use]
    pub fn with_ranks(mut self, ranks: usize) -> Self {
        self.ranks = ranks;
        self
    }

    /// Set an explicit per-rank item bound for stack mode.
    #[must_use]
    pub fn with_max_items_per_rank(mut self, max: usize) -> Self {
        self.max_items_per_rank = Some(max);
        self
    }

    /// Set the per-rank batch size for batch mode.
    #[must_use]
    pub fn with_local_batch_size(mut self, size: usize) -> Self {
        self.local_batch_size = size;
        self
    }

    /// Set the fraction of available system memory to target.
    #[must_use]
    pub fn with_memory_fraction(mut self, fraction: f64) -> Self {
        self.memory_fraction = Some(fraction);
        self
    }

    /// Set an explicit memory budget in bytes.
    #[must_use]
    pub fn with_memory_budget_bytes(mut self, bytes: usize) -> Self {
        self.memory_budget_bytes = Some(bytes);
        self
    }

    /// Validates the configuration before a run.
    ///
    /// # Errors
    /// Returns an error for zero ranks, a zero batch size, or a zero
    /// explicit item bound.
    pub fn validate(&self) -> Result<()> {
        if self.ranks == 0 {
            return Err(Error::InvalidFormat(
                "ranks must be at least 1".to_string(),
            ));
        }
        if self.local_batch_size == 0 {
            return Err(Error::InvalidFormat(
                "local_batch_size must be at least 1".to_string(),
            ));
        }
        if self.max_items_per_rank == Some(0) {
            return Err(Error::InvalidFormat(
                "max_items_per_rank must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve the target memory budget in bytes.
    ///
    /// # Errors
    /// Returns an error if the memory fraction is invalid or system memory
    /// cannot be queried.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn resolve_budget_bytes(&self) -> Result<usize> {
        if let Some(bytes) = self.memory_budget_bytes {
            return Ok(bytes);
        }
        let fraction = self.memory_fraction.unwrap_or(0.5);
        if !(0.0 < fraction && fraction <= 1.0) {
            return Err(Error::InvalidFormat(
                "memory_fraction must be in (0.0, 1.0]".to_string(),
            ));
        }
        let mut system = System::new();
        system.refresh_memory();
        let available = system.available_memory();
        if available == 0 {
            return Err(Error::InvalidFormat(
                "available system memory reported as 0".to_string(),
            ));
        }
        Ok((available as f64 * fraction) as usize)
    }

    /// Resolve the per-rank item bound for stack-mode chunking.
    ///
    /// An explicit `max_items_per_rank` wins. Otherwise, when a memory
    /// budget or fraction is configured, the bound is derived from the
    /// per-item resident size; with neither set the run is unbounded.
    ///
    /// # Errors
    /// Propagates budget-resolution failures.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn resolve_max_items_per_rank(&self, bytes_per_item: usize) -> Result<Option<usize>> {
        if let Some(max) = self.max_items_per_rank {
            return Ok(Some(max));
        }
        if self.memory_budget_bytes.is_none() && self.memory_fraction.is_none() {
            return Ok(None);
        }
        let budget = self.resolve_budget_bytes()?;
        let per_item = (bytes_per_item as f64 * MEMORY_OVERHEAD_FACTOR) as usize;
        let per_rank = budget / (self.ranks * per_item.max(1));
        Ok(Some(per_rank.max(1)))
    }
}
