//! Worker role tags.

/// Role of a worker within the cooperating set.
///
/// Threaded explicitly through driver and reporting signatures instead of
/// being inferred from an ambient rank variable. Rank 0 is the coordinator:
/// it owns the assembled output and emits progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Rank 0: gathers results, owns the output array, reports progress.
    Coordinator,
    /// Any other rank: computes its slice and participates in gathers.
    Worker,
}

impl Role {
    /// Role of the given rank.
    #[must_use]
    pub fn of_rank(rank: usize) -> Self {
        if rank == 0 {
            Role::Coordinator
        } else {
            Role::Worker
        }
    }

    /// Returns true for the coordinating rank.
    #[must_use]
    pub fn is_coordinator(self) -> bool {
        matches!(self, Role::Coordinator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_zero_coordinates() {
        assert!(Role::of_rank(0).is_coordinator());
        assert!(!Role::of_rank(1).is_coordinator());
        assert!(!Role::of_rank(7).is_coordinator());
    }
}
