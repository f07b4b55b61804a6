/// Counters produced by a per-object eviction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Objects listed and dispatched for deletion.
    pub attempted: usize,
    /// Objects whose deletion failed.
    pub failed: usize,
}

impl EvictionReport {
    /// Returns whether every attempted deletion succeeded.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }

    /// Returns the number of objects deleted.
    #[inline]
    pub fn deleted(&self) -> usize {
        self.attempted.saturating_sub(self.failed)
    }
}
