//! Pending transaction pool: buffers, validates and serves unconfirmed
//! transactions, and guarantees that proposal batches are internally
//! conflict-free, byte-bounded and deterministically ordered.
//!
//! The pool owns an epoch-ordered persistent index (oldest expiration
//! first, insertion order breaking ties), consumed-UTXO reservations, and
//! short-lived cooldown tombstones that block re-admission of just-mined
//! hashes. It depends on the state trie for liveness checks and on the
//! deposit index for deposit resolution, never the other way around.

mod index;
mod options;
mod pool;

pub use options::{PoolOptions, PoolOptionsBuilder};
pub use pool::{PROPOSAL_ENTRY_COST, PendingTxPool, ProposalBatch};

use std::time::{Duration, Instant};

/// Advisory early-exit point for batch-construction scans.
///
/// Polled once per index iteration; on expiry the scan stops and returns
/// whatever it has accumulated. Partial results are always valid.
#[derive(Debug, Clone, Copy)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// A deadline that never fires.
    pub fn none() -> Self {
        Self(None)
    }

    pub fn after(budget: Duration) -> Self {
        Self(Some(Instant::now() + budget))
    }

    pub fn at(instant: Instant) -> Self {
        Self(Some(instant))
    }

    pub fn expired(&self) -> bool {
        self.0.is_some_and(|t| Instant::now() >= t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_none_never_expires() {
        assert!(!Deadline::none().expired());
    }

    #[test]
    fn elapsed_deadline_reports_expired() {
        assert!(Deadline::after(Duration::ZERO).expired());
        assert!(!Deadline::after(Duration::from_secs(3600)).expired());
    }
}
