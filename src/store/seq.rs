//! Merge versioning: sequence markers, mutation sources, and the acceptance
//! rule that linearizes concurrent updates.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Per-entity sequence marker in epoch milliseconds.
///
/// Push messages carry their wall-clock receipt time; confirmations carry
/// their confirmation time; optimistic inserts carry a local clock tick. One
/// clock for all three keeps the comparison meaningful across sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Sequence(u64);

static LAST_ISSUED: AtomicU64 = AtomicU64::new(0);

impl Sequence {
    pub const ZERO: Sequence = Sequence(0);

    /// Wall clock bumped past the last issued marker, so consecutive calls
    /// return strictly increasing sequences even within one millisecond and
    /// across backwards clock steps. A write stamped after a read of the
    /// store always carries the greater marker.
    pub fn now() -> Self {
        let wall = Utc::now().timestamp_millis().max(0) as u64;
        let issued = match LAST_ISSUED.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(wall.max(last + 1))
        }) {
            Ok(prev) | Err(prev) => wall.max(prev + 1),
        };
        Sequence(issued)
    }

    pub fn from_millis(millis: u64) -> Self {
        Sequence(millis)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }
}

/// Where a mutation came from. Ranks break sequence ties: an on-chain
/// confirmation outranks a push update carrying the same marker, a fetched
/// chain read outranks both gossip and optimism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Optimistic local mutation awaiting confirmation.
    Local,
    /// Real-time push channel.
    Push,
    /// Bootstrap or poll fetch through a chain adapter.
    Fetch,
    /// Finalized transaction confirmation.
    Confirmation,
}

impl Source {
    pub fn rank(&self) -> u8 {
        match self {
            Source::Local => 0,
            Source::Push => 1,
            Source::Fetch => 2,
            Source::Confirmation => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Local => "local",
            Source::Push => "push",
            Source::Fetch => "fetch",
            Source::Confirmation => "confirmation",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stored value plus the version that produced it.
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    pub value: T,
    pub seq: Sequence,
    pub source: Source,
}

impl<T> Versioned<T> {
    pub fn new(value: T, seq: Sequence, source: Source) -> Self {
        Self { value, seq, source }
    }

    /// The acceptance rule: newer sequences always win; an equal sequence
    /// wins only from an equal-or-higher-ranked source. Equal sequence and
    /// source re-applies, which keeps merging idempotent.
    pub fn admits(&self, seq: Sequence, source: Source) -> bool {
        seq > self.seq || (seq == self.seq && source.rank() >= self.source.rank())
    }

    pub fn record(&mut self, seq: Sequence, source: Source) {
        self.seq = seq;
        self.source = source;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_is_strictly_increasing() {
        // A tight loop issues many markers inside one millisecond; every one
        // must still be greater than the last.
        let mut prev = Sequence::now();
        for _ in 0..100 {
            let next = Sequence::now();
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn test_local_write_after_fetch_is_admitted() {
        let fetched = Versioned::new((), Sequence::now(), Source::Fetch);
        assert!(fetched.admits(Sequence::now(), Source::Local));
    }

    #[test]
    fn test_newer_sequence_always_admitted() {
        let v = Versioned::new((), Sequence::from_millis(100), Source::Confirmation);
        assert!(v.admits(Sequence::from_millis(101), Source::Local));
        assert!(v.admits(Sequence::from_millis(101), Source::Push));
    }

    #[test]
    fn test_older_sequence_always_rejected() {
        let v = Versioned::new((), Sequence::from_millis(100), Source::Push);
        assert!(!v.admits(Sequence::from_millis(99), Source::Confirmation));
    }

    #[test]
    fn test_tie_breaks_by_source_rank() {
        let seq = Sequence::from_millis(100);
        let stored_push = Versioned::new((), seq, Source::Push);
        assert!(stored_push.admits(seq, Source::Confirmation));
        assert!(stored_push.admits(seq, Source::Fetch));
        assert!(stored_push.admits(seq, Source::Push));
        assert!(!stored_push.admits(seq, Source::Local));

        let stored_confirmation = Versioned::new((), seq, Source::Confirmation);
        assert!(!stored_confirmation.admits(seq, Source::Push));
        assert!(stored_confirmation.admits(seq, Source::Confirmation));
    }

    #[test]
    fn test_source_ranks_are_ordered() {
        assert!(Source::Local.rank() < Source::Push.rank());
        assert!(Source::Push.rank() < Source::Fetch.rank());
        assert!(Source::Fetch.rank() < Source::Confirmation.rank());
    }
}
