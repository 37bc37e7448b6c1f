//! Readiness and drain barriers.
//!
//! Both barriers are fed one reading of every node's active line per poll and
//! decide from that reading alone. Scheduling the polls is the controller's
//! job, so the same logic runs under the real scheduler and in tests.

use tokio::time::{Duration, Instant};

/// Result of one readiness poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// Not every node asserted yet; poll again.
    Pending,
    /// Every node asserted on the same reading.
    Ready,
    /// Budget spent. Holds the nodes that were low on the final reading.
    TimedOut {
        /// 0-based indices, ascending
        failed: Vec<usize>,
    },
}

/// Waits for all nodes to assert on one simultaneous reading.
///
/// Non-overlapping assertions never count: a node that was high on an earlier
/// poll and dropped again does not help a later poll succeed.
#[derive(Debug, Clone)]
pub struct ReadinessBarrier {
    budget: u32,
    polls: u32,
}

impl ReadinessBarrier {
    /// Barrier allowing `budget` readings.
    pub fn new(budget: u32) -> Self {
        Self { budget, polls: 0 }
    }

    /// Number of readings evaluated so far.
    pub fn polls(&self) -> u32 {
        self.polls
    }

    /// Evaluate one reading. A success on the final permitted poll still counts.
    pub fn poll(&mut self, levels: &[bool]) -> Readiness {
        self.polls += 1;
        if !levels.is_empty() && levels.iter().all(|active| *active) {
            return Readiness::Ready;
        }
        if self.polls >= self.budget {
            let failed = levels
                .iter()
                .enumerate()
                .filter(|(_, active)| !**active)
                .map(|(i, _)| i)
                .collect();
            return Readiness::TimedOut { failed };
        }
        Readiness::Pending
    }
}

/// Result of one drain poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Drain {
    /// Some nodes are still active.
    Waiting {
        /// Nodes still asserting
        still_active: Vec<usize>,
        /// Set when the waiting warning is due again.
        warn: bool,
    },
    /// Every node reads inactive.
    Complete,
}

/// Waits, without a timeout, for every node to go inactive.
///
/// A node that hangs with its line asserted blocks this forever; the barrier
/// only reports that it is still waiting, every `warn_every`.
#[derive(Debug, Clone)]
pub struct DrainBarrier {
    started: Instant,
    warn_every: Duration,
    next_warn: Instant,
}

impl DrainBarrier {
    /// Drain opened at `started`, warning every `warn_every` while it waits.
    pub fn new(started: Instant, warn_every: Duration) -> Self {
        Self {
            started,
            warn_every,
            next_warn: started + warn_every,
        }
    }

    /// How long the drain has been waiting at `now`.
    pub fn waited(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started)
    }

    /// Evaluate one reading taken at `now`.
    pub fn poll(&mut self, levels: &[bool], now: Instant) -> Drain {
        let still_active: Vec<usize> = levels
            .iter()
            .enumerate()
            .filter(|(_, active)| **active)
            .map(|(i, _)| i)
            .collect();
        if still_active.is_empty() {
            return Drain::Complete;
        }
        let warn = !self.warn_every.is_zero() && now >= self.next_warn;
        if warn {
            self.next_warn = now + self.warn_every;
        }
        Drain::Waiting { still_active, warn }
    }
}
