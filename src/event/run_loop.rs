//! Event timer: decides, tick by tick, whether a run continues.

use tokio::time::{Duration, Instant};

use super::state::{EndReasons, EventConfig};

/// Everything sampled on one run loop tick.
///
/// The latch is sampled before the node lines; `nodes` is in node order.
#[derive(Debug, Clone)]
pub struct RunSample {
    /// Instant of the tick
    pub now: Instant,
    /// Trigger latch level
    pub latched: bool,
    /// Operator stop requested since the last tick
    pub manual_trigger: bool,
    /// Active line of each node
    pub nodes: Vec<bool>,
}

/// Decision for one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunTick {
    /// Keep running; reschedule the next tick.
    Continue {
        /// Time since `tic`
        elapsed: Duration,
    },
    /// Stop the run.
    End {
        /// Time since `tic` on the deciding tick
        elapsed: Duration,
        /// Every cause true on the deciding tick
        reasons: EndReasons,
        /// Nodes low on the deciding tick
        inactive: Vec<usize>,
    },
}

/// Run loop state for one event, from `tic` until it decides to end.
#[derive(Debug, Clone)]
pub struct RunLoop {
    tic: Instant,
    config: EventConfig,
    /// Pending trigger enable deadline; cleared once fired or cancelled.
    enable_at: Option<Instant>,
    enable_fired: bool,
    ended: bool,
}

impl RunLoop {
    /// Start a run at `tic`, with the trigger enable due `trigger_enable_delay` later.
    pub fn new(config: EventConfig, tic: Instant) -> Self {
        Self {
            tic,
            config,
            enable_at: Some(tic + config.trigger_enable_delay()),
            enable_fired: false,
            ended: false,
        }
    }

    /// Run start.
    pub fn tic(&self) -> Instant {
        self.tic
    }

    /// Parameters the run was armed with.
    pub fn config(&self) -> &EventConfig {
        &self.config
    }

    /// Deadline of the one-shot trigger enable, if still pending.
    pub fn enable_deadline(&self) -> Option<Instant> {
        self.enable_at
    }

    /// Whether the trigger enable went out before the run ended.
    pub fn enable_fired(&self) -> bool {
        self.enable_fired
    }

    /// Claim the trigger enable if it is due at `now`.
    ///
    /// Returns true at most once per run, and never after the run ended.
    pub fn take_enable(&mut self, now: Instant) -> bool {
        match self.enable_at {
            Some(at) if at <= now && !self.ended => {
                self.enable_at = None;
                self.enable_fired = true;
                true
            }
            _ => false,
        }
    }

    /// Evaluate one tick.
    ///
    /// A held latch wins outright and is the only recorded reason. Otherwise
    /// every condition that holds (time, manual, inactive node) is recorded.
    pub fn tick(&mut self, sample: &RunSample) -> RunTick {
        let elapsed = sample.now.saturating_duration_since(self.tic);
        let inactive: Vec<usize> = sample
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, active)| !**active)
            .map(|(i, _)| i)
            .collect();

        let reasons = if sample.latched {
            EndReasons::LATCH_TRIGGERED
        } else {
            let mut reasons = EndReasons::empty();
            reasons.set(
                EndReasons::MAX_TIME_EXCEEDED,
                elapsed > self.config.max_duration(),
            );
            reasons.set(EndReasons::MANUAL_TRIGGER, sample.manual_trigger);
            reasons.set(EndReasons::NODE_INACTIVE, !inactive.is_empty());
            reasons
        };

        if reasons.is_empty() {
            return RunTick::Continue { elapsed };
        }
        self.ended = true;
        self.enable_at = None;
        RunTick::End {
            elapsed,
            reasons,
            inactive,
        }
    }
}
