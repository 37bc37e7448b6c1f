//! Simulated camera nodes
//!
//! Makes a [`MockLines`] bank behave like the real nodes on the other end of
//! the wires:
//!
//! - a node raises its active line `startup` after its arm line rises
//! - it drops the active line `save` after the arm line falls (images written)
//! - a node listed in `dead_nodes` never comes up
//! - with `trigger_after` set, the trigger hardware asserts the latch that long
//!   after the enable lines rise; a rising reset line clears it
//!
//! The simulation samples the output lines once per millisecond on the same
//! runtime as the controller.

use std::collections::BTreeSet;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::{Line, MockLines};

/// Behaviour of the simulated nodes.
#[derive(Debug, Clone)]
pub struct SimSettings {
    /// Delay between arm rising and active rising.
    pub startup: Duration,
    /// Delay between arm falling and active falling.
    pub save: Duration,
    /// Nodes that never assert active.
    pub dead_nodes: BTreeSet<usize>,
    /// Latch asserts this long after the enable lines rise.
    pub trigger_after: Option<Duration>,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            startup: Duration::from_millis(50),
            save: Duration::from_millis(500),
            dead_nodes: BTreeSet::new(),
            trigger_after: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct NodeSim {
    armed: bool,
    pending: Option<(Instant, bool)>,
}

/// Background task driving node inputs from controller outputs.
pub struct SimulatedNodes {
    lines: MockLines,
    nodes: Vec<NodeSim>,
    settings: SimSettings,
    enabled: bool,
    reset: bool,
    latch_at: Option<Instant>,
}

impl SimulatedNodes {
    /// Simulator for `node_count` nodes on `lines`.
    pub fn new(lines: MockLines, node_count: usize, settings: SimSettings) -> Self {
        Self {
            lines,
            nodes: vec![NodeSim::default(); node_count],
            settings,
            enabled: false,
            reset: false,
            latch_at: None,
        }
    }

    /// Run the simulation until the returned handle is aborted.
    pub fn spawn(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_millis(1));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                let now = ticker.tick().await;
                self.step(now);
            }
        })
    }

    fn step(&mut self, now: Instant) {
        for (i, node) in self.nodes.iter_mut().enumerate() {
            let armed = self.lines.level(Line::NodeArm(i));
            if armed != node.armed {
                node.armed = armed;
                let delay = if armed {
                    self.settings.startup
                } else {
                    self.settings.save
                };
                if !(armed && self.settings.dead_nodes.contains(&i)) {
                    node.pending = Some((now + delay, armed));
                }
            }
            if let Some((at, level)) = node.pending {
                if now >= at {
                    node.pending = None;
                    self.lines.set(Line::NodeActive(i), level);
                    debug!(node = i, active = level, "simulated node changed state");
                }
            }
        }

        let enabled = (0..self.nodes.len()).any(|i| self.lines.level(Line::NodeEnable(i)));
        if enabled && !self.enabled {
            self.latch_at = self.settings.trigger_after.map(|d| now + d);
        }
        if !enabled {
            self.latch_at = None;
        }
        self.enabled = enabled;
        if let Some(at) = self.latch_at {
            if now >= at {
                self.latch_at = None;
                self.lines.set(Line::Latch, true);
                info!("simulated trigger latched");
            }
        }

        let reset = self.lines.level(Line::Reset);
        if reset && !self.reset {
            self.lines.set(Line::Latch, false);
        }
        self.reset = reset;
    }
}
