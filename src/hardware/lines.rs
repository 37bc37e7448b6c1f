//! Logical line names and their mapping to physical pins.

use crate::config::LinesConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A logical digital line used by the event protocol.
///
/// Node indices are zero-based; the physical pin behind each line comes from
/// [`LineMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Line {
    /// Input: node reports it is active (acquiring or still saving).
    NodeActive(usize),
    /// Output: tells a node an event is being armed ("state com").
    NodeArm(usize),
    /// Output: node may start looking for triggers.
    NodeEnable(usize),
    /// Input: externally driven abort latch.
    Latch,
    /// Output: clears the trigger latch hardware.
    Reset,
    /// Output: end-of-event marker.
    EndEvent,
}

impl Line {
    /// Whether the controller drives this line (as opposed to sampling it).
    pub fn is_output(&self) -> bool {
        !matches!(self, Line::NodeActive(_) | Line::Latch)
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Line::NodeActive(i) => write!(f, "node{i}.active"),
            Line::NodeArm(i) => write!(f, "node{i}.arm"),
            Line::NodeEnable(i) => write!(f, "node{i}.enable"),
            Line::Latch => write!(f, "latch"),
            Line::Reset => write!(f, "reset"),
            Line::EndEvent => write!(f, "end_event"),
        }
    }
}

/// Resolves logical lines to board pin numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineMap {
    node_active: Vec<u8>,
    node_arm: Vec<u8>,
    node_enable: Vec<u8>,
    latch: u8,
    reset: u8,
    end_event: u8,
}

impl LineMap {
    /// Build a map from validated line configuration.
    pub fn from_config(config: &LinesConfig) -> Self {
        Self {
            node_active: config.node_active.clone(),
            node_arm: config.node_arm.clone(),
            node_enable: config.node_enable.clone(),
            latch: config.latch,
            reset: config.reset,
            end_event: config.end_event,
        }
    }

    /// Number of nodes wired to the controller.
    pub fn node_count(&self) -> usize {
        self.node_active.len()
    }

    /// Physical pin for a line, `None` if the node index is out of range.
    pub fn pin(&self, line: Line) -> Option<u8> {
        match line {
            Line::NodeActive(i) => self.node_active.get(i).copied(),
            Line::NodeArm(i) => self.node_arm.get(i).copied(),
            Line::NodeEnable(i) => self.node_enable.get(i).copied(),
            Line::Latch => Some(self.latch),
            Line::Reset => Some(self.reset),
            Line::EndEvent => Some(self.end_event),
        }
    }

    /// Every line the controller drives, in a stable order.
    pub fn outputs(&self) -> Vec<Line> {
        let n = self.node_count();
        (0..n)
            .map(Line::NodeArm)
            .chain((0..n).map(Line::NodeEnable))
            .chain([Line::Reset, Line::EndEvent])
            .collect()
    }

    /// Every line the controller samples.
    pub fn inputs(&self) -> Vec<Line> {
        (0..self.node_count())
            .map(Line::NodeActive)
            .chain(std::iter::once(Line::Latch))
            .collect()
    }
}
