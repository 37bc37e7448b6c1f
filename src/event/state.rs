//! Controller lifecycle, node status and event run types.

use bitflags::bitflags;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{AppResult, BuilderError};

/// Event controller lifecycle.
///
/// # State Machine
///
/// ```text
/// Idle ──arm──> Arming ──latch clear──> WaitingReady ──all ready──> Running
///  ▲              │                         │                         │
///  │        latch held / bad input      budget spent           end condition
///  │              │                         │                         │
///  ├──────────────┴─────────────────────────┘                         ▼
///  │                                                               Ending
///  │                                                                  │
///  └──────────────────all nodes inactive──── Draining <───────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControllerState {
    /// Waiting for the operator
    Idle,
    /// Validating the request and checking the latch
    Arming,
    /// Readiness barrier in progress
    WaitingReady,
    /// Run loop ticking
    Running,
    /// Run sealed, outputs being torn down
    Ending,
    /// Waiting for every node to go inactive
    Draining,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ControllerState::Idle => "Idle",
            ControllerState::Arming => "Arming",
            ControllerState::WaitingReady => "WaitingReady",
            ControllerState::Running => "Running",
            ControllerState::Ending => "Ending",
            ControllerState::Draining => "Draining",
        };
        write!(f, "{}", label)
    }
}

impl ControllerState {
    /// Check if the state allows arming a new event.
    pub fn can_arm(&self) -> bool {
        matches!(self, ControllerState::Idle)
    }

    /// Check if a manual trigger would end something.
    pub fn can_stop(&self) -> bool {
        matches!(self, ControllerState::Running)
    }
}

/// What the controller last learned about a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeState {
    /// Not sampled since the last event
    Unknown,
    /// Asserted during the readiness barrier
    Ready,
    /// Still asserted when the run ended
    Active,
    /// Deasserted when the run ended
    Inactive,
    /// Never asserted during the readiness barrier
    Failed,
}

/// One node's entry in the controller's status table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    /// 0-based node index
    pub id: usize,
    /// Last known state
    pub state: NodeState,
}

impl NodeStatus {
    /// Status of a node nothing is known about yet.
    pub fn unknown(id: usize) -> Self {
        Self {
            id,
            state: NodeState::Unknown,
        }
    }
}

bitflags! {
    /// Why a run ended. More than one condition can hold on the deciding tick.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct EndReasons: u8 {
        const MAX_TIME_EXCEEDED = 1 << 0;
        const MANUAL_TRIGGER = 1 << 1;
        const NODE_INACTIVE = 1 << 2;
        const LATCH_TRIGGERED = 1 << 3;
    }
}

const REASON_LABELS: [(EndReasons, &str); 4] = [
    (EndReasons::MAX_TIME_EXCEEDED, "MaxTimeExceeded"),
    (EndReasons::MANUAL_TRIGGER, "ManualTrigger"),
    (EndReasons::NODE_INACTIVE, "NodeInactive"),
    (EndReasons::LATCH_TRIGGERED, "LatchTriggered"),
];

impl EndReasons {
    /// Human readable causes, in a fixed order.
    pub fn labels(&self) -> Vec<&'static str> {
        REASON_LABELS
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, label)| *label)
            .collect()
    }
}

impl fmt::Display for EndReasons {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.labels().join(", "))
    }
}

/// Operator parameters for one event. Validated on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventConfig {
    #[serde(with = "humantime_serde")]
    trigger_enable_delay: Duration,
    #[serde(with = "humantime_serde")]
    max_duration: Duration,
}

impl EventConfig {
    /// Build from seconds, rejecting negative or non-finite values.
    pub fn from_secs(trigger_enable_delay: f64, max_duration: f64) -> AppResult<Self> {
        Ok(Self {
            trigger_enable_delay: seconds("trigger enable delay", trigger_enable_delay)?,
            max_duration: seconds("max duration", max_duration)?,
        })
    }

    /// Parse operator text (as typed into the spinners).
    pub fn parse(trigger_enable_delay: &str, max_duration: &str) -> AppResult<Self> {
        let delay = parse_number("trigger enable delay", trigger_enable_delay)?;
        let max = parse_number("max duration", max_duration)?;
        Self::from_secs(delay, max)
    }

    /// Delay from run start to trigger enable.
    pub fn trigger_enable_delay(&self) -> Duration {
        self.trigger_enable_delay
    }

    /// Longest the run may last.
    pub fn max_duration(&self) -> Duration {
        self.max_duration
    }
}

fn parse_number(label: &str, text: &str) -> AppResult<f64> {
    text.trim()
        .parse::<f64>()
        .map_err(|_| BuilderError::InvalidInput(format!("{label} '{}' is not a number", text.trim())))
}

fn seconds(label: &str, value: f64) -> AppResult<Duration> {
    if !value.is_finite() || value < 0.0 {
        return Err(BuilderError::InvalidInput(format!(
            "{label} must be a non-negative number of seconds, got {value}"
        )));
    }
    Duration::try_from_secs_f64(value)
        .map_err(|e| BuilderError::InvalidInput(format!("{label}: {e}")))
}

/// A sealed event run. Produced once when the run loop decides to end and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRun {
    /// Run identifier
    pub id: Uuid,
    /// Parameters the run was armed with
    pub config: EventConfig,
    /// Wall clock time the readiness barrier succeeded
    pub started_at: DateTime<Local>,
    /// Wall clock time the run was sealed
    pub ended_at: DateTime<Local>,
    /// Time between run start and the deciding tick
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
    /// Every cause true on the deciding tick
    pub end_reasons: EndReasons,
    /// Nodes whose active line was low on the deciding tick
    pub inactive_nodes: Vec<usize>,
    /// Whether the trigger enable lines were raised during the run
    pub trigger_enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_idle_can_arm() {
        assert!(ControllerState::Idle.can_arm());
        for state in [
            ControllerState::Arming,
            ControllerState::WaitingReady,
            ControllerState::Running,
            ControllerState::Ending,
            ControllerState::Draining,
        ] {
            assert!(!state.can_arm(), "{state} should not arm");
        }
    }

    #[test]
    fn end_reasons_display_lists_every_cause() {
        let reasons = EndReasons::MAX_TIME_EXCEEDED | EndReasons::NODE_INACTIVE;
        assert_eq!(reasons.to_string(), "{MaxTimeExceeded, NodeInactive}");
        assert_eq!(EndReasons::empty().to_string(), "{}");
    }

    #[test]
    fn event_config_parses_operator_text() {
        let config = EventConfig::parse(" 0.1 ", "1").unwrap();
        assert_eq!(config.trigger_enable_delay(), Duration::from_millis(100));
        assert_eq!(config.max_duration(), Duration::from_secs(1));
    }

    #[test]
    fn event_config_rejects_bad_input() {
        assert!(matches!(
            EventConfig::parse("abc", "1"),
            Err(BuilderError::InvalidInput(_))
        ));
        assert!(EventConfig::parse("1", "").is_err());
        assert!(EventConfig::from_secs(-1.0, 1.0).is_err());
        assert!(EventConfig::from_secs(0.0, f64::NAN).is_err());
        assert!(EventConfig::from_secs(0.0, f64::INFINITY).is_err());
        assert!(EventConfig::from_secs(0.0, 0.0).is_ok());
    }
}
