//! Status surface.
//!
//! The controller publishes an immutable [`StatusSnapshot`] after every change.
//! [`render`] projects a snapshot onto the text panel the operator sees; it is
//! pure, so redrawing from the same snapshot always gives the same view.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::time::Duration;

use crate::event::state::{ControllerState, EventRun, NodeState, NodeStatus};

/// Message shown to the operator until the next arm attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Notice {
    /// Duration or delay rejected
    InvalidInput(String),
    /// Latch held at arm; reset pulse sent
    LatchHeld,
    /// Readiness barrier timed out on these nodes
    InactiveNodes(Vec<usize>),
    /// Drain barrier still waiting on these nodes
    WaitingForNodes(Vec<usize>),
    /// Run directory could not be prepared
    StorageFailed(String),
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notice::InvalidInput(msg) => write!(f, "Error: Invalid input! {msg}"),
            Notice::LatchHeld => write!(
                f,
                "Trigger Latch enabled, Trigger Reset signal sent. Please try again."
            ),
            Notice::InactiveNodes(nodes) => {
                write!(f, "Error: Inactive camera(s) {}", cameras(nodes))
            }
            Notice::WaitingForNodes(nodes) => {
                write!(f, "Waiting for camera(s) {} to save...", cameras(nodes))
            }
            Notice::StorageFailed(msg) => write!(f, "Error: could not prepare run directory: {msg}"),
        }
    }
}

/// 1-based camera numbers, as printed on the bench.
fn cameras(nodes: &[usize]) -> String {
    nodes
        .iter()
        .map(|n| (n + 1).to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Everything an observer may know about the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Lifecycle state
    pub state: ControllerState,
    /// Per-node status
    pub nodes: Vec<NodeStatus>,
    /// Elapsed time of the running event, as of the last tick
    pub elapsed: Option<Duration>,
    /// "Start Event" affordance
    pub arm_enabled: bool,
    /// "Stop Event" affordance
    pub stop_enabled: bool,
    /// Most recently sealed run
    pub last_run: Option<EventRun>,
    /// Message for the operator, if any
    pub notice: Option<Notice>,
}

impl StatusSnapshot {
    /// Snapshot of a freshly started controller.
    pub fn initial(node_count: usize) -> Self {
        Self {
            state: ControllerState::Idle,
            nodes: (0..node_count).map(NodeStatus::unknown).collect(),
            elapsed: None,
            arm_enabled: true,
            stop_enabled: false,
            last_run: None,
            notice: None,
        }
    }
}

fn node_badge(state: NodeState) -> &'static str {
    match state {
        NodeState::Unknown => "--",
        NodeState::Ready => "ready",
        NodeState::Active => "on",
        NodeState::Inactive => "OFF",
        NodeState::Failed => "FAILED",
    }
}

/// Render a snapshot as the operator panel.
pub fn render(snapshot: &StatusSnapshot) -> String {
    let mut out = String::new();
    let elapsed = snapshot.elapsed.map(|d| d.as_secs_f64()).unwrap_or(0.0);
    let _ = writeln!(out, "State: {}", snapshot.state);
    let _ = writeln!(out, "Event Time: {:.4}", elapsed);
    let _ = writeln!(
        out,
        "[{}] Start Event  [{}] Stop Event",
        if snapshot.arm_enabled { "x" } else { " " },
        if snapshot.stop_enabled { "x" } else { " " }
    );
    for node in &snapshot.nodes {
        let _ = writeln!(out, "Cam_{}: {}", node.id, node_badge(node.state));
    }
    if let Some(run) = &snapshot.last_run {
        let _ = writeln!(
            out,
            "Last event: {:.4}s, ended by {}",
            run.elapsed.as_secs_f64(),
            run.end_reasons
        );
    }
    if let Some(notice) = &snapshot.notice {
        let _ = writeln!(out, "{notice}");
    }
    out
}
