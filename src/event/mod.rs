//! Event coordination: barriers, run loop, latch and the controller tying
//! them into one lifecycle.

pub mod barrier;
pub mod controller;
pub mod latch;
pub mod run_loop;
pub mod state;

pub use controller::{CompletedEvent, ControllerEvent, EventController};
pub use state::{ControllerState, EndReasons, EventConfig, EventRun, NodeState, NodeStatus};
