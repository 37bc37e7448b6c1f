//! # Event Builder
//!
//! Coordinates timed acquisition events across camera nodes that talk to the
//! controller only through shared digital lines. One controller arms the
//! nodes, waits until every node reports active at once, runs a bounded
//! time window while watching for early end conditions, and then waits for
//! every node to go quiet before the next event may start.
//!
//! ## Crate Structure
//!
//! - **`hardware`**: line names and pin map, the `DigitalLines` capability,
//!   the non-blocking `LineDriver`, an in-memory backend and a node simulator.
//! - **`event`**: readiness and drain barriers, the latch monitor, the run
//!   loop, and the `EventController` state machine built from them.
//! - **`service`**: the controller as an actor task with a clonable handle.
//! - **`session`**: per-event run directories and the images link.
//! - **`record`**: `info.txt`/`event.json` written for every completed event.
//! - **`node_config`**: per-node JSON configuration files.
//! - **`status`**: immutable status snapshots and their text rendering.
//! - **`config`**, **`error`**, **`tracing_setup`**: ambient plumbing.

pub mod config;
pub mod error;
pub mod event;
pub mod hardware;
pub mod node_config;
pub mod record;
pub mod service;
pub mod session;
pub mod status;
pub mod tracing_setup;
