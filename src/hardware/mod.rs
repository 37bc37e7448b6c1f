//! Digital I/O boundary
//!
//! Everything the event protocol knows about the outside world is a set of
//! boolean lines. This module names those lines, defines the capability a
//! backend must provide, and wraps it in the [`LineDriver`] the controller
//! uses for reads, writes and non-blocking pulses.

pub mod capabilities;
pub mod driver;
pub mod lines;
pub mod mock;
pub mod sim;

pub use capabilities::DigitalLines;
pub use driver::LineDriver;
pub use lines::{Line, LineMap};
pub use mock::MockLines;
pub use sim::{SimSettings, SimulatedNodes};
