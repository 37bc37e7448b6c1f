//! Digital line capability
//!
//! The event protocol only ever talks to the outside world through boolean
//! levels, so the hardware boundary is a single small trait. Any GPIO header,
//! DIO card or simulator that can read and drive named lines can back the
//! controller.
//!
//! # Design Philosophy
//!
//! - Async (uses #[async_trait]) so backends may hop to a blocking pool
//! - Thread-safe (requires Send + Sync)
//! - Uses anyhow::Result for errors
//! - No pulse primitive: holding a level for a fixed time is scheduled by
//!   [`LineDriver`](super::LineDriver), never by sleeping inside a backend
//!
//! # Example
//!
//! ```rust,ignore
//! async fn all_active<D: DigitalLines>(io: &D, nodes: usize) -> Result<bool> {
//!     for i in 0..nodes {
//!         if !io.read(Line::NodeActive(i)).await? {
//!             return Ok(false);
//!         }
//!     }
//!     Ok(true)
//! }
//! ```

use anyhow::Result;
use async_trait::async_trait;

use super::Line;

/// Capability: Digital Line I/O
///
/// # Contract
/// - `read` samples the current level of an input (or the last driven level
///   of an output) without waiting for an edge
/// - `write` sets an output level and returns once it is applied
/// - Neither call may block the scheduler for longer than the hardware access
/// - An error means the line is unavailable; callers treat it as fatal
#[async_trait]
pub trait DigitalLines: Send + Sync {
    /// Sample a line.
    ///
    /// # Returns
    /// - Ok(true) if the line is high
    /// - Ok(false) if the line is low
    /// - Err if the line cannot be accessed
    async fn read(&self, line: Line) -> Result<bool>;

    /// Drive an output line to `level`.
    ///
    /// # Returns
    /// - Ok(()) once the level is applied
    /// - Err if the line is not an output or cannot be accessed
    async fn write(&self, line: Line, level: bool) -> Result<()>;
}
