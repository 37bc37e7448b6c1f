//! Custom error types for the event builder.
//!
//! This module defines the primary error type, `BuilderError`, shared by the
//! controller, its service task and the CLI. Using the `thiserror` crate, it
//! gives one consistent place to describe everything that can go wrong, from a
//! malformed configuration file to a digital line that disappeared mid-run.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps errors from `figment`, typically a TOML parse failure or
//!   an environment override with the wrong type.
//! - **`Configuration`**: Semantic errors in a configuration that parsed fine,
//!   such as mismatched node line lists or a pin used twice.
//! - **`InvalidInput`**: The operator supplied a duration or delay that is not a
//!   finite, non-negative number. The arm attempt is rejected before any line is
//!   touched.
//! - **`NotIdle`**, **`LatchHeld`**, **`ReadinessTimeout`**: Arm attempts that
//!   were refused or failed. None of these are fatal; the controller stays (or
//!   returns to) `Idle`.
//! - **`LineUnavailable`**: A digital line could not be read or driven. This is
//!   fatal to the whole session and is never retried.
//! - **`Storage`**: Run directory, link or record file I/O failures.
//! - **`ControllerStopped`**: The controller task is no longer running.

use crate::event::state::ControllerState;
use crate::hardware::Line;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, BuilderError>;

/// Every error the event builder reports.
#[derive(Error, Debug)]
pub enum BuilderError {
    /// The configuration sources could not be read or merged.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// The configuration loaded but is not usable.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Operator-supplied event parameters were rejected.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An arm was attempted outside Idle.
    #[error("Controller is {0}, an event can only be armed from Idle")]
    NotIdle(ControllerState),

    /// The trigger latch was already set when arming.
    #[error("Trigger latch is held; reset signal sent, please try again")]
    LatchHeld,

    /// Not every node came up within the readiness budget.
    #[error("Nodes {} did not report ready", format_nodes(.failed))]
    ReadinessTimeout {
        /// Nodes still low on the final poll
        failed: Vec<usize>,
    },

    /// A digital line could not be read or driven. Fatal.
    #[error("Digital line {line} unavailable: {message}")]
    LineUnavailable {
        /// The line that failed
        line: Line,
        /// Backend error text
        message: String,
    },

    /// Run directory, link or record I/O failed.
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// The controller task has exited.
    #[error("Event controller is not running")]
    ControllerStopped,
}

impl BuilderError {
    /// Whether the error ends the operator session rather than a single attempt.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BuilderError::LineUnavailable { .. } | BuilderError::ControllerStopped
        )
    }

    pub(crate) fn line(line: Line, source: anyhow::Error) -> Self {
        BuilderError::LineUnavailable {
            line,
            message: format!("{source:#}"),
        }
    }
}

impl From<figment::Error> for BuilderError {
    fn from(value: figment::Error) -> Self {
        BuilderError::Config(Box::new(value))
    }
}

fn format_nodes(nodes: &[usize]) -> String {
    nodes
        .iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
