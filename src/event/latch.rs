//! Trigger latch monitor.
//!
//! The latch is set by external trigger hardware and can assert at any time.
//! It is only ever sampled at tick boundaries. Before arming, a held latch
//! blocks the arm attempt and gets exactly one reset pulse; during a run, a
//! held latch ends the run ahead of every other end condition.

use tokio::time::{Duration, Instant};
use tracing::{info, warn};

use crate::error::{AppResult, BuilderError};
use crate::hardware::{Line, LineDriver};

/// Samples the trigger latch and counts how often it tripped.
#[derive(Debug, Default)]
pub struct LatchMonitor {
    /// Latched at the previous sample, used to log edges once.
    latched: bool,
    trips: u64,
}

impl LatchMonitor {
    /// Monitor with no trips recorded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Times the latch has been seen rising.
    pub fn trips(&self) -> u64 {
        self.trips
    }

    /// Sample the latch on a run loop tick.
    pub async fn sample(&mut self, driver: &LineDriver) -> AppResult<bool> {
        let latched = driver.read(Line::Latch).await?;
        if latched && !self.latched {
            self.trips += 1;
            info!(trips = self.trips, "trigger latch asserted");
        }
        self.latched = latched;
        Ok(latched)
    }

    /// Refuse to arm while the latch is held.
    ///
    /// On a held latch, pulses the reset line once and returns
    /// [`BuilderError::LatchHeld`]. No other line is touched.
    pub async fn clear_for_arm(
        &mut self,
        driver: &mut LineDriver,
        reset_hold: Duration,
        now: Instant,
    ) -> AppResult<()> {
        if !self.sample(driver).await? {
            return Ok(());
        }
        warn!("trigger latch held at arm, sending reset");
        driver.pulse(Line::Reset, reset_hold, now).await?;
        Err(BuilderError::LatchHeld)
    }
}
