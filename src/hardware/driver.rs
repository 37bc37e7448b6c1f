//! Line driver: the controller's only path to the digital lines.
//!
//! Wraps a [`DigitalLines`] backend with the line map and adds timed holds.
//! A pulse drives its line high immediately and records a release deadline;
//! the release happens when the owner calls [`LineDriver::service`] at or after
//! that deadline. Nothing here ever sleeps, so a one second end-of-event marker
//! does not stall the 10 ms run loop sharing the same scheduler.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::{Duration, Instant};
use tracing::{debug, trace};

use super::{DigitalLines, Line, LineMap};
use crate::error::{AppResult, BuilderError};

#[derive(Debug, Clone, Copy)]
struct DeferredPulse {
    line: Line,
    start: Instant,
    hold: Duration,
}

/// Adapter between the controller and a [`DigitalLines`] backend.
pub struct LineDriver {
    io: Arc<dyn DigitalLines>,
    map: LineMap,
    /// Lines currently held high, keyed to their release deadline.
    holds: BTreeMap<Line, Instant>,
    /// Pulses that have not started yet.
    deferred: Vec<DeferredPulse>,
}

impl LineDriver {
    /// Driver over `io` with nothing held.
    pub fn new(io: Arc<dyn DigitalLines>, map: LineMap) -> Self {
        Self {
            io,
            map,
            holds: BTreeMap::new(),
            deferred: Vec::new(),
        }
    }

    /// Line to pin mapping.
    pub fn map(&self) -> &LineMap {
        &self.map
    }

    /// Number of nodes wired.
    pub fn node_count(&self) -> usize {
        self.map.node_count()
    }

    /// Sample one line. Failures are fatal and carry the line name.
    pub async fn read(&self, line: Line) -> AppResult<bool> {
        self.io
            .read(line)
            .await
            .map_err(|e| BuilderError::line(line, e))
    }

    /// Sample every node's active line, in node order.
    pub async fn read_nodes(&self) -> AppResult<Vec<bool>> {
        let mut levels = Vec::with_capacity(self.node_count());
        for i in 0..self.node_count() {
            levels.push(self.read(Line::NodeActive(i)).await?);
        }
        Ok(levels)
    }

    /// Drive a line. An explicit write cancels any hold on the same line.
    pub async fn write(&mut self, line: Line, level: bool) -> AppResult<()> {
        self.holds.remove(&line);
        trace!(%line, level, pin = ?self.map.pin(line), "write");
        self.io
            .write(line, level)
            .await
            .map_err(|e| BuilderError::line(line, e))
    }

    /// Drive several lines to the same level.
    pub async fn write_all<I>(&mut self, lines: I, level: bool) -> AppResult<()>
    where
        I: IntoIterator<Item = Line>,
    {
        for line in lines {
            self.write(line, level).await?;
        }
        Ok(())
    }

    /// Drive `line` high now and release it `hold` later.
    ///
    /// Pulsing a line that is already held extends the hold rather than
    /// producing a second edge.
    pub async fn pulse(&mut self, line: Line, hold: Duration, now: Instant) -> AppResult<()> {
        let release = now + hold;
        if let Some(existing) = self.holds.get_mut(&line) {
            if release > *existing {
                *existing = release;
            }
            debug!(%line, ?hold, "pulse extended");
            return Ok(());
        }
        self.write(line, true).await?;
        self.holds.insert(line, release);
        debug!(%line, ?hold, "pulse started");
        Ok(())
    }

    /// Schedule a pulse to start `delay` from `now`.
    pub fn pulse_after(&mut self, line: Line, delay: Duration, hold: Duration, now: Instant) {
        self.deferred.push(DeferredPulse {
            line,
            start: now + delay,
            hold,
        });
    }

    /// Start deferred pulses and release holds that are due at `now`.
    pub async fn service(&mut self, now: Instant) -> AppResult<()> {
        let due: Vec<Line> = self
            .holds
            .iter()
            .filter(|(_, release)| **release <= now)
            .map(|(line, _)| *line)
            .collect();
        for line in due {
            self.write(line, false).await?;
            debug!(%line, "pulse released");
        }

        self.deferred.sort_by_key(|p| p.start);
        while let Some(next) = self.deferred.first().copied() {
            if next.start > now {
                break;
            }
            self.deferred.remove(0);
            self.pulse(next.line, next.hold, next.start).await?;
        }
        Ok(())
    }

    /// Earliest pending hold release or deferred pulse start.
    pub fn next_deadline(&self) -> Option<Instant> {
        let release = self.holds.values().min().copied();
        let start = self.deferred.iter().map(|p| p.start).min();
        match (release, start) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Whether `line` is high on a pulse hold.
    pub fn is_held(&self, line: Line) -> bool {
        self.holds.contains_key(&line)
    }

    /// Whether any hold or deferred pulse is still outstanding.
    pub fn is_busy(&self) -> bool {
        !self.holds.is_empty() || !self.deferred.is_empty()
    }

    /// Drop all pending holds and drive every output low.
    ///
    /// Safe to call repeatedly; a second call leaves every level unchanged.
    pub async fn reset_outputs(&mut self) -> AppResult<()> {
        self.holds.clear();
        self.deferred.clear();
        let outputs = self.map.outputs();
        self.write_all(outputs, false).await
    }
}
