//! Mock digital lines
//!
//! In-memory line levels for tests and the simulator. Inputs can be set from
//! the outside (standing in for the nodes and the latch hardware), every write
//! is recorded, and individual lines can be made to fail.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::{DigitalLines, Line};

#[derive(Default)]
struct MockState {
    levels: HashMap<Line, bool>,
    writes: Vec<(Line, bool)>,
    failing: HashSet<Line>,
}

/// Shared in-memory line bank.
///
/// Cloning yields another handle onto the same levels, so a test can keep one
/// handle while the controller owns another.
///
/// # Example
///
/// ```rust,ignore
/// let lines = MockLines::new();
/// lines.set_nodes(3, true);
/// assert!(lines.read(Line::NodeActive(2)).await?);
/// ```
#[derive(Clone, Default)]
pub struct MockLines {
    state: Arc<RwLock<MockState>>,
}

impl MockLines {
    /// Create a bank with every line low.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the level of any line, bypassing the write log.
    pub fn set(&self, line: Line, level: bool) {
        self.state.write().levels.insert(line, level);
    }

    /// Set the active line of nodes `0..count`.
    pub fn set_nodes(&self, count: usize, level: bool) {
        let mut state = self.state.write();
        for i in 0..count {
            state.levels.insert(Line::NodeActive(i), level);
        }
    }

    /// Current level of a line (low if never set).
    pub fn level(&self, line: Line) -> bool {
        self.state.read().levels.get(&line).copied().unwrap_or(false)
    }

    /// Every write issued through [`DigitalLines::write`], in order.
    pub fn writes(&self) -> Vec<(Line, bool)> {
        self.state.read().writes.clone()
    }

    /// Writes to a single line, in order.
    pub fn writes_to(&self, line: Line) -> Vec<bool> {
        self.state
            .read()
            .writes
            .iter()
            .filter(|(l, _)| *l == line)
            .map(|(_, level)| *level)
            .collect()
    }

    /// Number of low-to-high transitions written to a line.
    pub fn rising_edges(&self, line: Line) -> usize {
        let mut last = false;
        let mut edges = 0;
        for level in self.writes_to(line) {
            if level && !last {
                edges += 1;
            }
            last = level;
        }
        edges
    }

    /// Forget the write history.
    pub fn clear_writes(&self) {
        self.state.write().writes.clear();
    }

    /// Make every access to `line` fail.
    pub fn fail(&self, line: Line) {
        self.state.write().failing.insert(line);
    }
}

#[async_trait]
impl DigitalLines for MockLines {
    async fn read(&self, line: Line) -> Result<bool> {
        let state = self.state.read();
        if state.failing.contains(&line) {
            return Err(anyhow!("injected failure reading {line}"));
        }
        Ok(state.levels.get(&line).copied().unwrap_or(false))
    }

    async fn write(&self, line: Line, level: bool) -> Result<()> {
        if !line.is_output() {
            bail!("{line} is an input");
        }
        let mut state = self.state.write();
        if state.failing.contains(&line) {
            bail!("injected failure driving {line}");
        }
        state.levels.insert(line, level);
        state.writes.push((line, level));
        Ok(())
    }
}
