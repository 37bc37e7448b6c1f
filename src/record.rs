//! Event record writer.
//!
//! Each sealed run is written once into its run directory as `info.txt`
//! (read by people at the bench) and `event.json` (read by tools).
//! `info.txt` is created exclusively: if the file is already there the
//! record is refused rather than overwritten.

use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::AppResult;
use crate::event::{CompletedEvent, EndReasons, NodeStatus};

/// Human-readable record, one per run directory.
pub const INFO_FILE: &str = "info.txt";
/// Machine-readable record, one per run directory.
pub const JSON_FILE: &str = "event.json";

/// Persisted metadata for one completed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Run identifier
    pub run_id: Uuid,
    /// Day directory name, `YYYYMMDD`
    pub date: String,
    /// Event index within the day
    pub index: usize,
    /// Run directory
    pub directory: PathBuf,
    /// Wall clock time the run was sealed, `HH:MM:SS`
    pub time_saved: String,
    /// Configured delay to trigger enable
    #[serde(with = "humantime_serde")]
    pub trigger_enable_delay: Duration,
    /// Configured maximum length
    #[serde(with = "humantime_serde")]
    pub max_duration: Duration,
    /// Actual length
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
    /// End reason labels
    pub end_reasons: Vec<String>,
    /// 0-based node indices low on the deciding tick
    pub inactive_nodes: Vec<usize>,
    /// Whether the trigger enable went out
    pub trigger_enabled: bool,
    /// Final node status
    pub nodes: Vec<NodeStatus>,
}

impl EventRecord {
    /// Record for a sealed run and its session.
    pub fn from_completed(event: &CompletedEvent) -> Self {
        let run = &event.run;
        Self {
            run_id: run.id,
            date: event.session.date.clone(),
            index: event.session.index,
            directory: event.session.directory.clone(),
            time_saved: run.ended_at.format("%H:%M:%S").to_string(),
            trigger_enable_delay: run.config.trigger_enable_delay(),
            max_duration: run.config.max_duration(),
            elapsed: run.elapsed,
            end_reasons: run
                .end_reasons
                .labels()
                .into_iter()
                .map(str::to_string)
                .collect(),
            inactive_nodes: run.inactive_nodes.clone(),
            trigger_enabled: run.trigger_enabled,
            nodes: event.nodes.clone(),
        }
    }

    fn reasons(&self) -> EndReasons {
        let mut reasons = EndReasons::empty();
        for label in &self.end_reasons {
            reasons |= match label.as_str() {
                "MaxTimeExceeded" => EndReasons::MAX_TIME_EXCEEDED,
                "ManualTrigger" => EndReasons::MANUAL_TRIGGER,
                "NodeInactive" => EndReasons::NODE_INACTIVE,
                "LatchTriggered" => EndReasons::LATCH_TRIGGERED,
                _ => EndReasons::empty(),
            };
        }
        reasons
    }

    /// The `info.txt` body.
    pub fn to_info_text(&self) -> String {
        let reasons = self.reasons();
        let mut end = String::new();
        if reasons.contains(EndReasons::MAX_TIME_EXCEEDED) {
            end.push_str("Exceeded max time; ");
        }
        if reasons.contains(EndReasons::MANUAL_TRIGGER) {
            end.push_str("Man_Trigger button pressed; ");
        }
        if reasons.contains(EndReasons::NODE_INACTIVE) {
            end.push_str("Camera(s) ");
            for node in &self.inactive_nodes {
                end.push_str(&format!("{} ", node + 1));
            }
            end.push_str("were inactive; ");
        }
        if reasons.contains(EndReasons::LATCH_TRIGGERED) {
            end.push_str("Trigger_latch was enabled");
        }

        format!(
            "Date: {}\nEvent: {}\nTime Saved: {}\nTrigger Enable Time: {}\nMax Time: {}\nEvent Time: {:.4}\nEnd condition: {}\n",
            self.date,
            self.index,
            self.time_saved,
            self.trigger_enable_delay.as_secs_f64(),
            self.max_duration.as_secs_f64(),
            self.elapsed.as_secs_f64(),
            end.trim_end(),
        )
    }

    /// Write both files into `dir`.
    pub fn write_to(&self, dir: &Path) -> AppResult<()> {
        let mut info = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(dir.join(INFO_FILE))?;
        info.write_all(self.to_info_text().as_bytes())?;

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(dir.join(JSON_FILE), json)?;
        Ok(())
    }
}

/// Consumes completed events from the controller and writes their records.
pub struct RecordWriter {
    rx: mpsc::Receiver<CompletedEvent>,
    written: usize,
}

impl RecordWriter {
    /// Writer draining `rx` until every sender is gone.
    pub fn new(rx: mpsc::Receiver<CompletedEvent>) -> Self {
        Self { rx, written: 0 }
    }

    /// Write records until the controller drops its sender.
    ///
    /// A record that cannot be written is logged and skipped; the event it
    /// describes is already over. Returns the number of records written.
    pub async fn run(mut self) -> usize {
        while let Some(event) = self.rx.recv().await {
            let record = EventRecord::from_completed(&event);
            match record.write_to(&event.session.directory) {
                Ok(()) => {
                    self.written += 1;
                    info!(
                        run_id = %record.run_id,
                        directory = %record.directory.display(),
                        "event record saved"
                    );
                }
                Err(e) => error!(run_id = %record.run_id, error = %e, "failed to save event record"),
            }
        }
        self.written
    }
}
