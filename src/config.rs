//! Configuration System using Figment
//!
//! Strongly-typed configuration for the event builder. Configuration is loaded from:
//! 1. `config/event_builder.toml` (or a path given on the command line)
//! 2. Environment variables prefixed with `EVENT_BUILDER_`, nested keys split on `__`
//!
//! Every section has defaults matching the bench wiring, so an empty
//! (or missing) file yields a usable configuration.
//!
//! # Example
//! ```no_run
//! use event_builder::config::EventBuilderConfig;
//!
//! let config = EventBuilderConfig::load()?;
//! config.validate()?;
//! println!("{} nodes", config.lines.node_active.len());
//! # Ok::<(), event_builder::error::BuilderError>(())
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppResult, BuilderError};
use crate::node_config::CameraSettings;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/event_builder.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventBuilderConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Pin assignment for every logical line
    #[serde(default)]
    pub lines: LinesConfig,
    /// Poll cadences and pulse widths
    #[serde(default)]
    pub timing: TimingConfig,
    /// Values offered to the operator for a new event
    #[serde(default)]
    pub event: EventDefaults,
    /// Run directory layout
    #[serde(default)]
    pub storage: StorageConfig,
    /// Settings written into each node's config file
    #[serde(default)]
    pub camera: CameraSettings,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
        }
    }
}

/// Board pin numbers per line role. Node lists are indexed by node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinesConfig {
    /// Inputs: node is active
    #[serde(default = "default_node_active")]
    pub node_active: Vec<u8>,
    /// Outputs: event armed ("state com")
    #[serde(default = "default_node_arm")]
    pub node_arm: Vec<u8>,
    /// Outputs: trigger enable
    #[serde(default = "default_node_enable")]
    pub node_enable: Vec<u8>,
    /// Input: trigger latch
    #[serde(default = "default_latch")]
    pub latch: u8,
    /// Output: trigger reset
    #[serde(default = "default_reset")]
    pub reset: u8,
    /// Output: end-of-event marker
    #[serde(default = "default_end_event")]
    pub end_event: u8,
}

impl Default for LinesConfig {
    fn default() -> Self {
        Self {
            node_active: default_node_active(),
            node_arm: default_node_arm(),
            node_enable: default_node_enable(),
            latch: default_latch(),
            reset: default_reset(),
            end_event: default_end_event(),
        }
    }
}

/// Poll cadences and pulse widths, written as humantime strings ("10ms", "1s").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Readiness barrier poll interval
    #[serde(with = "humantime_serde", default = "default_ready_poll")]
    pub ready_poll: Duration,
    /// Readiness barrier poll budget
    #[serde(default = "default_ready_budget")]
    pub ready_budget: u32,
    /// Run loop tick
    #[serde(with = "humantime_serde", default = "default_run_tick")]
    pub run_tick: Duration,
    /// Drain barrier poll interval
    #[serde(with = "humantime_serde", default = "default_drain_poll")]
    pub drain_poll: Duration,
    /// Trigger reset pulse width
    #[serde(with = "humantime_serde", default = "default_reset_hold")]
    pub reset_hold: Duration,
    /// Single-shot trigger enable pulse width ("take image")
    #[serde(with = "humantime_serde", default = "default_enable_pulse_hold")]
    pub enable_pulse_hold: Duration,
    /// End-of-event marker pulse width
    #[serde(with = "humantime_serde", default = "default_end_marker_hold")]
    pub end_marker_hold: Duration,
    /// How often a drain that is still waiting repeats its warning
    #[serde(with = "humantime_serde", default = "default_drain_warn_after")]
    pub drain_warn_after: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            ready_poll: default_ready_poll(),
            ready_budget: default_ready_budget(),
            run_tick: default_run_tick(),
            drain_poll: default_drain_poll(),
            reset_hold: default_reset_hold(),
            enable_pulse_hold: default_enable_pulse_hold(),
            end_marker_hold: default_end_marker_hold(),
            drain_warn_after: default_drain_warn_after(),
        }
    }
}

/// Defaults offered to the operator, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDefaults {
    /// Seconds from run start to trigger enable
    #[serde(default = "default_trigger_enable_delay")]
    pub trigger_enable_delay: f64,
    /// Maximum event length in seconds
    #[serde(default = "default_max_duration")]
    pub max_duration: f64,
}

impl Default for EventDefaults {
    fn default() -> Self {
        Self {
            trigger_enable_delay: default_trigger_enable_delay(),
            max_duration: default_max_duration(),
        }
    }
}

/// Run directory layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root holding the per-day event directories
    #[serde(default = "default_data_root")]
    pub data_root: PathBuf,
    /// Directory (under the root) nodes write to outside an event
    #[serde(default = "default_dump_dir")]
    pub dump_dir: String,
    /// Symlink (under the root) the nodes follow to find the current event
    #[serde(default = "default_images_link")]
    pub images_link: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_root: default_data_root(),
            dump_dir: default_dump_dir(),
            images_link: default_images_link(),
        }
    }
}

// Default value functions
fn default_name() -> String {
    "Event Builder".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_node_active() -> Vec<u8> {
    vec![18, 36, 40]
}

fn default_node_arm() -> Vec<u8> {
    vec![11, 13, 15]
}

fn default_node_enable() -> Vec<u8> {
    vec![16, 32, 38]
}

fn default_latch() -> u8 {
    29
}

fn default_reset() -> u8 {
    22
}

fn default_end_event() -> u8 {
    31
}

fn default_ready_poll() -> Duration {
    Duration::from_millis(10)
}

fn default_ready_budget() -> u32 {
    100
}

fn default_run_tick() -> Duration {
    Duration::from_millis(10)
}

fn default_drain_poll() -> Duration {
    Duration::from_millis(5)
}

fn default_reset_hold() -> Duration {
    Duration::from_millis(10)
}

fn default_enable_pulse_hold() -> Duration {
    Duration::from_millis(10)
}

fn default_end_marker_hold() -> Duration {
    Duration::from_secs(1)
}

fn default_drain_warn_after() -> Duration {
    Duration::from_secs(10)
}

fn default_trigger_enable_delay() -> f64 {
    5.0
}

fn default_max_duration() -> f64 {
    10.0
}

fn default_data_root() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join("camera-data"))
        .unwrap_or_else(|| PathBuf::from("camera-data"))
}

fn default_dump_dir() -> String {
    "dump".to_string()
}

fn default_images_link() -> String {
    "Images".to_string()
}

impl EventBuilderConfig {
    /// Load configuration from the default file and environment variables
    ///
    /// Environment variables override the file with prefix `EVENT_BUILDER_`.
    /// Example: `EVENT_BUILDER_APPLICATION__LOG_LEVEL=debug`
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        Ok(Self::figment(path.as_ref()).extract()?)
    }

    fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("EVENT_BUILDER_").split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let invalid = |msg: String| Err(BuilderError::Configuration(msg));

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return invalid(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        let lines = &self.lines;
        let n = lines.node_active.len();
        if n == 0 {
            return invalid("At least one node must be configured".to_string());
        }
        if lines.node_arm.len() != n || lines.node_enable.len() != n {
            return invalid(format!(
                "Node line lists disagree: {} active, {} arm, {} enable",
                n,
                lines.node_arm.len(),
                lines.node_enable.len()
            ));
        }

        let mut pins = HashSet::new();
        let all_pins = lines
            .node_active
            .iter()
            .chain(&lines.node_arm)
            .chain(&lines.node_enable)
            .chain([&lines.latch, &lines.reset, &lines.end_event]);
        for pin in all_pins {
            if !pins.insert(*pin) {
                return invalid(format!("Pin {} is assigned to more than one line", pin));
            }
        }

        let timing = &self.timing;
        for (name, value) in [
            ("ready_poll", timing.ready_poll),
            ("run_tick", timing.run_tick),
            ("drain_poll", timing.drain_poll),
        ] {
            if value.is_zero() {
                return invalid(format!("timing.{} must be greater than zero", name));
            }
        }
        if timing.ready_budget == 0 {
            return invalid("timing.ready_budget must be at least 1".to_string());
        }

        for (name, value) in [
            ("trigger_enable_delay", self.event.trigger_enable_delay),
            ("max_duration", self.event.max_duration),
        ] {
            if !value.is_finite() || value < 0.0 {
                return invalid(format!("event.{} must be a non-negative number", name));
            }
        }

        if self.storage.dump_dir.is_empty() || self.storage.images_link.is_empty() {
            return invalid("storage.dump_dir and storage.images_link must be set".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = EventBuilderConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.timing.ready_budget, 100);
        assert_eq!(config.timing.drain_poll, Duration::from_millis(5));
    }

    #[test]
    #[serial]
    fn test_load_from_file_with_humantime() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [application]
            log_level = "debug"

            [lines]
            node_active = [1, 2]
            node_arm = [3, 4]
            node_enable = [5, 6]

            [timing]
            run_tick = "20ms"
            end_marker_hold = "250ms"
            "#
        )
        .unwrap();

        let config = EventBuilderConfig::load_from(file.path()).unwrap();
        assert_eq!(config.application.log_level, "debug");
        assert_eq!(config.lines.node_active, vec![1, 2]);
        assert_eq!(config.lines.latch, 29);
        assert_eq!(config.timing.run_tick, Duration::from_millis(20));
        assert_eq!(config.timing.end_marker_hold, Duration::from_millis(250));
        assert_eq!(config.timing.ready_poll, Duration::from_millis(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_missing_file_yields_defaults() {
        let config = EventBuilderConfig::load_from("does/not/exist.toml").unwrap();
        assert_eq!(config.lines, LinesConfig::default());
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        std::env::set_var("EVENT_BUILDER_EVENT__MAX_DURATION", "2.5");
        let config = EventBuilderConfig::load_from("does/not/exist.toml");
        std::env::remove_var("EVENT_BUILDER_EVENT__MAX_DURATION");

        assert_eq!(config.unwrap().event.max_duration, 2.5);
    }

    #[test]
    fn test_mismatched_node_lists() {
        let mut config = EventBuilderConfig::default();
        config.lines.node_enable.pop();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("disagree"));
    }

    #[test]
    fn test_duplicate_pins() {
        let mut config = EventBuilderConfig::default();
        config.lines.reset = config.lines.latch;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = EventBuilderConfig::default();
        config.application.log_level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_poll_rejected() {
        let mut config = EventBuilderConfig::default();
        config.timing.drain_poll = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
