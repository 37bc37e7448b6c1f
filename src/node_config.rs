//! Per-node camera configuration files.
//!
//! Each node reads `cam<i>-config.json` from the shared mount at start-up. All
//! nodes share the operator's acquisition settings; only the camera name and
//! config path differ. The remaining keys are fixed by the node software.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::AppResult;

/// Mount point of the controller's data root as seen from the nodes.
const NODE_MOUNT: &str = "/mnt/event-builder";

/// Operator-adjustable acquisition settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraSettings {
    /// Exposure setting passed to the camera
    #[serde(default = "default_exposure")]
    pub exposure: u32,
    /// Frames kept in the node's ring buffer
    #[serde(default = "default_buffer_len")]
    pub buffer_len: u32,
    /// Frames saved after the trigger
    #[serde(default = "default_frames_after")]
    pub frames_after: u32,
    /// ADC threshold of the node's trigger detection
    #[serde(default = "default_adc_threshold")]
    pub adc_threshold: u32,
    /// Pixel-count threshold of the node's trigger detection
    #[serde(default = "default_pix_threshold")]
    pub pix_threshold: u32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            exposure: default_exposure(),
            buffer_len: default_buffer_len(),
            frames_after: default_frames_after(),
            adc_threshold: default_adc_threshold(),
            pix_threshold: default_pix_threshold(),
        }
    }
}

fn default_exposure() -> u32 {
    300
}

fn default_buffer_len() -> u32 {
    100
}

fn default_frames_after() -> u32 {
    50
}

fn default_adc_threshold() -> u32 {
    10
}

fn default_pix_threshold() -> u32 {
    300
}

/// Node-side input pins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInputPins {
    /// Arm line from the controller
    pub state_com: u8,
    /// Trigger enable from the controller
    pub trig_en: u8,
    /// Shared trigger latch
    pub trig_latch: u8,
}

/// Node-side output pins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeOutputPins {
    /// Active line read by the controller
    pub state: u8,
    /// Trigger output that sets the latch
    pub trig: u8,
}

/// The document a node loads at start-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// See [`CameraSettings::exposure`]
    pub exposure: u32,
    /// Sensor width and height
    pub resolution: [u32; 2],
    /// Hardware frame sync between cameras
    pub frame_sync: bool,
    /// Sensor mode
    pub mode: u32,
    /// See [`CameraSettings::buffer_len`]
    pub buffer_len: u32,
    /// See [`CameraSettings::frames_after`]
    pub frames_after: u32,
    /// See [`CameraSettings::adc_threshold`]
    pub adc_threshold: u32,
    /// See [`CameraSettings::pix_threshold`]
    pub pix_threshold: u32,
    /// Where the node writes images (the images link)
    pub save_path: String,
    /// Where the node reads this file
    pub config_path: String,
    /// `cam<i>`
    pub cam_name: String,
    /// Image file extension
    pub image_format: String,
    /// strftime pattern for image file names
    pub date_format: String,
    /// Pins the node reads
    pub input_pins: NodeInputPins,
    /// Pins the node drives
    pub output_pins: NodeOutputPins,
}

impl NodeConfig {
    /// Build the config document for node `node`.
    pub fn for_node(node: usize, settings: &CameraSettings) -> Self {
        Self {
            exposure: settings.exposure,
            resolution: [1280, 800],
            frame_sync: true,
            mode: 11,
            buffer_len: settings.buffer_len,
            frames_after: settings.frames_after,
            adc_threshold: settings.adc_threshold,
            pix_threshold: settings.pix_threshold,
            save_path: format!("{NODE_MOUNT}/Images/"),
            config_path: format!("{NODE_MOUNT}/cam{node}-config.json"),
            cam_name: format!("cam{node}"),
            image_format: ".bmp".to_string(),
            date_format: "%Y-%m-%d_%H:%M:%S".to_string(),
            input_pins: NodeInputPins {
                state_com: 5,
                trig_en: 6,
                trig_latch: 13,
            },
            output_pins: NodeOutputPins { state: 23, trig: 24 },
        }
    }
}

/// File name of node `node`'s config.
pub fn config_file_name(node: usize) -> String {
    format!("cam{node}-config.json")
}

/// Write (or overwrite) the config file of every node under `dir`.
pub fn write_node_configs(
    dir: &Path,
    settings: &CameraSettings,
    node_count: usize,
) -> AppResult<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::with_capacity(node_count);
    for node in 0..node_count {
        let path = dir.join(config_file_name(node));
        let json = serde_json::to_string_pretty(&NodeConfig::for_node(node, settings))
            .map_err(std::io::Error::from)?;
        fs::write(&path, json)?;
        written.push(path);
    }
    info!(count = node_count, dir = %dir.display(), "node configs written");
    Ok(written)
}
