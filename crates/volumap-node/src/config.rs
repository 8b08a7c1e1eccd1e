//! Node configuration – reads `volumap.toml`.
//!
//! Read once at startup; there is no hot reload.  The explicit reprojection
//! coefficients are optional: when absent (or malformed) calibration falls
//! back to deriving the matrix from camera intrinsics at runtime.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use volumap_types::MapError;

/// Startup configuration for the mapping node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Name of the fixed reference frame all observations are registered
    /// into.
    #[serde(default = "default_world_frame")]
    pub world_frame: String,

    /// Optional explicit 16-element row-major reprojection matrix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reprojection_coefficients: Option<Vec<f64>>,

    /// Expected full-frame image width in pixels.
    #[serde(default = "default_image_width")]
    pub full_image_width: u32,

    /// Expected full-frame image height in pixels.
    #[serde(default = "default_image_height")]
    pub full_image_height: u32,

    /// Periodic snapshot publication rate; 0 disables the timer.
    #[serde(default)]
    pub map_publish_frequency_hz: f64,

    /// Per-topic event bus capacity.
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,

    /// Optional recorded sensor log to replay instead of live input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replay_path: Option<PathBuf>,
}

fn default_world_frame() -> String {
    "world".to_string()
}
fn default_image_width() -> u32 {
    752
}
fn default_image_height() -> u32 {
    480
}
fn default_bus_capacity() -> usize {
    256
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            world_frame: default_world_frame(),
            reprojection_coefficients: None,
            full_image_width: default_image_width(),
            full_image_height: default_image_height(),
            map_publish_frequency_hz: 0.0,
            bus_capacity: default_bus_capacity(),
            replay_path: None,
        }
    }
}

/// Load the config from `path`.  Returns `None` if the file does not exist.
pub fn load_from(path: &Path) -> Result<Option<NodeConfig>, MapError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        MapError::Config(format!("failed to read config at {}: {e}", path.display()))
    })?;
    let mut cfg: NodeConfig =
        toml::from_str(&raw).map_err(|e| MapError::Config(format!("failed to parse config: {e}")))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `VOLUMAP_*` environment variable overrides to `cfg`.
///
/// Supported variables:
///
/// | Variable | Config field |
/// |---|---|
/// | `VOLUMAP_WORLD_FRAME` | `world_frame` |
/// | `VOLUMAP_PUBLISH_HZ` | `map_publish_frequency_hz` |
/// | `VOLUMAP_REPLAY` | `replay_path` |
pub fn apply_env_overrides(cfg: &mut NodeConfig) {
    if let Ok(v) = std::env::var("VOLUMAP_WORLD_FRAME") {
        cfg.world_frame = v;
    }
    if let Ok(v) = std::env::var("VOLUMAP_PUBLISH_HZ")
        && let Ok(hz) = v.parse::<f64>()
    {
        cfg.map_publish_frequency_hz = hz;
    }
    if let Ok(v) = std::env::var("VOLUMAP_REPLAY") {
        cfg.replay_path = Some(PathBuf::from(v));
    }
}
