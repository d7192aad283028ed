//! Runtime configuration
//!
//! Loaded from JSON by the host, or built in code from [`CameraConfig::default`].
//!
//! ```json
//! {
//!   "yuyv_output": "grayscale",
//!   "feed_event_capacity": 16,
//!   "server_event_capacity": 32
//! }
//! ```

use crate::error::{CameraError, Result};
use crate::video::YuyvOutput;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Default capacity of each feed's event channel
pub const DEFAULT_FEED_EVENT_CAPACITY: usize = 16;

/// Default capacity of the server event channel
pub const DEFAULT_SERVER_EVENT_CAPACITY: usize = 32;

/// Configuration for the camera server and the feeds it registers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// What packed 4:2:2 formats decode to
    pub yuyv_output: YuyvOutput,
    /// Per-feed event channel capacity (lagging receivers skip old events)
    pub feed_event_capacity: usize,
    /// Server event channel capacity
    pub server_event_capacity: usize,
    /// Override the synthetic backend's frame pacing; `None` follows the
    /// selected format's frame interval
    pub synthetic_frame_interval_ms: Option<u64>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            yuyv_output: YuyvOutput::Rgb,
            feed_event_capacity: DEFAULT_FEED_EVENT_CAPACITY,
            server_event_capacity: DEFAULT_SERVER_EVENT_CAPACITY,
            synthetic_frame_interval_ms: None,
        }
    }
}

impl CameraConfig {
    /// Luma-only decoding for packed 4:2:2 formats
    pub fn grayscale() -> Self {
        Self {
            yuyv_output: YuyvOutput::Grayscale,
            ..Default::default()
        }
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading camera config");
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Check invariants serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.feed_event_capacity == 0 {
            return Err(CameraError::config("feed_event_capacity must be greater than 0"));
        }
        if self.server_event_capacity == 0 {
            return Err(CameraError::config("server_event_capacity must be greater than 0"));
        }
        if self.synthetic_frame_interval_ms == Some(0) {
            return Err(CameraError::config("synthetic_frame_interval_ms must be greater than 0"));
        }
        Ok(())
    }
}
