//! camera-feed-core
//!
//! Platform-neutral core of a camera extension.
//! Tracks camera feeds, their formats and the camera permission, and turns
//! raw capture buffers into displayable images.
//!
//! ## Architecture
//!
//! Platform glue (PipeWire, Media Foundation, AVFoundation, Camera2) lives
//! outside this crate and talks to it through the traits in [`backend`].
//!
//! ### Modules
//!
//! - `video`: Pixel formats, buffer decoders and rotation
//! - `feed`: Feed state machine, frame delivery and the latest-frame slot
//! - `server`: Feed registry, permission state, process-wide lifecycle
//! - `backend`: Backend contract plus dummy and synthetic backends
//! - `config`: Runtime configuration
//!
//! ## Example
//!
//! ```rust
//! use camera_feed_core::video::{FormatDescriptor, Rotation, YuyvOrder};
//! use camera_feed_core::FeedBuilder;
//!
//! let feed = FeedBuilder::new("Webcam")
//!     .format(FormatDescriptor::yuyv(YuyvOrder::Yuy2, 4, 1, 30))
//!     .build();
//! feed.set_format(0).unwrap();
//! feed.activate().unwrap();
//!
//! // A backend would call this from its capture thread
//! assert!(feed.decode_frame(&[100, 128, 100, 128, 0, 128, 0, 128], Rotation::None));
//! assert_eq!(feed.latest_image().unwrap().width, 4);
//! ```

// Re-export commonly used types
pub use config::CameraConfig;
pub use error::{CameraError, Result};
pub use feed::{Feed, FeedBuilder, FeedEvent, FeedId, FeedPosition, FeedState, FrameSink};
pub use server::{CameraServer, ServerEvent};

// Public modules
pub mod backend;
pub mod config;
pub mod error;
pub mod feed;
pub mod server;
pub mod video;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
