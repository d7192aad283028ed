//! Capture backend contract
//!
//! The platform glue (PipeWire, Media Foundation, AVFoundation, Camera2) is
//! not part of this crate. A platform backend implements the two traits
//! below and is chosen at build time; only one is ever compiled in.
//!
//! ```text
//! Backend → core:  FeedBuilder::format          (format discovered)
//!                  FrameSink::deliver / push     (buffer captured)
//!                  CameraServer::on_device_removed
//!                  CameraServer::on_permission_result
//! Core → backend:  StreamBackend::start_stream / stop_stream
//!                  CaptureBackend::query_permission / request_permission_async
//! ```
//!
//! Two implementations ship here: [`dummy`] for hosts without camera
//! support and [`synthetic`], which streams generated test patterns.

pub mod dummy;
pub mod synthetic;

use crate::feed::FrameSink;
use crate::video::FormatDescriptor;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Camera permission as seen by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    /// Not asked yet
    #[default]
    Unknown,
    /// User or OS refused
    Denied,
    /// Capture may start
    Granted,
    /// Request in flight; the answer arrives as a notification
    Pending,
}

impl fmt::Display for PermissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionState::Unknown => write!(f, "unknown"),
            PermissionState::Denied => write!(f, "denied"),
            PermissionState::Granted => write!(f, "granted"),
            PermissionState::Pending => write!(f, "pending"),
        }
    }
}

/// Server-level half of a platform backend
pub trait CaptureBackend: Send + Sync {
    /// Current OS permission, without prompting.
    ///
    /// Called with the server's permission lock held; must not call back
    /// into the server.
    fn query_permission(&self) -> PermissionState;

    /// Start an asynchronous permission prompt and return immediately.
    ///
    /// The answer is reported later through
    /// [`CameraServer::on_permission_result`](crate::server::CameraServer::on_permission_result).
    fn request_permission_async(&self);
}

/// Per-feed half of a platform backend
pub trait StreamBackend: Send + Sync {
    /// Begin streaming `format`, delivering buffers through `sink`.
    ///
    /// Returns `false` if the device refused the format or is gone.
    fn start_stream(&self, format: &FormatDescriptor, sink: FrameSink) -> bool;

    /// Stop streaming.
    ///
    /// Must not return until no buffer callback can reach the sink any
    /// more: the feed drops its decoder right after this call.
    fn stop_stream(&self);
}
