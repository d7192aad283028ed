//! Backend for hosts without camera support
//!
//! Permission is always granted and streams start without ever producing a
//! buffer.

use super::{CaptureBackend, PermissionState, StreamBackend};
use crate::feed::{Feed, FeedBuilder, FrameSink};
use crate::video::FormatDescriptor;
use std::sync::Arc;
use tracing::debug;

/// Name of the placeholder feed
pub const DUMMY_FEED_NAME: &str = "Dummy Camera";

/// Permission backend that always grants
#[derive(Debug, Clone, Copy, Default)]
pub struct DummyBackend;

impl CaptureBackend for DummyBackend {
    fn query_permission(&self) -> PermissionState {
        PermissionState::Granted
    }

    fn request_permission_async(&self) {
        debug!("dummy backend: permission request ignored");
    }
}

/// Stream backend that accepts every format and never delivers
#[derive(Debug, Clone, Copy, Default)]
pub struct DummyStream;

impl StreamBackend for DummyStream {
    fn start_stream(&self, format: &FormatDescriptor, _sink: FrameSink) -> bool {
        debug!(%format, "dummy stream started");
        true
    }

    fn stop_stream(&self) {
        debug!("dummy stream stopped");
    }
}

/// Placeholder feed with no formats
pub fn dummy_feed() -> Arc<Feed> {
    FeedBuilder::new(DUMMY_FEED_NAME)
        .backend(Arc::new(DummyStream))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::FeedState;

    #[test]
    fn test_dummy_backend_grants() {
        let backend = DummyBackend;
        assert_eq!(backend.query_permission(), PermissionState::Granted);
        backend.request_permission_async();
    }

    #[test]
    fn test_dummy_feed_cannot_activate_without_format() {
        let feed = dummy_feed();
        assert_eq!(feed.name(), DUMMY_FEED_NAME);
        assert!(feed.formats().is_empty());
        assert!(feed.activate().is_err());
        assert_eq!(feed.state(), FeedState::Idle);
    }
}
