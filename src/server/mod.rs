//! Camera Server
//!
//! Registry of the feeds a backend discovered, plus the camera permission
//! state. One server exists per process between [`init`] and [`shutdown`];
//! [`CameraServer::new`] builds a standalone instance for embedding and
//! tests.
//!
//! ## Example
//!
//! ```rust
//! use camera_feed_core::backend::dummy::DummyBackend;
//! use camera_feed_core::config::CameraConfig;
//! use camera_feed_core::server::{CameraServer, ServerEvent};
//! use std::sync::Arc;
//!
//! let server = CameraServer::new(Arc::new(DummyBackend), CameraConfig::default());
//! let mut events = server.subscribe();
//!
//! let feed = server.feed_builder("Integrated Camera").build();
//! let id = feed.id();
//! server.add_feed(feed).unwrap();
//!
//! assert_eq!(events.try_recv().unwrap(), ServerEvent::FeedAdded(id));
//! assert!(server.request_permission());
//! ```

use crate::backend::{CaptureBackend, PermissionState};
use crate::config::CameraConfig;
use crate::error::{CameraError, Result};
use crate::feed::{lock, Feed, FeedBuilder, FeedId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Notification emitted by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerEvent {
    /// A feed was registered
    FeedAdded(FeedId),
    /// A feed was unregistered and deactivated
    FeedRemoved(FeedId),
    /// Answer to an asynchronous permission request
    PermissionResult(bool),
}

/// Feed registry and permission state
pub struct CameraServer {
    backend: Arc<dyn CaptureBackend>,
    config: CameraConfig,
    feeds: RwLock<Vec<Arc<Feed>>>,
    permission: Mutex<PermissionState>,
    events: broadcast::Sender<ServerEvent>,
    shut_down: AtomicBool,
}

impl CameraServer {
    /// Create a server with no feeds and unknown permission
    pub fn new(backend: Arc<dyn CaptureBackend>, config: CameraConfig) -> Self {
        let (events, _) = broadcast::channel(config.server_event_capacity.max(1));
        Self {
            backend,
            config,
            feeds: RwLock::new(Vec::new()),
            permission: Mutex::new(PermissionState::Unknown),
            events,
            shut_down: AtomicBool::new(false),
        }
    }

    /// Configuration this server was created with
    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    /// Feed builder carrying this server's decode and channel settings
    pub fn feed_builder(&self, name: impl Into<String>) -> FeedBuilder {
        FeedBuilder::new(name).config(&self.config)
    }

    /// Register a feed
    ///
    /// Returns `Ok(false)` and leaves the registry unchanged when the feed,
    /// or another feed for the same device, is already registered.
    pub fn add_feed(&self, feed: Arc<Feed>) -> Result<bool> {
        if self.is_shut_down() {
            return Err(CameraError::invalid_state("server is shut down"));
        }

        let mut feeds = self.feeds.write().unwrap_or_else(PoisonError::into_inner);
        let duplicate = feeds.iter().any(|f| {
            f.id() == feed.id() || (feed.device_id().is_some() && f.device_id() == feed.device_id())
        });
        if duplicate {
            debug!(feed = %feed.id(), device = ?feed.device_id(), "feed already registered");
            return Ok(false);
        }

        let id = feed.id();
        info!(feed = %id, name = %feed.name(), position = ?feed.position(), "feed added");
        feeds.push(feed);
        drop(feeds);

        let _ = self.events.send(ServerEvent::FeedAdded(id));
        Ok(true)
    }

    /// Unregister a feed, deactivating it first
    pub fn remove_feed(&self, id: FeedId) -> Result<Arc<Feed>> {
        let feed = {
            let mut feeds = self.feeds.write().unwrap_or_else(PoisonError::into_inner);
            let index = feeds
                .iter()
                .position(|f| f.id() == id)
                .ok_or(CameraError::FeedNotFound(id))?;
            feeds.remove(index)
        };

        feed.deactivate();
        info!(feed = %id, name = %feed.name(), "feed removed");
        let _ = self.events.send(ServerEvent::FeedRemoved(id));
        Ok(feed)
    }

    /// Backend notification that a device disappeared
    pub fn on_device_removed(&self, id: FeedId) -> bool {
        match self.remove_feed(id) {
            Ok(_) => true,
            Err(e) => {
                warn!(feed = %id, error = %e, "removal of unknown device");
                false
            }
        }
    }

    /// Registered feeds in registration order
    pub fn feeds(&self) -> Vec<Arc<Feed>> {
        self.feeds.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Registered feed with `id`
    pub fn feed(&self, id: FeedId) -> Option<Arc<Feed>> {
        self.feeds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|f| f.id() == id)
            .cloned()
    }

    /// Look a feed up by its backend device identifier
    pub fn feed_by_device_id(&self, device_id: &str) -> Option<Arc<Feed>> {
        self.feeds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|f| f.device_id() == Some(device_id))
            .cloned()
    }

    /// Number of registered feeds
    pub fn feed_count(&self) -> usize {
        self.feeds.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Ask for camera permission
    ///
    /// Returns `true` right away if permission is already granted.
    /// Otherwise starts an asynchronous prompt (unless one is in flight) and
    /// returns `false`; the answer arrives as
    /// [`ServerEvent::PermissionResult`].
    pub fn request_permission(&self) -> bool {
        let mut permission = lock(&self.permission);
        if *permission == PermissionState::Unknown {
            *permission = self.backend.query_permission();
            debug!(state = %*permission, "queried camera permission");
        }

        match *permission {
            PermissionState::Granted => return true,
            PermissionState::Pending => {
                debug!("permission request already pending");
                return false;
            }
            PermissionState::Unknown | PermissionState::Denied => {
                *permission = PermissionState::Pending;
            }
        }
        drop(permission);

        info!("requesting camera permission");
        self.backend.request_permission_async();
        false
    }

    /// Whether capture is allowed, without prompting
    pub fn permission_granted(&self) -> bool {
        let mut permission = lock(&self.permission);
        if *permission == PermissionState::Unknown {
            *permission = self.backend.query_permission();
        }
        *permission == PermissionState::Granted
    }

    /// Last known permission state
    pub fn permission_state(&self) -> PermissionState {
        *lock(&self.permission)
    }

    /// Backend notification carrying the user's answer
    pub fn on_permission_result(&self, granted: bool) {
        {
            let mut permission = lock(&self.permission);
            *permission = if granted {
                PermissionState::Granted
            } else {
                PermissionState::Denied
            };
        }
        info!(granted, "camera permission result");
        let _ = self.events.send(ServerEvent::PermissionResult(granted));
    }

    /// Receive server events
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    /// Whether [`CameraServer::shutdown`] has run
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Deactivate and release every feed, newest first
    ///
    /// Further [`CameraServer::add_feed`] calls fail. Idempotent.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        let feeds = {
            let mut feeds = self.feeds.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *feeds)
        };
        info!(feeds = feeds.len(), "shutting down camera server");
        for feed in feeds.into_iter().rev() {
            feed.deactivate();
            debug!(feed = %feed.id(), name = %feed.name(), "feed released");
            let _ = self.events.send(ServerEvent::FeedRemoved(feed.id()));
        }
    }
}

impl Drop for CameraServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

enum Lifecycle {
    Uninitialized,
    Running(Arc<CameraServer>),
    ShutDown,
}

static SERVER: Mutex<Lifecycle> = Mutex::new(Lifecycle::Uninitialized);

/// Create the process-wide server
///
/// Fails with [`CameraError::InvalidState`] if a server is running or has
/// already been shut down.
pub fn init(backend: Arc<dyn CaptureBackend>, config: CameraConfig) -> Result<Arc<CameraServer>> {
    config.validate()?;

    let mut lifecycle = lock(&SERVER);
    match &*lifecycle {
        Lifecycle::Running(_) => {
            Err(CameraError::invalid_state("camera server already initialized"))
        }
        Lifecycle::ShutDown => Err(CameraError::invalid_state("camera server was shut down")),
        Lifecycle::Uninitialized => {
            let server = Arc::new(CameraServer::new(backend, config));
            *lifecycle = Lifecycle::Running(Arc::clone(&server));
            info!("camera server initialized");
            Ok(server)
        }
    }
}

/// The process-wide server, if running
pub fn get() -> Option<Arc<CameraServer>> {
    match &*lock(&SERVER) {
        Lifecycle::Running(server) => Some(Arc::clone(server)),
        _ => None,
    }
}

/// Tear the process-wide server down; returns `false` if none was running
pub fn shutdown() -> bool {
    let server = {
        let mut lifecycle = lock(&SERVER);
        match std::mem::replace(&mut *lifecycle, Lifecycle::ShutDown) {
            Lifecycle::Running(server) => server,
            previous => {
                *lifecycle = previous;
                return false;
            }
        }
    };

    server.shutdown();
    info!("camera server shut down");
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;
    use crate::backend::StreamBackend;
    use crate::feed::{FeedState, FrameSink};
    use crate::video::{FormatDescriptor, YuyvOrder};
    use std::sync::atomic::AtomicUsize;

    /// Permission backend answering queries from a fixed state
    struct PromptBackend {
        initial: PermissionState,
        prompts: AtomicUsize,
    }

    impl PromptBackend {
        fn new(initial: PermissionState) -> Self {
            Self {
                initial,
                prompts: AtomicUsize::new(0),
            }
        }
    }

    impl CaptureBackend for PromptBackend {
        fn query_permission(&self) -> PermissionState {
            self.initial
        }

        fn request_permission_async(&self) {
            self.prompts.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Records the order feeds are stopped in
    struct OrderStream {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl StreamBackend for OrderStream {
        fn start_stream(&self, _format: &FormatDescriptor, _sink: FrameSink) -> bool {
            true
        }

        fn stop_stream(&self) {
            lock(&self.log).push(self.name);
        }
    }

    fn server() -> CameraServer {
        CameraServer::new(Arc::new(DummyBackend), CameraConfig::default())
    }

    fn active_feed(
        server: &CameraServer,
        name: &'static str,
        log: &Arc<Mutex<Vec<&'static str>>>,
    ) -> Arc<Feed> {
        let feed = server
            .feed_builder(name)
            .format(FormatDescriptor::yuyv(YuyvOrder::Yuy2, 2, 2, 30))
            .backend(Arc::new(OrderStream {
                name,
                log: Arc::clone(log),
            }))
            .build();
        feed.set_format(0).unwrap();
        feed.activate().unwrap();
        feed
    }

    #[test]
    fn test_add_and_lookup() {
        let server = server();
        let a = server.feed_builder("a").device_id("42").build();
        let b = server.feed_builder("b").build();
        let (a_id, b_id) = (a.id(), b.id());

        assert!(server.add_feed(a.clone()).unwrap());
        assert!(server.add_feed(b).unwrap());
        assert!(!server.add_feed(a).unwrap());

        let ids: Vec<_> = server.feeds().iter().map(|f| f.id()).collect();
        assert_eq!(ids, vec![a_id, b_id]);
        assert_eq!(server.feed(b_id).unwrap().name(), "b");
        assert_eq!(server.feed_by_device_id("42").unwrap().id(), a_id);
    }

    #[test]
    fn test_duplicate_device_ignored() {
        let server = server();
        server.add_feed(server.feed_builder("first").device_id("dev").build()).unwrap();
        let added = server
            .add_feed(server.feed_builder("second").device_id("dev").build())
            .unwrap();
        assert!(!added);
        assert_eq!(server.feed_count(), 1);
    }

    #[test]
    fn test_remove_deactivates() {
        let server = server();
        let log = Arc::new(Mutex::new(Vec::new()));
        let feed = active_feed(&server, "cam", &log);
        let id = feed.id();
        server.add_feed(feed).unwrap();
        let mut events = server.subscribe();

        let removed = server.remove_feed(id).unwrap();
        assert_eq!(removed.state(), FeedState::Configured);
        assert_eq!(*lock(&log), vec!["cam"]);
        assert_eq!(events.try_recv().unwrap(), ServerEvent::FeedRemoved(id));

        assert!(matches!(server.remove_feed(id), Err(CameraError::FeedNotFound(_))));
        assert!(!server.on_device_removed(id));
    }

    #[test]
    fn test_device_removed_deactivates_known_feed() {
        let server = server();
        let log = Arc::new(Mutex::new(Vec::new()));
        let feed = active_feed(&server, "cam", &log);
        let id = feed.id();
        server.add_feed(Arc::clone(&feed)).unwrap();
        let mut events = server.subscribe();

        assert!(server.on_device_removed(id));
        assert_eq!(*lock(&log), vec!["cam"]);
        assert_eq!(feed.state(), FeedState::Configured);
        assert_eq!(server.feed_count(), 0);
        assert!(server.feed(id).is_none());
        assert_eq!(events.try_recv().unwrap(), ServerEvent::FeedRemoved(id));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_shutdown_reverse_order() {
        let server = server();
        let log = Arc::new(Mutex::new(Vec::new()));
        for name in ["first", "second", "third"] {
            server.add_feed(active_feed(&server, name, &log)).unwrap();
        }

        server.shutdown();
        assert_eq!(*lock(&log), vec!["third", "second", "first"]);
        assert_eq!(server.feed_count(), 0);
        assert!(server.is_shut_down());

        let late = server.feed_builder("late").build();
        assert!(matches!(server.add_feed(late), Err(CameraError::InvalidState(_))));

        server.shutdown();
        assert_eq!(lock(&log).len(), 3);
    }

    #[test]
    fn test_permission_granted_immediately() {
        let backend = Arc::new(PromptBackend::new(PermissionState::Granted));
        let server = CameraServer::new(backend.clone(), CameraConfig::default());

        assert!(server.request_permission());
        assert!(server.permission_granted());
        assert_eq!(backend.prompts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_permission_prompt_flow() {
        let backend = Arc::new(PromptBackend::new(PermissionState::Unknown));
        let server = CameraServer::new(backend.clone(), CameraConfig::default());
        let mut events = server.subscribe();

        assert!(!server.request_permission());
        assert_eq!(server.permission_state(), PermissionState::Pending);
        assert!(!server.request_permission());
        assert_eq!(backend.prompts.load(Ordering::SeqCst), 1);

        server.on_permission_result(false);
        assert_eq!(server.permission_state(), PermissionState::Denied);
        assert_eq!(events.try_recv().unwrap(), ServerEvent::PermissionResult(false));

        assert!(!server.request_permission());
        assert_eq!(backend.prompts.load(Ordering::SeqCst), 2);

        server.on_permission_result(true);
        assert!(server.permission_granted());
        assert!(server.request_permission());
        assert_eq!(events.try_recv().unwrap(), ServerEvent::PermissionResult(true));
    }

    #[test]
    fn test_feed_builder_uses_config() {
        let server = CameraServer::new(Arc::new(DummyBackend), CameraConfig::grayscale());
        let feed = server
            .feed_builder("gray")
            .format(FormatDescriptor::yuyv(YuyvOrder::Yuy2, 2, 1, 30))
            .build();
        feed.set_format(0).unwrap();
        feed.activate().unwrap();
        assert!(feed.decode_frame(&[10, 128, 20, 128], crate::video::Rotation::None));
        assert_eq!(feed.latest_image().unwrap().data, vec![10, 20]);
    }
}
