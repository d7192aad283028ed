//! Camera Feeds
//!
//! A [`Feed`] is one capture device as the host sees it: a list of formats
//! discovered by the backend, an optional selection, and while active a
//! decoder turning each delivered buffer into the feed's latest image.
//!
//! ## State machine
//!
//! ```text
//! Idle ──set_format──▶ Configured ──activate──▶ Active
//!  ▲                     │   ▲                    │
//!  └─────clear_format────┘   └─────deactivate─────┘
//! ```
//!
//! ## Locking
//!
//! `lifecycle` serializes `add_format`, `set_format`, `clear_format`,
//! `activate` and `deactivate`. `state` guards the selection, the active
//! flag and the decoder, and is held by [`Feed::decode_frame`] for the whole
//! decode. Backend `start_stream`/`stop_stream` run with only `lifecycle`
//! held, so a backend may wait for in-flight callbacks while stopping.

pub mod slot;

pub use slot::{FrameSlot, PendingFrame};

use crate::backend::dummy::DummyStream;
use crate::backend::StreamBackend;
use crate::config::{CameraConfig, DEFAULT_FEED_EVENT_CAPACITY};
use crate::error::{CameraError, Result};
use crate::video::{
    decoder_for, BufferDecoder, DecodedImage, FormatDescriptor, Rotation, YuyvOutput,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

static NEXT_FEED_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique feed identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeedId(u64);

impl FeedId {
    fn next() -> Self {
        Self(NEXT_FEED_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which way the camera faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedPosition {
    /// Facing the user
    Front,
    /// Facing away from the user
    Back,
    /// External or unknown
    #[default]
    Unspecified,
}

impl FeedPosition {
    /// Map an NDK `ACAMERA_LENS_FACING_*` value; external lenses and
    /// unknown values are unspecified
    pub fn from_lens_facing(lens_facing: u8) -> Self {
        match lens_facing {
            0 => FeedPosition::Front,
            1 => FeedPosition::Back,
            _ => FeedPosition::Unspecified,
        }
    }
}

/// Lifecycle state reported by [`Feed::state`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedState {
    /// No format selected
    Idle,
    /// Format selected, not streaming
    Configured,
    /// Streaming and decoding
    Active,
}

/// Notification emitted by a feed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedEvent {
    /// A new image was published
    FrameChanged,
    /// The selection changed; `None` after [`Feed::clear_format`]
    FormatChanged { index: Option<usize> },
    /// Streaming started
    Activated,
    /// Streaming stopped
    Deactivated,
}

/// Feed statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedStats {
    /// Buffers handed to the feed by its backend
    pub frames_received: u64,
    /// Buffers turned into a published image
    pub frames_decoded: u64,
    /// Buffers discarded unread (inactive feed, or replaced in the slot)
    pub frames_dropped: u64,
    /// Buffers the decoder rejected
    pub decode_errors: u64,
}

#[derive(Default)]
struct FeedStatsInner {
    frames_received: AtomicU64,
    frames_decoded: AtomicU64,
    frames_dropped: AtomicU64,
    decode_errors: AtomicU64,
}

impl FeedStatsInner {
    fn to_stats(&self) -> FeedStats {
        FeedStats {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Default)]
struct FeedInner {
    selected_format: Option<usize>,
    active: bool,
    decoder: Option<Box<dyn BufferDecoder>>,
}

/// Lock a mutex, recovering the data if a holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One camera device
pub struct Feed {
    id: FeedId,
    name: String,
    position: FeedPosition,
    device_id: Option<String>,
    formats: RwLock<Vec<FormatDescriptor>>,
    lifecycle: Mutex<()>,
    state: Mutex<FeedInner>,
    backend: Arc<dyn StreamBackend>,
    yuyv_output: YuyvOutput,
    latest: RwLock<Option<Arc<DecodedImage>>>,
    slot: FrameSlot,
    stats: FeedStatsInner,
    events: broadcast::Sender<FeedEvent>,
    self_ref: Weak<Feed>,
}

impl Feed {
    /// Process-unique identifier
    pub fn id(&self) -> FeedId {
        self.id
    }

    /// Human-readable device name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Which way the camera faces
    pub fn position(&self) -> FeedPosition {
        self.position
    }

    /// Backend identifier of the device (object id, device path, ...)
    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    /// Snapshot of the discovered formats
    pub fn formats(&self) -> Vec<FormatDescriptor> {
        self.formats
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Format at `index`, if discovered
    pub fn format(&self, index: usize) -> Option<FormatDescriptor> {
        self.formats
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)
            .copied()
    }

    /// Append a discovered format
    ///
    /// Fails while active: the format list is frozen during streaming.
    pub fn add_format(&self, format: FormatDescriptor) -> Result<()> {
        let _lifecycle = lock(&self.lifecycle);
        if lock(&self.state).active {
            warn!(feed = %self.id, %format, "format discovered while active");
            return Err(CameraError::invalid_state("cannot add formats while active"));
        }

        let mut formats = self.formats.write().unwrap_or_else(PoisonError::into_inner);
        formats.push(format);
        debug!(feed = %self.id, index = formats.len() - 1, %format, "format added");
        Ok(())
    }

    /// Select the format to stream
    pub fn set_format(&self, index: usize) -> Result<()> {
        let _lifecycle = lock(&self.lifecycle);
        let len = self.formats.read().unwrap_or_else(PoisonError::into_inner).len();

        let mut state = lock(&self.state);
        if state.active {
            warn!(feed = %self.id, index, "set_format while active");
            return Err(CameraError::invalid_state("cannot change format while active"));
        }
        if index >= len {
            return Err(CameraError::InvalidFormatIndex { index, len });
        }
        state.selected_format = Some(index);
        drop(state);

        debug!(feed = %self.id, index, "format selected");
        let _ = self.events.send(FeedEvent::FormatChanged { index: Some(index) });
        Ok(())
    }

    /// Drop the selection, returning to [`FeedState::Idle`]
    pub fn clear_format(&self) -> Result<()> {
        let _lifecycle = lock(&self.lifecycle);
        let mut state = lock(&self.state);
        if state.active {
            return Err(CameraError::invalid_state("cannot clear format while active"));
        }
        if state.selected_format.take().is_some() {
            drop(state);
            let _ = self.events.send(FeedEvent::FormatChanged { index: None });
        }
        Ok(())
    }

    /// Index of the selected format
    pub fn selected_format(&self) -> Option<usize> {
        lock(&self.state).selected_format
    }

    /// Whether the feed is streaming
    pub fn is_active(&self) -> bool {
        lock(&self.state).active
    }

    /// Current lifecycle state
    pub fn state(&self) -> FeedState {
        let state = lock(&self.state);
        if state.active {
            FeedState::Active
        } else if state.selected_format.is_some() {
            FeedState::Configured
        } else {
            FeedState::Idle
        }
    }

    /// Start streaming the selected format
    ///
    /// Idempotent while active. On any failure the feed stays
    /// [`FeedState::Configured`] (or [`FeedState::Idle`]) with no decoder.
    pub fn activate(&self) -> Result<()> {
        let _lifecycle = lock(&self.lifecycle);

        let index = {
            let state = lock(&self.state);
            if state.active {
                debug!(feed = %self.id, "already active");
                return Ok(());
            }
            match state.selected_format {
                Some(index) => index,
                None => {
                    warn!(feed = %self.id, "activate without a selected format");
                    return Err(CameraError::invalid_state("no format selected"));
                }
            }
        };

        let len = self.formats.read().unwrap_or_else(PoisonError::into_inner).len();
        let format = self
            .format(index)
            .ok_or(CameraError::InvalidFormatIndex { index, len })?;
        let decoder = decoder_for(&format, self.yuyv_output)?;

        if !self.backend.start_stream(&format, self.sink()) {
            warn!(feed = %self.id, %format, "backend refused to start stream");
            return Err(CameraError::backend_unavailable(format!(
                "backend refused to stream {format}"
            )));
        }

        {
            let mut state = lock(&self.state);
            state.decoder = Some(decoder);
            state.active = true;
        }

        info!(feed = %self.id, name = %self.name, %format, "feed activated");
        let _ = self.events.send(FeedEvent::Activated);
        Ok(())
    }

    /// Stop streaming and release the decoder; no-op when inactive
    pub fn deactivate(&self) {
        let _lifecycle = lock(&self.lifecycle);
        if !lock(&self.state).active {
            trace!(feed = %self.id, "deactivate on inactive feed");
            return;
        }

        self.backend.stop_stream();

        {
            let mut state = lock(&self.state);
            state.decoder = None;
            state.active = false;
        }
        if self.slot.clear() {
            self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
        }

        info!(feed = %self.id, name = %self.name, "feed deactivated");
        let _ = self.events.send(FeedEvent::Deactivated);
    }

    /// Decode one raw buffer and publish the result
    ///
    /// Returns `true` if a new image was published. Buffers arriving while
    /// inactive and buffers the decoder rejects are dropped.
    pub fn decode_frame(&self, raw: &[u8], rotation: Rotation) -> bool {
        self.stats.frames_received.fetch_add(1, Ordering::Relaxed);
        self.decode_received(raw, rotation)
    }

    /// Decode the buffer waiting in the latest-frame slot, if any
    pub fn process_pending(&self) -> bool {
        match self.slot.take() {
            Some(frame) => self.decode_received(&frame.data, frame.rotation),
            None => false,
        }
    }

    fn decode_received(&self, raw: &[u8], rotation: Rotation) -> bool {
        let mut state = lock(&self.state);
        let Some(decoder) = state.decoder.as_mut() else {
            trace!(feed = %self.id, "buffer arrived while inactive");
            self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        };

        let Some(image) = decoder.decode_rotated(raw, rotation) else {
            self.stats.decode_errors.fetch_add(1, Ordering::Relaxed);
            return false;
        };

        *self.latest.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(image));
        self.stats.frames_decoded.fetch_add(1, Ordering::Relaxed);
        drop(state);

        let _ = self.events.send(FeedEvent::FrameChanged);
        true
    }

    /// Store a buffer for later decoding by [`Feed::process_pending`]
    ///
    /// Returns `false` if the feed is inactive and the buffer was dropped.
    pub fn push_frame(&self, data: Vec<u8>, rotation: Rotation) -> bool {
        self.stats.frames_received.fetch_add(1, Ordering::Relaxed);
        if !lock(&self.state).active {
            self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        if self.slot.push(PendingFrame { data, rotation }) {
            trace!(feed = %self.id, "pending frame replaced");
            self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
        }
        true
    }

    /// Whether a buffer is waiting in the latest-frame slot
    pub fn has_pending(&self) -> bool {
        !self.slot.is_empty()
    }

    /// Last published image; kept across failed decodes and deactivation
    pub fn latest_image(&self) -> Option<Arc<DecodedImage>> {
        self.latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Receive feed events; slow receivers skip old ones
    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.events.subscribe()
    }

    /// Snapshot of the frame counters
    pub fn stats(&self) -> FeedStats {
        self.stats.to_stats()
    }

    /// Weak delivery handle for the backend
    pub fn sink(&self) -> FrameSink {
        FrameSink {
            feed: self.self_ref.clone(),
            feed_id: self.id,
        }
    }
}

impl fmt::Debug for Feed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Feed")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("position", &self.position)
            .field("device_id", &self.device_id)
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for Feed {
    fn drop(&mut self) {
        self.deactivate();
    }
}

/// Handle through which a backend hands buffers to a feed
///
/// Holds a weak reference, so a backend that outlives its feed delivers
/// into nothing instead of keeping the feed alive.
#[derive(Debug, Clone)]
pub struct FrameSink {
    feed: Weak<Feed>,
    feed_id: FeedId,
}

impl FrameSink {
    /// Decode `raw` on the calling thread
    pub fn deliver(&self, raw: &[u8], rotation: Rotation) -> bool {
        match self.feed.upgrade() {
            Some(feed) => feed.decode_frame(raw, rotation),
            None => false,
        }
    }

    /// Hand an owned buffer to the feed's latest-frame slot
    pub fn push(&self, data: Vec<u8>, rotation: Rotation) -> bool {
        match self.feed.upgrade() {
            Some(feed) => feed.push_frame(data, rotation),
            None => false,
        }
    }

    /// Feed this sink delivers to
    pub fn feed_id(&self) -> FeedId {
        self.feed_id
    }

    /// Whether the feed still exists
    pub fn is_connected(&self) -> bool {
        self.feed.strong_count() > 0
    }
}

/// Builds a [`Feed`] from what the backend discovered
///
/// ```
/// use camera_feed_core::feed::{FeedBuilder, FeedPosition};
/// use camera_feed_core::video::{FormatDescriptor, YuyvOrder};
///
/// let feed = FeedBuilder::new("Integrated Camera")
///     .position(FeedPosition::Front)
///     .format(FormatDescriptor::yuyv(YuyvOrder::Yuy2, 640, 480, 30))
///     .build();
///
/// feed.set_format(0).unwrap();
/// feed.activate().unwrap();
/// assert!(feed.is_active());
/// ```
pub struct FeedBuilder {
    name: String,
    position: FeedPosition,
    device_id: Option<String>,
    formats: Vec<FormatDescriptor>,
    backend: Option<Arc<dyn StreamBackend>>,
    yuyv_output: YuyvOutput,
    events_capacity: usize,
}

impl FeedBuilder {
    /// Start a feed named `name` with no formats
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            position: FeedPosition::Unspecified,
            device_id: None,
            formats: Vec::new(),
            backend: None,
            yuyv_output: YuyvOutput::default(),
            events_capacity: DEFAULT_FEED_EVENT_CAPACITY,
        }
    }

    /// Set the facing direction
    pub fn position(mut self, position: FeedPosition) -> Self {
        self.position = position;
        self
    }

    /// Set the backend device identifier used for de-duplication
    pub fn device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    /// Append one discovered format
    pub fn format(mut self, format: FormatDescriptor) -> Self {
        self.formats.push(format);
        self
    }

    /// Append several discovered formats
    pub fn formats(mut self, formats: impl IntoIterator<Item = FormatDescriptor>) -> Self {
        self.formats.extend(formats);
        self
    }

    /// Stream backend; defaults to [`DummyStream`]
    pub fn backend(mut self, backend: Arc<dyn StreamBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Apply decode output and channel capacity from `config`
    pub fn config(mut self, config: &CameraConfig) -> Self {
        self.yuyv_output = config.yuyv_output;
        self.events_capacity = config.feed_event_capacity;
        self
    }

    /// Choose RGB or grayscale output for packed 4:2:2 formats
    pub fn yuyv_output(mut self, output: YuyvOutput) -> Self {
        self.yuyv_output = output;
        self
    }

    /// Capacity of the feed event channel
    pub fn events_capacity(mut self, capacity: usize) -> Self {
        self.events_capacity = capacity;
        self
    }

    /// Create the feed in [`FeedState::Idle`]
    pub fn build(self) -> Arc<Feed> {
        let (events, _) = broadcast::channel(self.events_capacity.max(1));
        let backend = self.backend.unwrap_or_else(|| Arc::new(DummyStream));

        let feed = Arc::new_cyclic(|self_ref| Feed {
            id: FeedId::next(),
            name: self.name,
            position: self.position,
            device_id: self.device_id,
            formats: RwLock::new(self.formats),
            lifecycle: Mutex::new(()),
            state: Mutex::new(FeedInner::default()),
            backend,
            yuyv_output: self.yuyv_output,
            latest: RwLock::new(None),
            slot: FrameSlot::new(),
            stats: FeedStatsInner::default(),
            events,
            self_ref: self_ref.clone(),
        });
        debug!(feed = %feed.id, name = %feed.name, formats = feed.formats().len(), "feed built");
        feed
    }
}
