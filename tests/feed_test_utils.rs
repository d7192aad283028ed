//! Feed Testing Utilities
//!
//! Shared helpers for the integration tests: packed 4:2:2 buffer builders,
//! a recording stream backend and tracing setup.

#![allow(dead_code)]

use camera_feed_core::backend::StreamBackend;
use camera_feed_core::feed::{Feed, FeedBuilder, FrameSink};
use camera_feed_core::video::{FormatDescriptor, YuyvOrder};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Initialise a tracing subscriber for tests.
///
/// Respects `RUST_LOG`, defaults to `debug`. Subsequent calls are no-ops.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Uniform packed 4:2:2 frame in `order`
pub fn uniform_yuyv(order: YuyvOrder, width: u32, height: u32, y: u8, u: u8, v: u8) -> Vec<u8> {
    let [y0, y1, u_at, v_at] = order.channel_map();
    let mut macropixel = [0u8; 4];
    macropixel[y0] = y;
    macropixel[y1] = y;
    macropixel[u_at] = u;
    macropixel[v_at] = v;

    let macropixels = (width as usize * height as usize) / 2;
    macropixel.repeat(macropixels)
}

/// Uniform gray YUY2 frame
pub fn gray_yuy2(width: u32, height: u32, luma: u8) -> Vec<u8> {
    uniform_yuyv(YuyvOrder::Yuy2, width, height, luma, 128, 128)
}

/// Stream backend that records calls and keeps the last sink
#[derive(Default)]
pub struct RecordingStream {
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub refuse: AtomicBool,
    pub started_formats: Mutex<Vec<FormatDescriptor>>,
    pub sink: Mutex<Option<FrameSink>>,
}

impl RecordingStream {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn refusing() -> Arc<Self> {
        let stream = Self::default();
        stream.refuse.store(true, Ordering::SeqCst);
        Arc::new(stream)
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Sink handed over by the last successful start
    pub fn sink(&self) -> Option<FrameSink> {
        self.sink.lock().unwrap().clone()
    }
}

impl StreamBackend for RecordingStream {
    fn start_stream(&self, format: &FormatDescriptor, sink: FrameSink) -> bool {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return false;
        }
        self.started_formats.lock().unwrap().push(*format);
        *self.sink.lock().unwrap() = Some(sink);
        true
    }

    fn stop_stream(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.sink.lock().unwrap().take();
    }
}

/// Feed with a 4×1 YUY2, a 2×2 YUY2 and a 2×1 RGBA format
pub fn test_feed(backend: Arc<RecordingStream>) -> Arc<Feed> {
    FeedBuilder::new("Test Camera")
        .format(FormatDescriptor::yuyv(YuyvOrder::Yuy2, 4, 1, 30))
        .format(FormatDescriptor::yuyv(YuyvOrder::Yuy2, 2, 2, 30))
        .format(FormatDescriptor::copy(true, 2, 1, 30))
        .backend(backend)
        .build()
}
