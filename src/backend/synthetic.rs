//! Test-pattern stream backend
//!
//! Spawns one producer thread per started stream. The thread renders a
//! moving pattern in the selected format and hands it to the feed through
//! its [`FrameSink`], the same way a platform capture callback would.
//! [`StreamBackend::stop_stream`] joins the thread, so no buffer is
//! delivered after it returns.

use super::StreamBackend;
use crate::config::CameraConfig;
use crate::feed::FrameSink;
use crate::video::{FormatDescriptor, PixelLayout, Rotation};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Pacing used when a format reports a degenerate frame interval
const FALLBACK_INTERVAL: Duration = Duration::from_millis(33);

/// How buffers reach the feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delivery {
    /// Decode on the producer thread
    #[default]
    Direct,
    /// Store in the feed's latest-frame slot; the host decodes
    Slot,
}

struct Producer {
    handle: JoinHandle<()>,
    thread_id: ThreadId,
    stop: Arc<AtomicBool>,
}

/// Stream backend producing generated frames
pub struct SyntheticStream {
    interval: Option<Duration>,
    rotation: Rotation,
    delivery: Delivery,
    frames_produced: Arc<AtomicU64>,
    producer: Mutex<Option<Producer>>,
}

impl SyntheticStream {
    /// Pace frames by the selected format's frame interval
    pub fn new() -> Self {
        Self {
            interval: None,
            rotation: Rotation::None,
            delivery: Delivery::Direct,
            frames_produced: Arc::new(AtomicU64::new(0)),
            producer: Mutex::new(None),
        }
    }

    /// Pacing taken from `config.synthetic_frame_interval_ms`, if set
    pub fn from_config(config: &CameraConfig) -> Self {
        let stream = Self::new();
        match config.synthetic_frame_interval_ms {
            Some(ms) => stream.with_interval(Duration::from_millis(ms)),
            None => stream,
        }
    }

    /// Override frame pacing
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Rotation hint attached to every buffer
    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    /// Choose between direct decode and the latest-frame slot
    pub fn with_delivery(mut self, delivery: Delivery) -> Self {
        self.delivery = delivery;
        self
    }

    /// Buffers handed to the sink so far
    pub fn frames_produced(&self) -> u64 {
        self.frames_produced.load(Ordering::Relaxed)
    }

    /// Whether a producer thread is running
    pub fn is_streaming(&self) -> bool {
        self.producer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn interval_for(&self, format: &FormatDescriptor) -> Duration {
        if let Some(interval) = self.interval {
            return interval;
        }
        let fps = format.frame_rate();
        if fps > 0.0 {
            Duration::from_secs_f64(1.0 / fps)
        } else {
            FALLBACK_INTERVAL
        }
    }
}

impl Default for SyntheticStream {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamBackend for SyntheticStream {
    fn start_stream(&self, format: &FormatDescriptor, sink: FrameSink) -> bool {
        let mut producer = self.producer.lock().unwrap_or_else(PoisonError::into_inner);
        if producer.is_some() {
            warn!(%format, "synthetic stream already running");
            return false;
        }

        // Fail early on layouts we cannot render
        if test_pattern(format, 0).is_none() {
            warn!(%format, "no test pattern for format");
            return false;
        }

        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let produced = Arc::clone(&self.frames_produced);
        let format = *format;
        let interval = self.interval_for(&format);
        let rotation = self.rotation;
        let delivery = self.delivery;

        let spawned = thread::Builder::new()
            .name("synthetic-camera".into())
            .spawn(move || {
                let mut frame_index = 0u64;
                while !thread_stop.load(Ordering::Acquire) {
                    if !sink.is_connected() {
                        debug!("feed dropped, stopping synthetic producer");
                        break;
                    }
                    if let Some(buffer) = test_pattern(&format, frame_index) {
                        match delivery {
                            Delivery::Direct => {
                                sink.deliver(&buffer, rotation);
                            }
                            Delivery::Slot => {
                                sink.push(buffer, rotation);
                            }
                        }
                        produced.fetch_add(1, Ordering::Relaxed);
                    }
                    frame_index = frame_index.wrapping_add(1);
                    thread::sleep(interval);
                }
            });

        match spawned {
            Ok(handle) => {
                info!(%format, ?interval, "synthetic stream started");
                *producer = Some(Producer {
                    thread_id: handle.thread().id(),
                    handle,
                    stop,
                });
                true
            }
            Err(e) => {
                warn!(error = %e, "failed to spawn synthetic producer");
                false
            }
        }
    }

    fn stop_stream(&self) {
        let producer = self
            .producer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(producer) = producer else {
            return;
        };

        producer.stop.store(true, Ordering::Release);

        // The feed can be dropped from inside its own producer; joining
        // there would wait on ourselves.
        if producer.thread_id == thread::current().id() {
            debug!("synthetic stream stopped from producer thread");
            return;
        }

        if producer.handle.join().is_err() {
            warn!("synthetic producer panicked");
        }
        info!(frames = self.frames_produced(), "synthetic stream stopped");
    }
}

impl Drop for SyntheticStream {
    fn drop(&mut self) {
        self.stop_stream();
    }
}

/// Render frame `frame_index` of the moving test pattern in `format`.
///
/// Returns `None` for layouts without a generator.
pub fn test_pattern(format: &FormatDescriptor, frame_index: u64) -> Option<Vec<u8>> {
    let width = format.width as usize;
    let height = format.height as usize;
    let shift = (frame_index % 256) as usize;

    match format.pixel_layout {
        PixelLayout::Yuyv { order } => {
            if width == 0 || height == 0 || width % 2 != 0 {
                return None;
            }
            let [y0, y1, u, v] = order.channel_map();
            let mut buffer = vec![0u8; format.min_buffer_size()?];
            for (i, macropixel) in buffer.chunks_exact_mut(4).enumerate() {
                let x = (i * 2) % width;
                macropixel[y0] = ((x + shift) % 256) as u8;
                macropixel[y1] = ((x + 1 + shift) % 256) as u8;
                macropixel[u] = 128;
                macropixel[v] = 128;
            }
            Some(buffer)
        }
        PixelLayout::Copy { has_alpha } => {
            let bpp = if has_alpha { 4 } else { 2 };
            let mut buffer = vec![0u8; format.min_buffer_size()?];
            for (i, pixel) in buffer.chunks_exact_mut(bpp).enumerate() {
                let value = ((i % width.max(1) + shift) % 256) as u8;
                let last = bpp - 1;
                pixel[..last].fill(value);
                pixel[last] = 255;
            }
            Some(buffer)
        }
        #[cfg(feature = "jpeg")]
        PixelLayout::Jpeg => jpeg_pattern(format.width, format.height, shift as u8),
        #[cfg(not(feature = "jpeg"))]
        PixelLayout::Jpeg => None,
    }
}

#[cfg(feature = "jpeg")]
fn jpeg_pattern(width: u32, height: u32, shift: u8) -> Option<Vec<u8>> {
    use image::codecs::jpeg::JpegEncoder;
    use image::ExtendedColorType;

    if width == 0 || height == 0 {
        return None;
    }
    let pixels: Vec<u8> = (0..width.checked_mul(height)?)
        .flat_map(|i| {
            let value = ((i % width) as u8).wrapping_add(shift);
            [value, value, value]
        })
        .collect();

    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, 85)
        .encode(&pixels, width, height, ExtendedColorType::Rgb8)
        .ok()?;
    Some(encoded)
}
