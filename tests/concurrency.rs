//! Concurrency Tests
//!
//! Buffers arrive on backend threads while the host drives the lifecycle
//! from its own thread. These tests race the two.

mod feed_test_utils;

use camera_feed_core::backend::synthetic::{Delivery, SyntheticStream};
use camera_feed_core::feed::{FeedBuilder, FeedState};
use camera_feed_core::video::{FormatDescriptor, ImageFormat, Rotation, YuyvOrder};
use feed_test_utils::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

#[test]
fn test_decode_racing_deactivate() {
    init_test_tracing();
    let backend = RecordingStream::new();
    let feed = test_feed(backend.clone());
    feed.set_format(1).unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let producers: Vec<_> = (0..4)
        .map(|n| {
            let sink = feed.sink();
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let raw = gray_yuy2(2, 2, 40 * n as u8);
                let mut published = 0u64;
                while !stop.load(Ordering::Relaxed) {
                    if sink.deliver(&raw, Rotation::None) {
                        published += 1;
                    }
                }
                published
            })
        })
        .collect();

    for _ in 0..50 {
        feed.activate().unwrap();
        thread::sleep(Duration::from_micros(200));
        feed.deactivate();
        assert_eq!(feed.state(), FeedState::Configured);
    }

    stop.store(true, Ordering::Relaxed);
    let published: u64 = producers.into_iter().map(|p| p.join().unwrap()).sum();

    let stats = feed.stats();
    assert_eq!(stats.frames_decoded, published);
    assert_eq!(
        stats.frames_received,
        stats.frames_decoded + stats.frames_dropped + stats.decode_errors
    );
    assert_eq!(stats.decode_errors, 0);
    assert_eq!(backend.starts(), 50);
    assert_eq!(backend.stops(), 50);

    if let Some(image) = feed.latest_image() {
        assert_eq!((image.width, image.height), (2, 2));
        assert_eq!(image.data.len(), 12);
    }
}

#[test]
fn test_slot_keeps_only_newest() {
    init_test_tracing();
    let feed = test_feed(RecordingStream::new());
    feed.set_format(0).unwrap();
    feed.activate().unwrap();

    let sink = feed.sink();
    let producer = thread::spawn(move || {
        for luma in 1..=100u8 {
            assert!(sink.push(gray_yuy2(4, 1, luma), Rotation::None));
        }
    });
    producer.join().unwrap();

    assert!(feed.process_pending());
    assert!(!feed.process_pending());
    assert_eq!(feed.latest_image().unwrap().data[0], 100);

    let stats = feed.stats();
    assert_eq!(stats.frames_received, 100);
    assert_eq!(stats.frames_dropped, 99);
    assert_eq!(stats.frames_decoded, 1);
}

#[test]
fn test_synthetic_stream_direct() {
    init_test_tracing();
    let backend = Arc::new(SyntheticStream::new().with_interval(Duration::from_millis(1)));
    let feed = FeedBuilder::new("Synthetic")
        .format(FormatDescriptor::yuyv(YuyvOrder::Uyvy, 16, 8, 30))
        .backend(backend.clone())
        .build();
    feed.set_format(0).unwrap();
    feed.activate().unwrap();
    assert!(backend.is_streaming());

    assert!(wait_for(Duration::from_secs(5), || feed.stats().frames_decoded >= 3));
    feed.deactivate();
    assert!(!backend.is_streaming());

    // stop_stream joined the producer; nothing arrives afterwards
    let produced = backend.frames_produced();
    thread::sleep(Duration::from_millis(20));
    assert_eq!(backend.frames_produced(), produced);

    let image = feed.latest_image().unwrap();
    assert_eq!((image.width, image.height), (16, 8));
    assert_eq!(image.format, ImageFormat::Rgb8);
}

#[test]
fn test_synthetic_stream_slot_with_rotation() {
    init_test_tracing();
    let backend = Arc::new(
        SyntheticStream::new()
            .with_interval(Duration::from_millis(1))
            .with_delivery(Delivery::Slot)
            .with_rotation(Rotation::CounterClockwise90),
    );
    let feed = FeedBuilder::new("Synthetic")
        .format(FormatDescriptor::copy(true, 6, 2, 30))
        .backend(backend.clone())
        .build();
    feed.set_format(0).unwrap();
    feed.activate().unwrap();

    assert!(wait_for(Duration::from_secs(5), || feed.process_pending()));
    feed.deactivate();

    let image = feed.latest_image().unwrap();
    assert_eq!((image.width, image.height), (2, 6));
    assert_eq!(image.format, ImageFormat::Rgba8);
}

#[test]
fn test_dropping_feed_stops_synthetic_stream() {
    init_test_tracing();
    let backend = Arc::new(SyntheticStream::new().with_interval(Duration::from_millis(1)));
    let feed = FeedBuilder::new("Synthetic")
        .format(FormatDescriptor::copy(false, 4, 4, 30))
        .backend(backend.clone())
        .build();
    feed.set_format(0).unwrap();
    feed.activate().unwrap();
    assert!(wait_for(Duration::from_secs(5), || backend.frames_produced() > 0));

    // The producer may hold the last strong reference for a moment
    drop(feed);
    assert!(wait_for(Duration::from_secs(5), || !backend.is_streaming()));
}
