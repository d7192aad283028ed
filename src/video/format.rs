//! Capture Format Descriptors
//!
//! Describes what a backend can stream: a pixel layout, a resolution and a
//! frame interval. Descriptors are immutable once published by the backend.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Byte order of a packed 4:2:2 macropixel
///
/// All four orders carry two luma samples and one chroma pair in 4 bytes;
/// they differ only in where each component sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum YuyvOrder {
    /// Y0 U Y1 V
    Yuy2,
    /// Y0 V Y1 U
    Yvyu,
    /// U Y0 V Y1
    Uyvy,
    /// V Y0 U Y1
    Vyuy,
}

impl YuyvOrder {
    /// Byte offsets of `[Y0, Y1, U, V]` within a macropixel
    pub fn channel_map(&self) -> [usize; 4] {
        match self {
            YuyvOrder::Yuy2 => [0, 2, 1, 3],
            YuyvOrder::Yvyu => [0, 2, 3, 1],
            YuyvOrder::Uyvy => [1, 3, 0, 2],
            YuyvOrder::Vyuy => [1, 3, 2, 0],
        }
    }

    /// Little-endian FourCC as reported by V4L2 and Media Foundation
    pub fn fourcc(&self) -> u32 {
        match self {
            YuyvOrder::Yuy2 => u32::from_le_bytes(*b"YUY2"),
            YuyvOrder::Yvyu => u32::from_le_bytes(*b"YVYU"),
            YuyvOrder::Uyvy => u32::from_le_bytes(*b"UYVY"),
            YuyvOrder::Vyuy => u32::from_le_bytes(*b"VYUY"),
        }
    }
}

/// Pixel layout delivered by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "layout", rename_all = "snake_case")]
pub enum PixelLayout {
    /// Packed YUV 4:2:2
    Yuyv {
        /// Component order
        order: YuyvOrder,
    },
    /// Already displayable, copied verbatim
    Copy {
        /// RGBA when set, luminance-alpha otherwise
        has_alpha: bool,
    },
    /// Complete JPEG payload per buffer
    Jpeg,
}

impl PixelLayout {
    /// Minimum raw buffer size for one frame
    ///
    /// `None` for payload-defined layouts and for sizes that overflow `usize`.
    pub fn min_buffer_size(&self, width: u32, height: u32) -> Option<usize> {
        let bytes_per_pixel = match self {
            PixelLayout::Yuyv { .. } => 2,
            PixelLayout::Copy { has_alpha: true } => 4,
            PixelLayout::Copy { has_alpha: false } => 2,
            PixelLayout::Jpeg => return None,
        };
        (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(bytes_per_pixel)
    }
}

/// Time between frames as a fraction of a second
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameInterval {
    /// Numerator
    pub numerator: u32,
    /// Denominator
    pub denominator: u32,
}

impl FrameInterval {
    /// Create a new interval
    pub fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Interval for a whole frame rate (e.g. 30 → 1/30 s)
    pub fn from_fps(fps: u32) -> Self {
        Self::new(1, fps)
    }

    /// Frames per second, 0.0 for a degenerate interval
    pub fn frame_rate(&self) -> f64 {
        if self.numerator == 0 {
            return 0.0;
        }
        self.denominator as f64 / self.numerator as f64
    }
}

impl Default for FrameInterval {
    fn default() -> Self {
        Self::from_fps(30)
    }
}

/// One format a feed can be configured to stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FormatDescriptor {
    /// Pixel layout of the raw buffers
    pub pixel_layout: PixelLayout,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Time between frames
    pub frame_interval: FrameInterval,
}

impl FormatDescriptor {
    /// Create a new descriptor
    pub fn new(
        pixel_layout: PixelLayout,
        width: u32,
        height: u32,
        frame_interval: FrameInterval,
    ) -> Self {
        Self {
            pixel_layout,
            width,
            height,
            frame_interval,
        }
    }

    /// Packed YUV 4:2:2 format
    pub fn yuyv(order: YuyvOrder, width: u32, height: u32, fps: u32) -> Self {
        Self::new(PixelLayout::Yuyv { order }, width, height, FrameInterval::from_fps(fps))
    }

    /// Directly displayable format
    pub fn copy(has_alpha: bool, width: u32, height: u32, fps: u32) -> Self {
        Self::new(PixelLayout::Copy { has_alpha }, width, height, FrameInterval::from_fps(fps))
    }

    /// JPEG format
    pub fn jpeg(width: u32, height: u32, fps: u32) -> Self {
        Self::new(PixelLayout::Jpeg, width, height, FrameInterval::from_fps(fps))
    }

    /// Short layout name as shown to the host
    pub fn name(&self) -> &'static str {
        match self.pixel_layout {
            PixelLayout::Yuyv { order: YuyvOrder::Yuy2 } => "YUY2",
            PixelLayout::Yuyv { order: YuyvOrder::Yvyu } => "YVYU",
            PixelLayout::Yuyv { order: YuyvOrder::Uyvy } => "UYVY",
            PixelLayout::Yuyv { order: YuyvOrder::Vyuy } => "VYUY",
            PixelLayout::Copy { has_alpha: true } => "RGBA",
            PixelLayout::Copy { has_alpha: false } => "LA",
            PixelLayout::Jpeg => "JPEG",
        }
    }

    /// Frames per second
    pub fn frame_rate(&self) -> f64 {
        self.frame_interval.frame_rate()
    }

    /// Minimum raw buffer size for one frame, when the layout has one
    pub fn min_buffer_size(&self) -> Option<usize> {
        self.pixel_layout.min_buffer_size(self.width, self.height)
    }
}

impl fmt::Display for FormatDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}x{} @ {}/{}s",
            self.name(),
            self.width,
            self.height,
            self.frame_interval.numerator,
            self.frame_interval.denominator
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_maps_are_permutations() {
        for order in [YuyvOrder::Yuy2, YuyvOrder::Yvyu, YuyvOrder::Uyvy, YuyvOrder::Vyuy] {
            let mut map = order.channel_map();
            map.sort_unstable();
            assert_eq!(map, [0, 1, 2, 3], "{:?}", order);
        }
    }

    #[test]
    fn test_min_buffer_size() {
        let vga = FormatDescriptor::yuyv(YuyvOrder::Yuy2, 640, 480, 30);
        assert_eq!(vga.min_buffer_size(), Some(640 * 480 * 2));
        assert_eq!(FormatDescriptor::copy(true, 2, 1, 30).min_buffer_size(), Some(8));
        assert_eq!(FormatDescriptor::copy(false, 2, 1, 30).min_buffer_size(), Some(4));
        assert_eq!(FormatDescriptor::jpeg(1280, 720, 30).min_buffer_size(), None);

        let huge = FormatDescriptor::copy(true, u32::MAX, u32::MAX, 30);
        assert_eq!(huge.min_buffer_size(), None);
    }

    #[test]
    fn test_frame_rate() {
        assert_eq!(FrameInterval::from_fps(30).frame_rate(), 30.0);
        assert_eq!(FrameInterval::new(1001, 30000).frame_rate(), 30000.0 / 1001.0);
        assert_eq!(FrameInterval::new(0, 30).frame_rate(), 0.0);
    }

    #[test]
    fn test_display() {
        let format = FormatDescriptor::yuyv(YuyvOrder::Uyvy, 1280, 720, 30);
        assert_eq!(format.to_string(), "UYVY 1280x720 @ 1/30s");
    }

    #[test]
    fn test_serialize_format_listing() {
        let format = FormatDescriptor::yuyv(YuyvOrder::Yuy2, 640, 480, 30);
        let value = serde_json::to_value(format).unwrap();
        assert_eq!(value["pixel_layout"]["layout"], "yuyv");
        assert_eq!(value["pixel_layout"]["order"], "YUY2");
        assert_eq!(value["width"], 640);
        assert_eq!(value["frame_interval"]["denominator"], 30);

        let back: FormatDescriptor = serde_json::from_value(value).unwrap();
        assert_eq!(back, format);
    }
}
