//! Pixel Buffer Decoders
//!
//! Turns raw, driver-supplied buffers into [`DecodedImage`]s.
//!
//! ## Variants
//!
//! | Layout            | Decoder                   | Output     |
//! |-------------------|---------------------------|------------|
//! | YUY2/YVYU/UYVY/VYUY | [`YuyvToRgbDecoder`]    | RGB8       |
//! | YUY2/YVYU/UYVY/VYUY | [`YuyvToGrayscaleDecoder`] | L8      |
//! | RGBA / LA         | [`CopyDecoder`]           | RGBA8/LA8  |
//! | JPEG              | [`JpegDecoder`]           | RGB8 or L8 |
//!
//! The four packed 4:2:2 orders share one code path; a channel map picks
//! the byte offsets of `Y0, Y1, U, V` inside each 4-byte macropixel.
//!
//! Rotation is not done by the variants themselves. [`BufferDecoder::decode_rotated`]
//! converts first and then runs [`DecodedImage::rotate`], so every variant
//! rotates the same way.

use crate::video::format::{FormatDescriptor, PixelLayout, YuyvOrder};
use crate::video::frame::{DecodedImage, ImageFormat, Rotation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

/// Error types for buffer decoding
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Raw buffer does not hold a full frame
    #[error("Malformed buffer: expected {expected} bytes, got {actual}")]
    MalformedBuffer {
        /// Bytes the format requires
        expected: usize,
        /// Bytes delivered
        actual: usize,
    },

    /// External codec rejected the payload
    #[error("Codec error: {0}")]
    Codec(String),

    /// No decoder exists for the layout
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Output of the packed 4:2:2 decoders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum YuyvOutput {
    /// Full color conversion to RGB8
    #[default]
    Rgb,
    /// Luma only, L8
    Grayscale,
}

/// Decoder for one selected format
///
/// A decoder lives exactly as long as its feed is active. Implementations
/// must not keep a reference to `raw` past the call.
pub trait BufferDecoder: Send {
    /// Convert a raw buffer without rotation
    fn decode(&mut self, raw: &[u8]) -> Result<DecodedImage, DecodeError>;

    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Convert and rotate; any failure is a dropped frame
    fn decode_rotated(&mut self, raw: &[u8], rotation: Rotation) -> Option<DecodedImage> {
        match self.decode(raw) {
            Ok(mut image) => {
                image.rotate(rotation);
                trace!(
                    decoder = self.name(),
                    width = image.width,
                    height = image.height,
                    "decoded frame"
                );
                Some(image)
            }
            Err(e) => {
                debug!(decoder = self.name(), error = %e, "dropping frame");
                None
            }
        }
    }
}

/// Reject buffers that cannot hold `width * height` packed 4:2:2 samples
fn check_yuyv_len(width: u32, height: u32, raw: &[u8]) -> Result<usize, DecodeError> {
    let pixels = (width as usize).checked_mul(height as usize);
    // An overflowing frame size can never be satisfied by a real buffer
    let expected = pixels.and_then(|p| p.checked_mul(2)).unwrap_or(usize::MAX);
    match pixels {
        Some(pixels) if raw.len() >= expected => Ok(pixels),
        _ => Err(DecodeError::MalformedBuffer {
            expected,
            actual: raw.len(),
        }),
    }
}

#[inline]
fn clamp_u8(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

/// Packed 4:2:2 → 8-bit luminance
#[derive(Debug, Clone)]
pub struct YuyvToGrayscaleDecoder {
    width: u32,
    height: u32,
    channel_map: [usize; 4],
}

impl YuyvToGrayscaleDecoder {
    /// Create a decoder for `order` at `width x height`
    pub fn new(width: u32, height: u32, order: YuyvOrder) -> Self {
        Self {
            width,
            height,
            channel_map: order.channel_map(),
        }
    }
}

impl BufferDecoder for YuyvToGrayscaleDecoder {
    fn decode(&mut self, raw: &[u8]) -> Result<DecodedImage, DecodeError> {
        let pixels = check_yuyv_len(self.width, self.height, raw)?;
        let [y0, y1, _, _] = self.channel_map;

        let mut data = vec![0u8; pixels];
        for (dst, macropixel) in data.chunks_exact_mut(2).zip(raw.chunks_exact(4)) {
            dst[0] = macropixel[y0];
            dst[1] = macropixel[y1];
        }

        Ok(DecodedImage::from_data(self.width, self.height, ImageFormat::L8, data))
    }

    fn name(&self) -> &'static str {
        "yuyv-grayscale"
    }
}

/// Packed 4:2:2 → RGB8
#[derive(Debug, Clone)]
pub struct YuyvToRgbDecoder {
    width: u32,
    height: u32,
    channel_map: [usize; 4],
}

impl YuyvToRgbDecoder {
    /// Create a decoder for `order` at `width x height`
    pub fn new(width: u32, height: u32, order: YuyvOrder) -> Self {
        Self {
            width,
            height,
            channel_map: order.channel_map(),
        }
    }
}

impl BufferDecoder for YuyvToRgbDecoder {
    fn decode(&mut self, raw: &[u8]) -> Result<DecodedImage, DecodeError> {
        let pixels = check_yuyv_len(self.width, self.height, raw)?;
        let [y0_idx, y1_idx, u_idx, v_idx] = self.channel_map;

        // raw holds pixels * 2 bytes, so pixels * 3 cannot overflow
        let mut data = vec![0u8; pixels * 3];
        for (dst, macropixel) in data.chunks_exact_mut(6).zip(raw.chunks_exact(4)) {
            let u = macropixel[u_idx] as i32 - 128;
            let v = macropixel[v_idx] as i32 - 128;

            // Fixed-point BT.601: 2.016u, 0.375u + 0.75v, 1.5v
            let u1 = ((u << 7) + u) >> 6;
            let rg = ((u << 1) + u + (v << 2) + (v << 1)) >> 3;
            let v1 = ((v << 1) + v) >> 1;

            let y0 = macropixel[y0_idx] as i32;
            let y1 = macropixel[y1_idx] as i32;

            dst[0] = clamp_u8(y0 + v1);
            dst[1] = clamp_u8(y0 - rg);
            dst[2] = clamp_u8(y0 + u1);

            dst[3] = clamp_u8(y1 + v1);
            dst[4] = clamp_u8(y1 - rg);
            dst[5] = clamp_u8(y1 + u1);
        }

        Ok(DecodedImage::from_data(self.width, self.height, ImageFormat::Rgb8, data))
    }

    fn name(&self) -> &'static str {
        "yuyv-rgb"
    }
}

/// Verbatim copy of an already displayable layout
#[derive(Debug, Clone)]
pub struct CopyDecoder {
    width: u32,
    height: u32,
    has_alpha: bool,
}

impl CopyDecoder {
    /// Create a decoder producing RGBA8 (`has_alpha`) or LA8
    pub fn new(width: u32, height: u32, has_alpha: bool) -> Self {
        Self {
            width,
            height,
            has_alpha,
        }
    }

    fn format(&self) -> ImageFormat {
        if self.has_alpha {
            ImageFormat::Rgba8
        } else {
            ImageFormat::La8
        }
    }
}

impl BufferDecoder for CopyDecoder {
    fn decode(&mut self, raw: &[u8]) -> Result<DecodedImage, DecodeError> {
        let format = self.format();
        let expected = format
            .buffer_size(self.width, self.height)
            .unwrap_or(usize::MAX);
        if raw.len() != expected {
            return Err(DecodeError::MalformedBuffer {
                expected,
                actual: raw.len(),
            });
        }

        Ok(DecodedImage::from_data(self.width, self.height, format, raw.to_vec()))
    }

    fn name(&self) -> &'static str {
        "copy"
    }
}

/// JPEG payload decoder backed by the `image` crate
#[cfg(feature = "jpeg")]
#[derive(Debug, Clone, Default)]
pub struct JpegDecoder;

#[cfg(feature = "jpeg")]
impl JpegDecoder {
    /// Create a new JPEG decoder
    pub fn new() -> Self {
        Self
    }
}

#[cfg(feature = "jpeg")]
impl BufferDecoder for JpegDecoder {
    fn decode(&mut self, raw: &[u8]) -> Result<DecodedImage, DecodeError> {
        use image::DynamicImage;

        let decoded = image::load_from_memory_with_format(raw, image::ImageFormat::Jpeg)
            .map_err(|e| DecodeError::Codec(format!("JPEG decode error: {}", e)))?;

        let image = match decoded {
            DynamicImage::ImageLuma8(luma) => {
                let (width, height) = luma.dimensions();
                DecodedImage::from_data(width, height, ImageFormat::L8, luma.into_raw())
            }
            other => {
                let rgb = other.to_rgb8();
                let (width, height) = rgb.dimensions();
                DecodedImage::from_data(width, height, ImageFormat::Rgb8, rgb.into_raw())
            }
        };

        Ok(image)
    }

    fn name(&self) -> &'static str {
        "jpeg"
    }
}

/// Construct the decoder for a format
///
/// # Errors
///
/// `DecodeError::UnsupportedFormat` for zero-sized frames, frames whose
/// byte size does not fit in `usize`, packed 4:2:2 formats with an odd
/// width, or JPEG when the `jpeg` feature is off.
pub fn decoder_for(
    format: &FormatDescriptor,
    yuyv_output: YuyvOutput,
) -> Result<Box<dyn BufferDecoder>, DecodeError> {
    let (width, height) = (format.width, format.height);

    if !matches!(format.pixel_layout, PixelLayout::Jpeg) && (width == 0 || height == 0) {
        return Err(DecodeError::UnsupportedFormat(format!(
            "{} has an empty resolution",
            format
        )));
    }

    let output = match format.pixel_layout {
        PixelLayout::Yuyv { .. } => match yuyv_output {
            YuyvOutput::Rgb => Some(ImageFormat::Rgb8),
            YuyvOutput::Grayscale => Some(ImageFormat::L8),
        },
        PixelLayout::Copy { has_alpha: true } => Some(ImageFormat::Rgba8),
        PixelLayout::Copy { has_alpha: false } => Some(ImageFormat::La8),
        PixelLayout::Jpeg => None,
    };
    if let Some(output) = output {
        let fits = format.min_buffer_size().is_some()
            && output.buffer_size(width, height).is_some();
        if !fits {
            return Err(DecodeError::UnsupportedFormat(format!(
                "{} frame size overflows memory",
                format
            )));
        }
    }

    match format.pixel_layout {
        PixelLayout::Yuyv { order } => {
            if width % 2 != 0 {
                return Err(DecodeError::UnsupportedFormat(format!(
                    "{} needs an even width",
                    format
                )));
            }
            Ok(match yuyv_output {
                YuyvOutput::Rgb => Box::new(YuyvToRgbDecoder::new(width, height, order)),
                YuyvOutput::Grayscale => {
                    Box::new(YuyvToGrayscaleDecoder::new(width, height, order))
                }
            })
        }
        PixelLayout::Copy { has_alpha } => {
            Ok(Box::new(CopyDecoder::new(width, height, has_alpha)))
        }
        #[cfg(feature = "jpeg")]
        PixelLayout::Jpeg => Ok(Box::new(JpegDecoder::new())),
        #[cfg(not(feature = "jpeg"))]
        PixelLayout::Jpeg => Err(DecodeError::UnsupportedFormat(
            "JPEG support is disabled".to_string(),
        )),
    }
}
