//! Video Decoding Module
//!
//! Converts raw camera buffers into displayable images.
//!
//! ## Architecture
//!
//! ```text
//! Capture backend → raw buffer + format → BufferDecoder → DecodedImage → rotate → Feed
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use camera_feed_core::video::{decoder_for, FormatDescriptor, Rotation, YuyvOrder, YuyvOutput};
//!
//! let format = FormatDescriptor::yuyv(YuyvOrder::Yuy2, 2, 1, 30);
//! let mut decoder = decoder_for(&format, YuyvOutput::Rgb).unwrap();
//!
//! let image = decoder
//!     .decode_rotated(&[100, 128, 100, 128], Rotation::None)
//!     .unwrap();
//! assert_eq!(image.data, vec![100; 6]);
//! ```

pub mod decoder;
pub mod format;
pub mod frame;

pub use decoder::{
    decoder_for, BufferDecoder, CopyDecoder, DecodeError, YuyvOutput, YuyvToGrayscaleDecoder,
    YuyvToRgbDecoder,
};
#[cfg(feature = "jpeg")]
pub use decoder::JpegDecoder;
pub use format::{FormatDescriptor, FrameInterval, PixelLayout, YuyvOrder};
pub use frame::{DecodedImage, ImageFormat, Rotation};
