//! Decoded Frame Types
//!
//! Defines the normalized image produced by every buffer decoder and the
//! rotation step shared by all of them.

use std::fmt;

/// Pixel format of a decoded image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    /// 8-bit luminance (1 byte per pixel)
    L8,
    /// Luminance + alpha (2 bytes per pixel)
    La8,
    /// RGB24 (8 bits per channel, packed)
    Rgb8,
    /// RGBA32 (8 bits per channel with alpha, packed)
    Rgba8,
}

impl ImageFormat {
    /// Bytes used by a single pixel
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            ImageFormat::L8 => 1,
            ImageFormat::La8 => 2,
            ImageFormat::Rgb8 => 3,
            ImageFormat::Rgba8 => 4,
        }
    }

    /// Calculate the buffer size needed for an image; `None` if it does
    /// not fit in `usize`
    pub fn buffer_size(&self, width: u32, height: u32) -> Option<usize> {
        (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(self.bytes_per_pixel())
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageFormat::L8 => write!(f, "L8"),
            ImageFormat::La8 => write!(f, "LA8"),
            ImageFormat::Rgb8 => write!(f, "RGB8"),
            ImageFormat::Rgba8 => write!(f, "RGBA8"),
        }
    }
}

/// Clockwise rotation applied after pixel conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    /// Leave the image as decoded
    #[default]
    None,
    /// 90 degrees clockwise
    Clockwise90,
    /// Half turn
    Rotate180,
    /// 90 degrees counter-clockwise (270 clockwise)
    CounterClockwise90,
}

impl Rotation {
    /// Map a rotation hint in degrees.
    ///
    /// Only 0, 90, 180 and 270 are meaningful; anything else is treated as no
    /// rotation, matching what capture drivers report for upright sensors.
    pub fn from_degrees(degrees: i32) -> Self {
        match degrees {
            90 => Rotation::Clockwise90,
            180 => Rotation::Rotate180,
            270 => Rotation::CounterClockwise90,
            _ => Rotation::None,
        }
    }

    /// Rotation in clockwise degrees
    pub fn degrees(&self) -> i32 {
        match self {
            Rotation::None => 0,
            Rotation::Clockwise90 => 90,
            Rotation::Rotate180 => 180,
            Rotation::CounterClockwise90 => 270,
        }
    }
}

/// A decoded camera image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Pixel format
    pub format: ImageFormat,
    /// Packed pixel data, row-major, no padding
    pub data: Vec<u8>,
}

impl DecodedImage {
    /// Create an image from existing data
    pub fn from_data(width: u32, height: u32, format: ImageFormat, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            format,
            data,
        }
    }

    /// Bytes per row
    pub fn stride(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    /// Bytes of the pixel at `(x, y)`, if inside the image
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let bpp = self.format.bytes_per_pixel();
        let offset = y as usize * self.stride() + x as usize * bpp;
        self.data.get(offset..offset + bpp)
    }

    /// Apply a rotation in place.
    ///
    /// This is the only rotation code path; every decoder variant goes
    /// through it so they all rotate identically.
    pub fn rotate(&mut self, rotation: Rotation) {
        match rotation {
            Rotation::None => {}
            Rotation::Clockwise90 => self.rotate_90(true),
            Rotation::CounterClockwise90 => self.rotate_90(false),
            Rotation::Rotate180 => self.rotate_180(),
        }
    }

    /// Transpose with direction; width and height swap.
    fn rotate_90(&mut self, clockwise: bool) {
        let bpp = self.format.bytes_per_pixel();
        let width = self.width as usize;
        let height = self.height as usize;
        if self.data.len() < width * height * bpp {
            return;
        }

        let mut rotated = vec![0u8; width * height * bpp];
        // Destination is `height` pixels wide and `width` pixels tall.
        for dst_y in 0..width {
            for dst_x in 0..height {
                let (src_x, src_y) = if clockwise {
                    (dst_y, height - 1 - dst_x)
                } else {
                    (width - 1 - dst_y, dst_x)
                };
                let src = (src_y * width + src_x) * bpp;
                let dst = (dst_y * height + dst_x) * bpp;
                rotated[dst..dst + bpp].copy_from_slice(&self.data[src..src + bpp]);
            }
        }

        self.data = rotated;
        std::mem::swap(&mut self.width, &mut self.height);
    }

    /// Reverse pixel order in place.
    fn rotate_180(&mut self) {
        let bpp = self.format.bytes_per_pixel();
        let pixels = self.width as usize * self.height as usize;
        if self.data.len() < pixels * bpp {
            return;
        }

        if bpp == 1 {
            self.data[..pixels].reverse();
            return;
        }

        let (mut front, mut back) = (0usize, pixels.saturating_sub(1));
        while front < back {
            for i in 0..bpp {
                self.data.swap(front * bpp + i, back * bpp + i);
            }
            front += 1;
            back -= 1;
        }
    }
}
