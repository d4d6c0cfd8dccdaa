use bytes::{BufMut, BytesMut};

use crate::error::{FrameError, Result};

/// Every supported pixel format is 16 bits wide on the wire.
pub const BYTES_PER_PIXEL: usize = 2;

/// A row-major grid of 16-bit pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelGrid {
    width: usize,
    height: usize,
    pixels: Vec<u16>,
}

/// Summary statistics over a grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelStats {
    pub min: u16,
    pub max: u16,
    pub mean: f64,
}

impl PixelGrid {
    /// Wrap row-major pixels; `pixels.len()` must equal `width * height`.
    pub fn new(width: usize, height: usize, pixels: Vec<u16>) -> Result<Self> {
        if width == 0 || height == 0 || width.checked_mul(height) != Some(pixels.len()) {
            return Err(FrameError::InvalidGeometry {
                width: width as u32,
                height: height as u32,
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Total number of pixels (`height * width`).
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn get(&self, row: usize, col: usize) -> Option<u16> {
        if row >= self.height || col >= self.width {
            return None;
        }
        self.pixels.get(row * self.width + col).copied()
    }

    pub fn row(&self, row: usize) -> Option<&[u16]> {
        let start = row.checked_mul(self.width)?;
        self.pixels.get(start..start + self.width)
    }

    pub fn rows(&self) -> impl Iterator<Item = &[u16]> {
        self.pixels.chunks_exact(self.width)
    }

    pub fn as_slice(&self) -> &[u16] {
        &self.pixels
    }

    pub fn into_vec(self) -> Vec<u16> {
        self.pixels
    }

    pub fn stats(&self) -> PixelStats {
        let mut min = u16::MAX;
        let mut max = u16::MIN;
        let mut sum = 0u64;
        for &px in &self.pixels {
            min = min.min(px);
            max = max.max(px);
            sum += u64::from(px);
        }
        PixelStats {
            min,
            max,
            mean: sum as f64 / self.pixels.len() as f64,
        }
    }

    /// Serialise pixels back into the wire byte order [`unpack_pixels`] reads.
    pub fn to_wire_bytes(&self) -> BytesMut {
        let mut dst = BytesMut::with_capacity(self.pixels.len() * BYTES_PER_PIXEL);
        for &px in &self.pixels {
            dst.put_u8((px & 0xFF) as u8);
            dst.put_u8((px >> 8) as u8);
        }
        dst
    }
}

/// Number of payload bytes an image of this geometry occupies.
pub fn image_size(width: u32, height: u32) -> Result<usize> {
    let invalid = FrameError::InvalidGeometry { width, height };
    if width == 0 || height == 0 {
        return Err(invalid);
    }
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(BYTES_PER_PIXEL))
        .ok_or(invalid)
}

/// Unpack 16-bit pixels from the concatenated payload.
///
/// Each pixel is the pair `(bytes[i + 1], bytes[i])` taken as (high, low), so
/// `[0x00, 0x10]` yields `0x1000`. Bytes beyond `width * height * 2` are ignored.
pub fn unpack_pixels(data: &[u8], width: u32, height: u32) -> Result<PixelGrid> {
    let needed = image_size(width, height)?;
    let data = data.get(..needed).ok_or(FrameError::PixelBufferTooShort {
        expected: needed,
        actual: data.len(),
    })?;

    let pixels = data
        .chunks_exact(BYTES_PER_PIXEL)
        .map(|pair| (u16::from(pair[1]) << 8) | u16::from(pair[0]))
        .collect();

    PixelGrid::new(width as usize, height as usize, pixels)
}
