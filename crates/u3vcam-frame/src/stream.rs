//! Image leader and trailer blocks framing each streamed payload.
//!
//! Both are parsed for diagnostics only; the acquisition path discards them.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{FrameError, Result};

/// Leader magic: "U3VL".
pub const LEADER_MAGIC: u32 = 0x4C56_3355;

/// Trailer magic: "U3VT".
pub const TRAILER_MAGIC: u32 = 0x5456_3355;

/// Generic leader (20) + image leader (32).
pub const IMAGE_LEADER_SIZE: usize = 52;

/// Generic trailer (28) + image trailer (4).
pub const IMAGE_TRAILER_SIZE: usize = 32;

/// Payload type of an uncompressed image block.
pub const PAYLOAD_TYPE_IMAGE: u16 = 0x0001;

/// Metadata announced ahead of an image payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageLeader {
    pub leader_size: u16,
    pub block_id: u64,
    pub payload_type: u16,
    pub timestamp: u64,
    pub pixel_format: u32,
    pub size_x: u32,
    pub size_y: u32,
    pub offset_x: u32,
    pub offset_y: u32,
    pub padding_x: u16,
}

impl ImageLeader {
    pub fn parse(src: &[u8]) -> Result<Self> {
        let mut buf = block(src, LEADER_MAGIC, IMAGE_LEADER_SIZE)?;
        buf.advance(2);
        let leader_size = buf.get_u16_le();
        let block_id = buf.get_u64_le();
        buf.advance(2);
        let payload_type = buf.get_u16_le();
        Ok(Self {
            leader_size,
            block_id,
            payload_type,
            timestamp: buf.get_u64_le(),
            pixel_format: buf.get_u32_le(),
            size_x: buf.get_u32_le(),
            size_y: buf.get_u32_le(),
            offset_x: buf.get_u32_le(),
            offset_y: buf.get_u32_le(),
            padding_x: buf.get_u16_le(),
        })
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(IMAGE_LEADER_SIZE);
        dst.put_u32_le(LEADER_MAGIC);
        dst.put_u16_le(0);
        dst.put_u16_le(self.leader_size);
        dst.put_u64_le(self.block_id);
        dst.put_u16_le(0);
        dst.put_u16_le(self.payload_type);
        dst.put_u64_le(self.timestamp);
        dst.put_u32_le(self.pixel_format);
        dst.put_u32_le(self.size_x);
        dst.put_u32_le(self.size_y);
        dst.put_u32_le(self.offset_x);
        dst.put_u32_le(self.offset_y);
        dst.put_u16_le(self.padding_x);
        dst.put_u16_le(0);
    }
}

/// Status block closing an image payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageTrailer {
    pub trailer_size: u16,
    pub block_id: u64,
    pub status: u16,
    pub valid_payload_size: u64,
    pub size_y: u32,
}

impl ImageTrailer {
    pub fn parse(src: &[u8]) -> Result<Self> {
        let mut buf = block(src, TRAILER_MAGIC, IMAGE_TRAILER_SIZE)?;
        buf.advance(2);
        let trailer_size = buf.get_u16_le();
        let block_id = buf.get_u64_le();
        let status = buf.get_u16_le();
        buf.advance(2);
        Ok(Self {
            trailer_size,
            block_id,
            status,
            valid_payload_size: buf.get_u64_le(),
            size_y: buf.get_u32_le(),
        })
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(IMAGE_TRAILER_SIZE);
        dst.put_u32_le(TRAILER_MAGIC);
        dst.put_u16_le(0);
        dst.put_u16_le(self.trailer_size);
        dst.put_u64_le(self.block_id);
        dst.put_u16_le(self.status);
        dst.put_u16_le(0);
        dst.put_u64_le(self.valid_payload_size);
        dst.put_u32_le(self.size_y);
    }
}

fn block(src: &[u8], magic: u32, size: usize) -> Result<&[u8]> {
    let mut buf = src.get(..size).ok_or(FrameError::FrameTooShort {
        expected: size,
        actual: src.len(),
    })?;
    let found = buf.get_u32_le();
    if found != magic {
        return Err(FrameError::InvalidPrefix { found });
    }
    Ok(buf)
}
