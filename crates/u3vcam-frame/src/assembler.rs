//! Reassembly of a streamed image from bulk-in chunks.
//!
//! A frame arrives as a leader chunk, payload chunks until the expected image
//! size is reached, then one trailer chunk.

use bytes::{Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::pixels::{image_size, unpack_pixels, PixelGrid};
use crate::stream::{ImageLeader, ImageTrailer};

/// What a pushed chunk was taken as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkRole {
    Leader,
    Payload,
    Trailer,
    /// The frame was already complete; the chunk was dropped.
    Ignored,
}

/// Collects the chunks of one frame.
#[derive(Debug)]
pub struct FrameAssembler {
    expected: usize,
    leader: Option<Bytes>,
    payload: Vec<Bytes>,
    accumulated: usize,
    trailer: Option<Bytes>,
}

impl FrameAssembler {
    /// Assemble a frame whose payload totals `expected_payload` bytes.
    pub fn new(expected_payload: usize) -> Self {
        Self {
            expected: expected_payload,
            leader: None,
            payload: Vec::new(),
            accumulated: 0,
            trailer: None,
        }
    }

    /// Assemble a 16-bit image of the given geometry.
    pub fn for_image(width: u32, height: u32) -> Result<Self> {
        Ok(Self::new(image_size(width, height)?))
    }

    pub fn push(&mut self, chunk: Bytes) -> ChunkRole {
        if self.leader.is_none() {
            self.leader = Some(chunk);
            ChunkRole::Leader
        } else if !self.payload_complete() {
            self.accumulated += chunk.len();
            self.payload.push(chunk);
            ChunkRole::Payload
        } else if self.trailer.is_none() {
            self.trailer = Some(chunk);
            ChunkRole::Trailer
        } else {
            ChunkRole::Ignored
        }
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Payload bytes received so far.
    pub fn accumulated(&self) -> usize {
        self.accumulated
    }

    pub fn payload_complete(&self) -> bool {
        self.leader.is_some() && self.accumulated >= self.expected
    }

    /// Smallest length the next chunk may have, when it is payload.
    ///
    /// Every payload transfer but the one that finishes the image arrives at
    /// `max_transfer` bytes; a shorter one is a truncated read.
    pub fn min_payload_transfer(&self, max_transfer: usize) -> Option<usize> {
        if self.leader.is_none() || self.payload_complete() {
            return None;
        }
        Some(max_transfer.min(self.expected - self.accumulated))
    }

    pub fn is_complete(&self) -> bool {
        self.trailer.is_some()
    }

    pub fn finish(self) -> Result<AcquisitionFrame> {
        match (self.leader, self.trailer) {
            (Some(leader), Some(trailer)) => Ok(AcquisitionFrame {
                leader,
                payload_chunks: self.payload,
                trailer,
            }),
            _ => Err(FrameError::FrameIncomplete),
        }
    }
}

/// A fully received frame.
#[derive(Debug, Clone)]
pub struct AcquisitionFrame {
    pub leader: Bytes,
    pub payload_chunks: Vec<Bytes>,
    pub trailer: Bytes,
}

impl AcquisitionFrame {
    pub fn payload_len(&self) -> usize {
        self.payload_chunks.iter().map(Bytes::len).sum()
    }

    /// Payload chunks concatenated in arrival order.
    pub fn payload(&self) -> Bytes {
        if let [single] = self.payload_chunks.as_slice() {
            return single.clone();
        }
        let mut buf = BytesMut::with_capacity(self.payload_len());
        for chunk in &self.payload_chunks {
            buf.extend_from_slice(chunk);
        }
        buf.freeze()
    }

    pub fn leader_info(&self) -> Result<ImageLeader> {
        ImageLeader::parse(&self.leader)
    }

    pub fn trailer_info(&self) -> Result<ImageTrailer> {
        ImageTrailer::parse(&self.trailer)
    }

    pub fn unpack(&self, width: u32, height: u32) -> Result<PixelGrid> {
        unpack_pixels(&self.payload(), width, height)
    }
}
