//! USB3 Vision control-channel codec and image stream framing.
//!
//! Every control command is framed with:
//! - A 4-byte little-endian prefix ("U3VC")
//! - 2-byte flags, command code, payload length and request id
//! - A command-specific payload (register address plus count or data)
//!
//! Acknowledgments share the layout, with a signed status code in place of the
//! flags. The stream side reassembles leader, payload and trailer chunks and
//! unpacks 16-bit pixels.

pub mod assembler;
pub mod codec;
pub mod command;
pub mod error;
pub mod pixels;
pub mod stream;

pub use assembler::{AcquisitionFrame, ChunkRole, FrameAssembler};
pub use codec::{
    decode_i32, decode_i64, decode_read, decode_status, decode_write, encode_read, encode_write,
    read_result, AckHeader, CommandHeader, ReadRegisterPayload, WriteRegisterPayload, HEADER_SIZE,
    PREFIX,
};
pub use command::{PENDING_ACK, READMEM_ACK, READMEM_CMD, WRITEMEM_ACK, WRITEMEM_CMD};
pub use error::{FrameError, Result};
pub use pixels::{image_size, unpack_pixels, PixelGrid, PixelStats, BYTES_PER_PIXEL};
pub use stream::{ImageLeader, ImageTrailer};
