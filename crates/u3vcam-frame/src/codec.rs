use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::command::{FLAG_REQUEST_ACK, PENDING_ACK, READMEM_CMD, WRITEMEM_CMD};
use crate::error::{FrameError, Result};

/// Magic prefix carried by every command and acknowledgment: "U3VC".
pub const PREFIX: u32 = 0x4356_3355;

/// Command header: prefix (4) + flags (2) + command (2) + length (2) + request id (2).
pub const HEADER_SIZE: usize = 12;

/// Read payload: address (8) + reserved (2) + byte count (2).
pub const READ_PAYLOAD_SIZE: usize = 12;

/// Write payload as declared in the header: address (8) + data (4).
pub const WRITE_PAYLOAD_SIZE: usize = 12;

/// Zero bytes trailing the write payload on the wire.
///
/// The captured host driver sent its payload struct at its aligned size
/// (16 bytes) while declaring 12 in the header; devices accept and ignore
/// the tail, so it is reproduced for bit-exact traffic.
pub const WRITE_PADDING: usize = 4;

/// Offset of the status code inside an acknowledgment.
pub const STATUS_OFFSET: usize = 4;

/// Fixed header preceding every command sent to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandHeader {
    pub prefix: u32,
    pub flags: u16,
    pub command_code: u16,
    pub payload_length: u16,
    pub request_id: u16,
}

impl CommandHeader {
    /// Create a header that requests an acknowledgment.
    pub fn new(command_code: u16, payload_length: u16, request_id: u16) -> Self {
        Self {
            prefix: PREFIX,
            flags: FLAG_REQUEST_ACK,
            command_code,
            payload_length,
            request_id,
        }
    }

    /// Whether the device is asked to acknowledge this command.
    pub fn requests_ack(&self) -> bool {
        self.flags & FLAG_REQUEST_ACK != 0
    }

    /// Append the header in wire order.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(HEADER_SIZE);
        dst.put_u32_le(self.prefix);
        dst.put_u16_le(self.flags);
        dst.put_u16_le(self.command_code);
        dst.put_u16_le(self.payload_length);
        dst.put_u16_le(self.request_id);
    }

    /// Decode and validate a header from the start of `src`.
    pub fn decode(src: &[u8]) -> Result<Self> {
        let mut buf = take(src, 0, HEADER_SIZE)?;
        let prefix = buf.get_u32_le();
        if prefix != PREFIX {
            return Err(FrameError::InvalidPrefix { found: prefix });
        }
        Ok(Self {
            prefix,
            flags: buf.get_u16_le(),
            command_code: buf.get_u16_le(),
            payload_length: buf.get_u16_le(),
            request_id: buf.get_u16_le(),
        })
    }
}

/// Payload of a READMEM command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRegisterPayload {
    pub address: u64,
    pub reserved: u16,
    pub byte_count: u16,
}

impl ReadRegisterPayload {
    pub fn new(address: u64, byte_count: u16) -> Self {
        Self {
            address,
            reserved: 0,
            byte_count,
        }
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(READ_PAYLOAD_SIZE);
        dst.put_u64_le(self.address);
        dst.put_u16_le(self.reserved);
        dst.put_u16_le(self.byte_count);
    }

    pub fn decode(src: &[u8]) -> Result<Self> {
        let mut buf = take(src, 0, READ_PAYLOAD_SIZE)?;
        Ok(Self {
            address: buf.get_u64_le(),
            reserved: buf.get_u16_le(),
            byte_count: buf.get_u16_le(),
        })
    }
}

/// Payload of a WRITEMEM command carrying one 32-bit value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteRegisterPayload {
    pub address: u64,
    pub data: i32,
}

impl WriteRegisterPayload {
    pub fn new(address: u64, data: i32) -> Self {
        Self { address, data }
    }

    /// Append address, data and the trailing padding.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(WRITE_PAYLOAD_SIZE + WRITE_PADDING);
        dst.put_u64_le(self.address);
        dst.put_i32_le(self.data);
        dst.put_bytes(0, WRITE_PADDING);
    }

    /// Decode address and data; the padding is optional on input.
    pub fn decode(src: &[u8]) -> Result<Self> {
        let mut buf = take(src, 0, WRITE_PAYLOAD_SIZE)?;
        Ok(Self {
            address: buf.get_u64_le(),
            data: buf.get_i32_le(),
        })
    }
}

/// Header of a device acknowledgment.
///
/// Acknowledgments reuse the command layout with the flags field replaced
/// by a status code, so the status always sits at [`STATUS_OFFSET`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckHeader {
    pub prefix: u32,
    pub status: i16,
    pub command_code: u16,
    pub payload_length: u16,
    pub request_id: u16,
}

impl AckHeader {
    pub fn decode(src: &[u8]) -> Result<Self> {
        let mut buf = take(src, 0, HEADER_SIZE)?;
        let prefix = buf.get_u32_le();
        if prefix != PREFIX {
            return Err(FrameError::InvalidPrefix { found: prefix });
        }
        Ok(Self {
            prefix,
            status: buf.get_i16_le(),
            command_code: buf.get_u16_le(),
            payload_length: buf.get_u16_le(),
            request_id: buf.get_u16_le(),
        })
    }

    /// The device asked for more time; the real acknowledgment follows.
    pub fn is_pending(&self) -> bool {
        self.command_code == PENDING_ACK
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(HEADER_SIZE);
        dst.put_u32_le(self.prefix);
        dst.put_i16_le(self.status);
        dst.put_u16_le(self.command_code);
        dst.put_u16_le(self.payload_length);
        dst.put_u16_le(self.request_id);
    }
}

/// Encode a READMEM command for `byte_count` bytes at `address`.
///
/// Wire format:
/// ```text
/// ┌────────────┬─────────┬─────────┬─────────┬─────────┬────────────┬──────────┬────────────┐
/// │ Prefix     │ Flags   │ Command │ Length  │ Req ID  │ Address    │ Reserved │ Byte count │
/// │ (4B LE)    │ (2B LE) │ 0x0800  │ 12      │ (2B LE) │ (8B LE)    │ 0        │ (2B LE)    │
/// └────────────┴─────────┴─────────┴─────────┴─────────┴────────────┴──────────┴────────────┘
/// ```
pub fn encode_read(address: u64, byte_count: u16, request_id: u16) -> Bytes {
    let mut dst = BytesMut::with_capacity(HEADER_SIZE + READ_PAYLOAD_SIZE);
    CommandHeader::new(READMEM_CMD, READ_PAYLOAD_SIZE as u16, request_id).encode(&mut dst);
    ReadRegisterPayload::new(address, byte_count).encode(&mut dst);
    dst.freeze()
}

/// Encode a WRITEMEM command storing `value` at `address`.
pub fn encode_write(address: u64, value: i32, request_id: u16) -> Bytes {
    let mut dst = BytesMut::with_capacity(HEADER_SIZE + WRITE_PAYLOAD_SIZE + WRITE_PADDING);
    CommandHeader::new(WRITEMEM_CMD, WRITE_PAYLOAD_SIZE as u16, request_id).encode(&mut dst);
    WriteRegisterPayload::new(address, value).encode(&mut dst);
    dst.freeze()
}

/// Decode a READMEM command produced by [`encode_read`].
pub fn decode_read(src: &[u8]) -> Result<(CommandHeader, ReadRegisterPayload)> {
    let header = expect_command(src, READMEM_CMD)?;
    let payload = ReadRegisterPayload::decode(&src[HEADER_SIZE..])?;
    Ok((header, payload))
}

/// Decode a WRITEMEM command produced by [`encode_write`].
pub fn decode_write(src: &[u8]) -> Result<(CommandHeader, WriteRegisterPayload)> {
    let header = expect_command(src, WRITEMEM_CMD)?;
    let payload = WriteRegisterPayload::decode(&src[HEADER_SIZE..])?;
    Ok((header, payload))
}

/// Extract the 2-byte status from a write acknowledgment.
pub fn decode_status(src: &[u8]) -> Result<i16> {
    Ok(take(src, STATUS_OFFSET, 2)?.get_i16_le())
}

/// The `byte_count` bytes of register data at the end of a read acknowledgment.
pub fn read_result(src: &[u8], byte_count: usize) -> Result<&[u8]> {
    let start = src
        .len()
        .checked_sub(byte_count)
        .ok_or(FrameError::FrameTooShort {
            expected: byte_count,
            actual: src.len(),
        })?;
    Ok(&src[start..])
}

/// Interpret the trailing 8 bytes of a read acknowledgment.
pub fn decode_i64(src: &[u8]) -> Result<i64> {
    Ok(read_result(src, 8)?.get_i64_le())
}

/// Interpret the trailing 4 bytes of a read acknowledgment.
pub fn decode_i32(src: &[u8]) -> Result<i32> {
    Ok(read_result(src, 4)?.get_i32_le())
}

fn expect_command(src: &[u8], expected: u16) -> Result<CommandHeader> {
    let header = CommandHeader::decode(src)?;
    if header.command_code != expected {
        return Err(FrameError::UnexpectedCommand {
            expected,
            found: header.command_code,
        });
    }
    Ok(header)
}

fn take(src: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    let end = offset + len;
    match src.get(offset..end) {
        Some(bytes) => Ok(bytes),
        None => Err(FrameError::FrameTooShort {
            expected: end,
            actual: src.len(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{READMEM_ACK, WRITEMEM_ACK};

    #[test]
    fn encode_read_layout() {
        let cmd = encode_read(0x1D8, 8, 7);
        assert_eq!(cmd.len(), HEADER_SIZE + READ_PAYLOAD_SIZE);
        assert_eq!(
            cmd.as_ref(),
            &[
                0x55, 0x33, 0x56, 0x43, // prefix
                0x00, 0x40, // flags
                0x00, 0x08, // READMEM
                0x0C, 0x00, // length
                0x07, 0x00, // request id
                0xD8, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // address
                0x00, 0x00, // reserved
                0x08, 0x00, // byte count
            ]
        );
    }

    #[test]
    fn encode_write_layout() {
        let cmd = encode_write(0x40024, 1, 0x0102);
        assert_eq!(cmd.len(), HEADER_SIZE + WRITE_PAYLOAD_SIZE + WRITE_PADDING);
        assert_eq!(&cmd[6..8], &[0x02, 0x08]);
        assert_eq!(&cmd[8..10], &[0x0C, 0x00]);
        assert_eq!(&cmd[10..12], &[0x02, 0x01]);
        assert_eq!(&cmd[12..20], &[0x24, 0x00, 0x04, 0x00, 0, 0, 0, 0]);
        assert_eq!(&cmd[20..24], &[0x01, 0x00, 0x00, 0x00]);
        assert_eq!(&cmd[24..], &[0, 0, 0, 0]);
    }

    #[test]
    fn write_roundtrip_preserves_address_and_value() {
        let cases = [
            (0u64, 0i32),
            (0x1D8, 1),
            (0xC02E4, -1),
            (u64::MAX, i32::MIN),
            (0x0000_0001_0002_0003, i32::MAX),
        ];
        for (address, value) in cases {
            let (header, payload) = decode_write(&encode_write(address, value, 9)).unwrap();
            assert_eq!(payload.address, address);
            assert_eq!(payload.data, value);
            assert_eq!(header.request_id, 9);
            assert!(header.requests_ack());
        }
    }

    #[test]
    fn write_encoding_keeps_every_address_and_value_bit() {
        let addresses = (0..64)
            .map(|bit| 1u64 << bit)
            .chain([0, u64::MAX, u64::from(u32::MAX), (1 << 63) | 1]);
        let values: Vec<i32> = (0..32)
            .map(|bit| 1i32 << bit)
            .chain([0, -1, i32::MIN, i32::MAX, i32::MIN + 1])
            .collect();

        let mut request_id = 0u16;
        for address in addresses {
            for &value in &values {
                request_id = request_id.wrapping_add(1);
                let cmd = encode_write(address, value, request_id);
                assert_eq!(cmd.len(), HEADER_SIZE + WRITE_PAYLOAD_SIZE + WRITE_PADDING);
                let (payload, padding) = cmd[HEADER_SIZE..].split_at(WRITE_PAYLOAD_SIZE);
                assert_eq!(payload[..8], address.to_le_bytes());
                assert_eq!(payload[8..], value.to_le_bytes());
                assert_eq!(padding, [0u8; WRITE_PADDING]);

                let (header, payload) = decode_write(&cmd).unwrap();
                assert_eq!((payload.address, payload.data), (address, value));
                assert_eq!(header.request_id, request_id);
            }
        }
    }

    #[test]
    fn read_roundtrip_preserves_fields() {
        let (header, payload) = decode_read(&encode_read(0x2_0010, 4, 3)).unwrap();
        assert_eq!(header.command_code, READMEM_CMD);
        assert_eq!(header.payload_length, READ_PAYLOAD_SIZE as u16);
        assert_eq!(payload, ReadRegisterPayload::new(0x2_0010, 4));
    }

    #[test]
    fn decode_rejects_bad_prefix() {
        let mut cmd = encode_read(0, 8, 1).to_vec();
        cmd[0] = 0;
        assert!(matches!(
            decode_read(&cmd),
            Err(FrameError::InvalidPrefix { .. })
        ));
    }

    #[test]
    fn decode_rejects_wrong_command() {
        let cmd = encode_read(0, 8, 1);
        assert_eq!(
            decode_write(&cmd).unwrap_err(),
            FrameError::UnexpectedCommand {
                expected: WRITEMEM_CMD,
                found: READMEM_CMD,
            }
        );
    }

    #[test]
    fn decode_truncated_write_is_error_not_panic() {
        let cmd = encode_write(0x1000, 5, 1);
        assert!(matches!(
            decode_write(&cmd[..18]),
            Err(FrameError::FrameTooShort { .. })
        ));
    }

    #[test]
    fn status_at_offset_four() {
        let mut ack = BytesMut::new();
        AckHeader {
            prefix: PREFIX,
            status: 0x0A01,
            command_code: WRITEMEM_ACK,
            payload_length: 4,
            request_id: 2,
        }
        .encode(&mut ack);
        ack.put_u16_le(0);
        ack.put_u16_le(4);

        assert_eq!(decode_status(&ack).unwrap(), 0x0A01);
        let header_only = [0x55, 0x33, 0x56, 0x43, 0x00, 0x00];
        assert_eq!(decode_status(&header_only).unwrap(), 0);
    }

    #[test]
    fn status_short_frame() {
        assert_eq!(
            decode_status(&[0x55, 0x33, 0x56, 0x43, 0x00]).unwrap_err(),
            FrameError::FrameTooShort {
                expected: 6,
                actual: 5,
            }
        );
    }

    #[test]
    fn read_values_come_from_the_tail() {
        let mut ack = BytesMut::new();
        AckHeader {
            prefix: PREFIX,
            status: 0,
            command_code: READMEM_ACK,
            payload_length: 8,
            request_id: 1,
        }
        .encode(&mut ack);
        ack.put_i64_le(0x0000_0000_0002_0000);

        assert_eq!(decode_i64(&ack).unwrap(), 0x2_0000);
        assert_eq!(decode_i32(&[0, 0, 0x10, 0x27, 0, 0]).unwrap(), 10000);
        assert!(matches!(
            decode_i64(&[1, 2, 3]),
            Err(FrameError::FrameTooShort {
                expected: 8,
                actual: 3
            })
        ));
    }

    #[test]
    fn ack_header_pending() {
        let mut ack = BytesMut::new();
        AckHeader {
            prefix: PREFIX,
            status: 0,
            command_code: PENDING_ACK,
            payload_length: 4,
            request_id: 5,
        }
        .encode(&mut ack);

        let header = AckHeader::decode(&ack).unwrap();
        assert!(header.is_pending());
        assert_eq!(header.request_id, 5);
    }
}
