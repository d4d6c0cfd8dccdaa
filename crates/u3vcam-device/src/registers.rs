//! Register access over the control pipes.
//!
//! The protocol carries a request id but devices are not known to honour it,
//! so at most one command is ever in flight: the control lock is held from
//! the moment a command is written until its acknowledgment has been read.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use u3vcam_frame::command::{ack_for, command_name};
use u3vcam_frame::{
    decode_status, encode_read, encode_write, read_result, AckHeader, FrameError, HEADER_SIZE,
    READMEM_CMD, WRITEMEM_CMD,
};
use u3vcam_transport::{BulkTransport, Channel, TransportError};

use crate::error::{DeviceError, Result};

/// Pending acknowledgments tolerated per command by default.
pub const DEFAULT_PENDING_ACK_LIMIT: u32 = 16;

/// Request ids for one attachment; id 0 is never issued.
#[derive(Debug, Default)]
struct RequestIds {
    last: u16,
}

impl RequestIds {
    fn next(&mut self) -> u16 {
        self.last = self.last.wrapping_add(1).max(1);
        self.last
    }
}

/// Serialised register reads and writes against one attached device.
#[derive(Debug)]
pub struct RegisterClient<T> {
    transport: Arc<T>,
    control: Mutex<RequestIds>,
    detached: CancellationToken,
    pending_ack_limit: u32,
}

impl<T: BulkTransport> RegisterClient<T> {
    /// Wrap a transport. Cancelling `detached` fails every call in flight
    /// and every later call with [`DeviceError::Detached`].
    pub fn new(transport: Arc<T>, detached: CancellationToken) -> Self {
        Self {
            transport,
            control: Mutex::new(RequestIds::default()),
            detached,
            pending_ack_limit: DEFAULT_PENDING_ACK_LIMIT,
        }
    }

    pub fn with_pending_ack_limit(mut self, limit: u32) -> Self {
        self.pending_ack_limit = limit;
        self
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn is_detached(&self) -> bool {
        self.detached.is_cancelled()
    }

    /// Read a 64-bit register.
    pub async fn read_register(&self, address: u64) -> Result<i64> {
        let ack = self.read_memory(address, 8).await?;
        let mut value = [0u8; 8];
        value.copy_from_slice(read_result(&ack, 8)?);
        Ok(i64::from_le_bytes(value))
    }

    /// Read a 32-bit size or offset register.
    pub async fn read_block_size(&self, address: u64) -> Result<i32> {
        let ack = self.read_memory(address, 4).await?;
        let mut value = [0u8; 4];
        value.copy_from_slice(read_result(&ack, 4)?);
        Ok(i32::from_le_bytes(value))
    }

    /// Write a register and return the device's status code.
    ///
    /// A non-zero status is returned, not raised.
    pub async fn write_register(&self, address: u64, value: i32) -> Result<i16> {
        let mut ids = self.control.lock().await;
        let request_id = ids.next();
        let ack = self
            .transact(WRITEMEM_CMD, encode_write(address, value, request_id))
            .await?;
        let status = decode_status(&ack)?;
        trace!(
            address = format_args!("{address:#x}"),
            value,
            request_id,
            status,
            "register written"
        );
        Ok(status)
    }

    /// Write a register, logging a non-zero status instead of failing.
    pub async fn write_logged(
        &self,
        register: &'static str,
        address: u64,
        value: i32,
    ) -> Result<i16> {
        let status = self.write_register(address, value).await?;
        if status != 0 {
            warn!(
                register,
                address = format_args!("{address:#x}"),
                value,
                status,
                "register write rejected"
            );
        }
        Ok(status)
    }

    /// Read one transfer from the stream pipe.
    ///
    /// Stream reads do not take the control lock.
    pub async fn read_stream(&self) -> Result<Bytes> {
        let read = self.transport.receive(Channel::StreamIn);
        self.guarded(read).await
    }

    /// Largest transfer the stream pipe delivers.
    pub fn max_stream_transfer(&self) -> usize {
        self.transport.max_transfer_size(Channel::StreamIn)
    }

    async fn read_memory(&self, address: u64, byte_count: u16) -> Result<Bytes> {
        let mut ids = self.control.lock().await;
        let request_id = ids.next();
        let ack = self
            .transact(READMEM_CMD, encode_read(address, byte_count, request_id))
            .await?;
        let needed = HEADER_SIZE + usize::from(byte_count);
        if ack.len() < needed {
            return Err(FrameError::FrameTooShort {
                expected: needed,
                actual: ack.len(),
            }
            .into());
        }
        trace!(
            address = format_args!("{address:#x}"),
            byte_count,
            request_id,
            "register read"
        );
        Ok(ack)
    }

    /// Send one command and return its final acknowledgment.
    ///
    /// Callers hold the control lock for the whole exchange.
    async fn transact(&self, command: u16, cmd: Bytes) -> Result<Bytes> {
        let written = self.guarded(self.transport.send(&cmd)).await?;
        if written != cmd.len() {
            return Err(TransportError::ShortWrite {
                written,
                expected: cmd.len(),
            }
            .into());
        }

        let expected = ack_for(command);
        let mut pending = 0;
        loop {
            let read = self.transport.receive(Channel::ControlIn);
            let ack = self.guarded(read).await?;
            let header = AckHeader::decode(&ack)?;
            if header.is_pending() {
                pending += 1;
                if pending > self.pending_ack_limit {
                    return Err(DeviceError::PendingAckLimit(self.pending_ack_limit));
                }
                debug!(
                    pending,
                    request_id = header.request_id,
                    "device asked for more time"
                );
                continue;
            }
            if header.command_code != expected {
                return Err(FrameError::UnexpectedCommand {
                    expected,
                    found: header.command_code,
                }
                .into());
            }
            if command == READMEM_CMD && header.status != 0 {
                warn!(
                    status = header.status,
                    command = command_name(command),
                    "read acknowledged with non-zero status"
                );
            }
            return Ok(ack);
        }
    }

    /// Await a transport call unless the attachment is torn down first.
    async fn guarded<R>(
        &self,
        call: impl Future<Output = u3vcam_transport::Result<R>>,
    ) -> Result<R> {
        if self.detached.is_cancelled() {
            return Err(DeviceError::Detached);
        }
        tokio::select! {
            biased;
            _ = self.detached.cancelled() => Err(DeviceError::Detached),
            result = call => result.map_err(DeviceError::from),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use bytes::BytesMut;
    use u3vcam_frame::codec::PREFIX;
    use u3vcam_frame::{decode_read, decode_write, PENDING_ACK, READMEM_ACK, WRITEMEM_ACK};
    use u3vcam_transport::{MockTransport, TransportCall};

    use super::*;

    /// Build an acknowledgment frame as a device would send it.
    pub(crate) fn ack(command_code: u16, status: i16, request_id: u16, data: &[u8]) -> Bytes {
        let mut dst = BytesMut::new();
        AckHeader {
            prefix: PREFIX,
            status,
            command_code,
            payload_length: data.len() as u16,
            request_id,
        }
        .encode(&mut dst);
        dst.extend_from_slice(data);
        dst.freeze()
    }

    pub(crate) fn read_ack(value: i64) -> Bytes {
        ack(READMEM_ACK, 0, 0, &value.to_le_bytes())
    }

    pub(crate) fn block_ack(value: i32) -> Bytes {
        ack(READMEM_ACK, 0, 0, &value.to_le_bytes())
    }

    pub(crate) fn write_ack(status: i16) -> Bytes {
        ack(WRITEMEM_ACK, status, 0, &[])
    }

    fn client(mock: &Arc<MockTransport>) -> RegisterClient<MockTransport> {
        RegisterClient::new(Arc::clone(mock), CancellationToken::new())
    }

    #[tokio::test]
    async fn read_register_sends_read_and_decodes_trailing_bytes() {
        let mock = Arc::new(MockTransport::new());
        mock.push_control(read_ack(0x1_0000));
        let client = client(&mock);

        assert_eq!(client.read_register(0x1D8).await.unwrap(), 0x1_0000);

        let sent = mock.sent();
        let (header, payload) = decode_read(&sent[0]).unwrap();
        assert_eq!(header.request_id, 1);
        assert_eq!(payload.address, 0x1D8);
        assert_eq!(payload.byte_count, 8);
    }

    #[tokio::test]
    async fn read_block_size_uses_four_bytes() {
        let mock = Arc::new(MockTransport::new());
        mock.push_control(block_ack(52));
        let client = client(&mock);

        assert_eq!(client.read_block_size(0x2_0010).await.unwrap(), 52);
        let (_, payload) = decode_read(&mock.sent()[0]).unwrap();
        assert_eq!(payload.byte_count, 4);
    }

    #[tokio::test]
    async fn write_returns_status_and_increments_request_id() {
        let mock = Arc::new(MockTransport::new());
        mock.push_control(write_ack(0));
        mock.push_control(write_ack(3));
        let client = client(&mock);

        assert_eq!(client.write_register(0x40024, 1).await.unwrap(), 0);
        assert_eq!(client.write_register(0x40044, 1).await.unwrap(), 3);

        let sent = mock.sent();
        let (first, payload) = decode_write(&sent[0]).unwrap();
        let (second, _) = decode_write(&sent[1]).unwrap();
        assert_eq!(payload.address, 0x40024);
        assert_eq!(payload.data, 1);
        assert_eq!((first.request_id, second.request_id), (1, 2));
    }

    #[tokio::test]
    async fn short_read_ack_is_protocol_error() {
        let mock = Arc::new(MockTransport::new());
        mock.push_control(ack(READMEM_ACK, 0, 1, &[1, 2, 3]));
        let err = client(&mock).read_register(0x1D8).await.unwrap_err();
        assert!(matches!(
            err,
            DeviceError::Protocol(FrameError::FrameTooShort { .. })
        ));
    }

    #[tokio::test]
    async fn truncated_ack_header_is_protocol_error() {
        let mock = Arc::new(MockTransport::new());
        mock.push_control(Bytes::from_static(&[0x55, 0x33, 0x56]));
        let err = client(&mock).write_register(0x40024, 1).await.unwrap_err();
        assert!(matches!(
            err,
            DeviceError::Protocol(FrameError::FrameTooShort { .. })
        ));
    }

    #[tokio::test]
    async fn pending_acks_are_skipped() {
        let mock = Arc::new(MockTransport::new());
        mock.push_control(ack(PENDING_ACK, 0, 1, &[0; 4]));
        mock.push_control(ack(PENDING_ACK, 0, 1, &[0; 4]));
        mock.push_control(write_ack(0));
        let client = client(&mock);
        assert_eq!(client.write_register(0x40024, 1).await.unwrap(), 0);
        assert_eq!(mock.pending(Channel::ControlIn), 0);
    }

    #[tokio::test]
    async fn pending_ack_limit_is_enforced() {
        let mock = Arc::new(MockTransport::new());
        for _ in 0..3 {
            mock.push_control(ack(PENDING_ACK, 0, 1, &[0; 4]));
        }
        let client = client(&mock).with_pending_ack_limit(2);
        let err = client.write_register(0x40024, 1).await.unwrap_err();
        assert!(matches!(err, DeviceError::PendingAckLimit(2)));
    }

    #[tokio::test]
    async fn mismatched_ack_is_rejected() {
        let mock = Arc::new(MockTransport::new());
        mock.push_control(write_ack(0));
        let err = client(&mock).read_register(0x1D8).await.unwrap_err();
        assert!(matches!(
            err,
            DeviceError::Protocol(FrameError::UnexpectedCommand { .. })
        ));
    }

    #[tokio::test]
    async fn concurrent_calls_do_not_interleave() {
        let mock = Arc::new(MockTransport::new());
        mock.push_control(read_ack(7));
        mock.push_control(write_ack(0));
        mock.push_control(read_ack(9));
        let client = client(&mock);

        let (a, b, c) = tokio::join!(
            client.read_register(0x1D8),
            client.write_register(0x40024, 1),
            client.read_register(0x1E0),
        );
        assert_eq!(a.unwrap(), 7);
        assert_eq!(b.unwrap(), 0);
        assert_eq!(c.unwrap(), 9);

        let calls = mock.calls();
        assert_eq!(calls.len(), 6);
        for pair in calls.chunks(2) {
            assert!(matches!(pair[0], TransportCall::Send(_)));
            assert_eq!(pair[1], TransportCall::Receive(Channel::ControlIn));
        }
    }

    #[tokio::test]
    async fn detached_token_fails_fast() {
        let mock = Arc::new(MockTransport::new());
        let token = CancellationToken::new();
        let client = RegisterClient::new(Arc::clone(&mock), token.clone());
        token.cancel();

        assert!(matches!(
            client.read_register(0x1D8).await,
            Err(DeviceError::Detached)
        ));
        assert!(client.is_detached());
        assert_eq!(mock.pending(Channel::ControlIn), 0);
    }

    #[tokio::test]
    async fn transport_detach_maps_to_detached() {
        let mock = Arc::new(MockTransport::new());
        mock.detach();
        assert!(matches!(
            client(&mock).write_register(0x40024, 1).await,
            Err(DeviceError::Detached)
        ));
    }
}
