//! Scripted in-memory transport for exercising protocol code without hardware.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};

use bytes::Bytes;

use crate::error::{Result, TransportError};
use crate::traits::{BulkTransport, Channel};

const DEFAULT_MAX_TRANSFER: usize = 64 * 1024;

/// One observed transport call, in the order it was issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Send(Bytes),
    Receive(Channel),
}

/// A transport that replays scripted inbound transfers and records every call.
///
/// Each call yields to the scheduler once before completing, so callers that
/// fail to serialise their traffic show up as interleaved entries in
/// [`MockTransport::calls`].
#[derive(Debug)]
pub struct MockTransport {
    state: Mutex<MockState>,
    max_transfer: usize,
}

#[derive(Debug, Default)]
struct MockState {
    control: VecDeque<Result<Bytes>>,
    stream: VecDeque<Result<Bytes>>,
    calls: Vec<TransportCall>,
    detached: bool,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::with_max_transfer_size(DEFAULT_MAX_TRANSFER)
    }

    pub fn with_max_transfer_size(max_transfer: usize) -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            max_transfer,
        }
    }

    /// Queue an acknowledgment for the control-in channel.
    pub fn push_control(&self, response: impl Into<Bytes>) {
        self.lock().control.push_back(Ok(response.into()));
    }

    /// Queue a failure for the next control-in read.
    pub fn push_control_error(&self, err: TransportError) {
        self.lock().control.push_back(Err(err));
    }

    /// Queue a transfer for the stream-in channel.
    pub fn push_stream(&self, chunk: impl Into<Bytes>) {
        self.lock().stream.push_back(Ok(chunk.into()));
    }

    /// Queue a failure for the next stream-in read.
    pub fn push_stream_error(&self, err: TransportError) {
        self.lock().stream.push_back(Err(err));
    }

    /// Make every subsequent call fail with [`TransportError::Detached`].
    pub fn detach(&self) {
        self.lock().detached = true;
    }

    /// All calls observed so far.
    pub fn calls(&self) -> Vec<TransportCall> {
        self.lock().calls.clone()
    }

    /// Payloads written to the control-out pipe, in order.
    pub fn sent(&self) -> Vec<Bytes> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                TransportCall::Send(bytes) => Some(bytes.clone()),
                TransportCall::Receive(_) => None,
            })
            .collect()
    }

    /// Number of scripted transfers not yet consumed on a channel.
    pub fn pending(&self, channel: Channel) -> usize {
        let state = self.lock();
        match channel {
            Channel::ControlIn => state.control.len(),
            Channel::StreamIn => state.stream.len(),
            Channel::ControlOut => 0,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl BulkTransport for MockTransport {
    fn send(&self, data: &[u8]) -> impl Future<Output = Result<usize>> + Send {
        let outcome = {
            let mut state = self.lock();
            let sent = Bytes::copy_from_slice(data);
            state.calls.push(TransportCall::Send(sent));
            if state.detached {
                Err(TransportError::Detached)
            } else {
                Ok(data.len())
            }
        };
        async move {
            tokio::task::yield_now().await;
            outcome
        }
    }

    fn receive(&self, channel: Channel) -> impl Future<Output = Result<Bytes>> + Send {
        let outcome = {
            let mut state = self.lock();
            state.calls.push(TransportCall::Receive(channel));
            if state.detached {
                Err(TransportError::Detached)
            } else {
                let queue = match channel {
                    Channel::ControlIn => Some(&mut state.control),
                    Channel::StreamIn => Some(&mut state.stream),
                    Channel::ControlOut => None,
                };
                queue
                    .and_then(|queue| queue.pop_front())
                    .unwrap_or(Err(TransportError::Shutdown))
            }
        };
        async move {
            tokio::task::yield_now().await;
            outcome
        }
    }

    fn max_transfer_size(&self, _channel: Channel) -> usize {
        self.max_transfer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_scripted_transfers_in_order() {
        let mock = MockTransport::new();
        mock.push_control(Bytes::from_static(b"ack-1"));
        mock.push_control(Bytes::from_static(b"ack-2"));
        mock.push_stream(Bytes::from_static(b"leader"));

        assert_eq!(mock.send(b"cmd").await.unwrap(), 3);
        assert_eq!(mock.receive(Channel::ControlIn).await.unwrap(), "ack-1");
        assert_eq!(mock.receive(Channel::StreamIn).await.unwrap(), "leader");
        assert_eq!(mock.receive(Channel::ControlIn).await.unwrap(), "ack-2");

        assert_eq!(
            mock.calls(),
            vec![
                TransportCall::Send(Bytes::from_static(b"cmd")),
                TransportCall::Receive(Channel::ControlIn),
                TransportCall::Receive(Channel::StreamIn),
                TransportCall::Receive(Channel::ControlIn),
            ]
        );
        assert_eq!(mock.sent(), vec![Bytes::from_static(b"cmd")]);
    }

    #[tokio::test]
    async fn exhausted_script_reports_shutdown() {
        let mock = MockTransport::new();
        let err = mock.receive(Channel::StreamIn).await.unwrap_err();
        assert!(matches!(err, TransportError::Shutdown));
    }

    #[tokio::test]
    async fn scripted_errors_are_returned() {
        let mock = MockTransport::new();
        mock.push_stream_error(TransportError::PartialTransfer {
            channel: Channel::StreamIn,
            expected: 8,
            received: 5,
        });
        mock.push_stream(Bytes::from_static(b"payload"));

        let err = mock.receive(Channel::StreamIn).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(mock.receive(Channel::StreamIn).await.unwrap(), "payload");
        assert_eq!(mock.pending(Channel::StreamIn), 0);
    }

    #[tokio::test]
    async fn detach_fails_all_calls() {
        let mock = MockTransport::new();
        mock.push_control(Bytes::from_static(b"ack"));
        mock.detach();

        assert!(matches!(
            mock.send(b"x").await,
            Err(TransportError::Detached)
        ));
        assert!(matches!(
            mock.receive(Channel::ControlIn).await,
            Err(TransportError::Detached)
        ));
        assert_eq!(mock.pending(Channel::ControlIn), 1);
    }
}
