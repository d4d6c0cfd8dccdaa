use std::io::ErrorKind;

use crate::traits::Channel;

/// Errors that can occur in bulk-transfer transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// An I/O error occurred on a bulk pipe.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A recoverable bulk-transfer failure reported by the host stack.
    #[error("transient transfer failure on {channel}: {reason}")]
    Transient { channel: Channel, reason: String },

    /// A bulk read completed with fewer bytes than the host requested.
    #[error("partial transfer on {channel} ({received} of {expected} bytes)")]
    PartialTransfer {
        channel: Channel,
        expected: usize,
        received: usize,
    },

    /// Fewer bytes than the full command were accepted by the control-out pipe.
    #[error("short write on control-out ({written} of {expected} bytes)")]
    ShortWrite { written: usize, expected: usize },

    /// The device went away; the pipe binding is no longer valid.
    #[error("device detached")]
    Detached,

    /// A required bulk pipe was not found on the device.
    #[error("interface {interface} has no bulk {direction} pipe")]
    MissingPipe {
        interface: u8,
        direction: &'static str,
    },

    /// The transport has been shut down.
    #[error("transport shut down")]
    Shutdown,
}

impl TransportError {
    /// Whether retrying the same transfer may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Transient { .. } | TransportError::PartialTransfer { .. } => true,
            TransportError::Io(err) => matches!(
                err.kind(),
                ErrorKind::Interrupted | ErrorKind::TimedOut | ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
