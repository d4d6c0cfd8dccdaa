use std::fmt;
use std::future::Future;

use bytes::Bytes;

use crate::error::Result;

/// One of the three bulk pipes a USB3 Vision device exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Commands from host to device (interface 0, bulk out).
    ControlOut,
    /// Acknowledgments from device to host (interface 0, bulk in).
    ControlIn,
    /// Image leader, payload and trailer transfers (stream interface, bulk in).
    StreamIn,
}

impl Channel {
    /// Returns a human-readable name for the channel.
    pub fn name(self) -> &'static str {
        match self {
            Channel::ControlOut => "control-out",
            Channel::ControlIn => "control-in",
            Channel::StreamIn => "stream-in",
        }
    }

    /// Returns true for device-to-host channels.
    pub fn is_inbound(self) -> bool {
        !matches!(self, Channel::ControlOut)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A byte-oriented bulk transport already bound to one device's pipe set.
///
/// This is the seam to the host USB stack. The core never enumerates
/// devices or claims interfaces itself; it only moves bytes through a
/// transport it was handed. Implementations must be usable from several
/// tasks at once, but callers (the register engine) serialise control
/// traffic themselves.
pub trait BulkTransport: Send + Sync {
    /// Write one command to the control-out pipe, returning the bytes accepted.
    fn send(&self, data: &[u8]) -> impl Future<Output = Result<usize>> + Send;

    /// Read one transfer from an inbound channel.
    fn receive(&self, channel: Channel) -> impl Future<Output = Result<Bytes>> + Send;

    /// Largest single transfer the channel will deliver.
    fn max_transfer_size(&self, channel: Channel) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_names() {
        assert_eq!(Channel::ControlOut.to_string(), "control-out");
        assert_eq!(Channel::ControlIn.name(), "control-in");
        assert_eq!(Channel::StreamIn.name(), "stream-in");
    }

    #[test]
    fn channel_direction() {
        assert!(!Channel::ControlOut.is_inbound());
        assert!(Channel::ControlIn.is_inbound());
        assert!(Channel::StreamIn.is_inbound());
    }
}
