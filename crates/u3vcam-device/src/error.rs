use std::fmt;

use u3vcam_frame::FrameError;
use u3vcam_transport::TransportError;

/// Coarse classification used for propagation decisions and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or short frame from the device.
    ProtocolFraming,
    /// Recoverable bulk-transfer failure.
    TransientTransfer,
    /// The pipe binding is gone.
    DeviceDetached,
    /// The device returned a non-zero write status.
    RegisterWriteRejected,
    /// The caller aborted the operation.
    Cancelled,
    /// Bad configuration or a request the device cannot serve right now.
    Usage,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::ProtocolFraming => "protocol_framing",
            ErrorKind::TransientTransfer => "transient_transfer",
            ErrorKind::DeviceDetached => "device_detached",
            ErrorKind::RegisterWriteRejected => "register_write_rejected",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Usage => "usage",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur in device operations.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// Transport-level error other than a detach.
    #[error("transport error: {0}")]
    Transport(TransportError),

    /// The device answered with a malformed frame.
    #[error("protocol error: {0}")]
    Protocol(#[from] FrameError),

    /// No device is attached, or it went away mid-operation.
    #[error("device detached")]
    Detached,

    /// The laser GPIO or enable write was rejected.
    #[error("cannot set laser state to {enabled} (status {status:#x})")]
    LaserStateRejected { enabled: bool, status: i32 },

    /// The device kept answering with pending acknowledgments.
    #[error("no acknowledgment after {0} pending replies")]
    PendingAckLimit(u32),

    /// Stream reads kept failing until the retry policy gave up.
    #[error("stream read failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: TransportError,
    },

    /// The caller cancelled the acquisition.
    #[error("acquisition cancelled")]
    Cancelled,

    /// Another session holds the device.
    #[error("device busy: another session holds it")]
    Busy,

    /// Only laser 0 exists on supported devices.
    #[error("unknown laser {0}")]
    UnknownLaser(u8),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// I/O error while loading configuration.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<TransportError> for DeviceError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Detached => DeviceError::Detached,
            other => DeviceError::Transport(other),
        }
    }
}

impl DeviceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeviceError::Transport(err) if err.is_transient() => ErrorKind::TransientTransfer,
            DeviceError::Transport(_) | DeviceError::Detached => ErrorKind::DeviceDetached,
            DeviceError::Protocol(_) | DeviceError::PendingAckLimit(_) => {
                ErrorKind::ProtocolFraming
            }
            DeviceError::LaserStateRejected { .. } => ErrorKind::RegisterWriteRejected,
            DeviceError::RetriesExhausted { .. } => ErrorKind::TransientTransfer,
            DeviceError::Cancelled => ErrorKind::Cancelled,
            DeviceError::Busy
            | DeviceError::UnknownLaser(_)
            | DeviceError::Config(_)
            | DeviceError::Io(_)
            | DeviceError::Json(_) => ErrorKind::Usage,
        }
    }

    /// Whether this error invalidates the attachment it happened on.
    pub fn is_fatal_to_attachment(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ProtocolFraming | ErrorKind::DeviceDetached
        )
    }
}

pub type Result<T> = std::result::Result<T, DeviceError>;
