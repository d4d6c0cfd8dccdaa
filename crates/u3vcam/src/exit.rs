use std::fmt;
use std::io;

use u3vcam_device::{DeviceError, ErrorKind};
use u3vcam_frame::FrameError;
use u3vcam_transport::TransportError;

// Exit code constants; the non-zero ones follow sysexits where one fits.
pub const SUCCESS: i32 = 0;
pub const TRANSPORT_ERROR: i32 = 3;
pub const REGISTER_REJECTED: i32 = 4;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const DEVICE_UNAVAILABLE: i32 = 69;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;
pub const CANCELLED: i32 = 130;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound => USAGE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Io(source) => io_error(context, source),
        TransportError::Detached
        | TransportError::Shutdown
        | TransportError::MissingPipe { .. } => {
            CliError::new(DEVICE_UNAVAILABLE, format!("{context}: {err}"))
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    CliError::new(DATA_INVALID, format!("{context}: {err}"))
}

pub fn device_error(context: &str, err: DeviceError) -> CliError {
    let code = match err {
        DeviceError::Io(source) => return io_error(context, source),
        DeviceError::Transport(source) => return transport_error(context, source),
        DeviceError::Json(_) => DATA_INVALID,
        ref other => kind_code(other.kind()),
    };
    CliError::new(code, format!("{context}: {err}"))
}

fn kind_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::ProtocolFraming => DATA_INVALID,
        ErrorKind::TransientTransfer => TRANSPORT_ERROR,
        ErrorKind::DeviceDetached => DEVICE_UNAVAILABLE,
        ErrorKind::RegisterWriteRejected => REGISTER_REJECTED,
        ErrorKind::Cancelled => CANCELLED,
        ErrorKind::Usage => USAGE,
    }
}
