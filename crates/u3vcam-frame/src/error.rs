/// Errors that can occur while encoding or decoding protocol data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// A response was shorter than the field being decoded.
    #[error("frame too short ({actual} bytes, need {expected})")]
    FrameTooShort { expected: usize, actual: usize },

    /// The frame does not start with the USB3 Vision magic.
    #[error("invalid frame prefix {found:#010x} (expected 0x43563355 \"U3VC\")")]
    InvalidPrefix { found: u32 },

    /// The frame carries a command code other than the one expected.
    #[error("unexpected command {found:#06x} (expected {expected:#06x})")]
    UnexpectedCommand { expected: u16, found: u16 },

    /// Fewer payload bytes were collected than the image needs.
    #[error("pixel buffer too short ({actual} bytes, need {expected})")]
    PixelBufferTooShort { expected: usize, actual: usize },

    /// Width or height is zero, or the image size overflows.
    #[error("invalid image geometry {width}x{height}")]
    InvalidGeometry { width: u32, height: u32 },

    /// The frame was finished before its payload and trailer arrived.
    #[error("frame incomplete")]
    FrameIncomplete,
}

pub type Result<T> = std::result::Result<T, FrameError>;
