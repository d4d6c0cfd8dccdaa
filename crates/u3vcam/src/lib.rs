//! USB3 Vision camera register protocol and image acquisition.
//!
//! u3vcam drives USB3 Vision line-scan and area cameras over two bulk
//! interfaces: a control pipe pair carrying register reads and writes, and a
//! stream pipe delivering leader, payload and trailer transfers.
//!
//! # Crate Structure
//!
//! - [`transport`]: bulk pipe abstraction the host USB stack plugs into
//! - [`frame`]: command codec, acknowledgments and image stream reassembly
//! - [`device`]: register access, acquisition sessions and attach/detach
//!   tracking (behind the `device` feature)

/// Re-export transport types.
pub mod transport {
    pub use u3vcam_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use u3vcam_frame::*;
}

/// Re-export device types (requires `device` feature).
#[cfg(feature = "device")]
pub mod device {
    pub use u3vcam_device::*;
}
