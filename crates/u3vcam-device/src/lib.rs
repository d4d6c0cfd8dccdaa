//! Register access, image acquisition and device lifecycle for USB3 Vision
//! cameras.
//!
//! This is the layer applications use. Hand the [`DeviceMonitor`] devices as
//! the host enumerates them, then lease the attached device to run
//! acquisitions, or use the [`Camera`] facade which does both.

pub mod camera;
pub mod config;
pub mod error;
pub mod laser;
pub mod monitor;
pub mod profile;
pub mod registers;
pub mod regmap;
pub mod retry;
pub mod session;
pub mod sim;

pub use camera::{Camera, LASER_INDEX};
pub use config::{
    AcquireParams, CameraConfig, DeviceFilter, Illumination, InterfaceConfig, SessionConfig,
};
pub use error::{DeviceError, ErrorKind, Result};
pub use laser::LaserControl;
pub use monitor::{
    DeviceAttachmentState, DeviceEvent, DeviceInfo, DeviceLease, DeviceMonitor, DeviceOpener,
    WatchEvent,
};
pub use profile::{ConfigProfile, RegisterWrite, StreamLayout};
pub use registers::RegisterClient;
pub use retry::RetryPolicy;
pub use session::{AcquisitionSession, CapturedImage, SessionState};
pub use sim::{SimConfig, SimulatedCamera, StreamFault};
