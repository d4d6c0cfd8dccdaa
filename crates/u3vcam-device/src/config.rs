//! Camera configuration, loadable from JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};
use u3vcam_transport::InterfaceLayout;

use crate::error::{DeviceError, Result};
use crate::monitor::DeviceInfo;
use crate::profile::{ConfigProfile, FrameShape};
use crate::registers::DEFAULT_PENDING_ACK_LIMIT;
use crate::retry::RetryPolicy;

pub const DEFAULT_VENDOR_ID: u16 = 0x2676;
pub const DEFAULT_PRODUCT_ID: u16 = 0xBA02;

/// Which enumerated devices the monitor attaches to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceFilter {
    pub vendor_id: u16,
    pub product_id: u16,
    /// Device name prefix, e.g. `acA1920-40um`.
    pub name_prefix: Option<String>,
    /// Skip devices the host reports as disabled.
    pub require_enabled: bool,
}

impl Default for DeviceFilter {
    fn default() -> Self {
        Self {
            vendor_id: DEFAULT_VENDOR_ID,
            product_id: DEFAULT_PRODUCT_ID,
            name_prefix: None,
            require_enabled: true,
        }
    }
}

impl DeviceFilter {
    pub fn matches(&self, device: &DeviceInfo) -> bool {
        device.vendor_id == self.vendor_id
            && device.product_id == self.product_id
            && (device.enabled || !self.require_enabled)
            && self
                .name_prefix
                .as_deref()
                .is_none_or(|prefix| device.name.starts_with(prefix))
    }
}

/// Interface numbers of the control and stream pipes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterfaceConfig {
    pub control_interface: u8,
    /// 1 on current firmware, 2 on the alternative layout.
    pub stream_interface: u8,
}

impl Default for InterfaceConfig {
    fn default() -> Self {
        let layout = InterfaceLayout::default();
        Self {
            control_interface: layout.control_interface,
            stream_interface: layout.stream_interface,
        }
    }
}

impl InterfaceConfig {
    pub fn layout(&self) -> InterfaceLayout {
        InterfaceLayout {
            control_interface: self.control_interface,
            stream_interface: self.stream_interface,
        }
    }
}

/// Per-acquisition settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub width: u32,
    pub height: u32,
    /// Bytes per pixel. Only 2 is supported.
    pub pixel_size: u32,
    pub payload_transfer_count: u32,
    pub profile: ConfigProfile,
    pub retry: RetryPolicy,
    pub pending_ack_limit: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1200,
            pixel_size: 2,
            payload_transfer_count: 2,
            profile: ConfigProfile::default(),
            retry: RetryPolicy::default(),
            pending_ack_limit: DEFAULT_PENDING_ACK_LIMIT,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(DeviceError::Config(format!(
                "image geometry {}x{} is empty",
                self.width, self.height
            )));
        }
        if self.pixel_size != 2 {
            return Err(DeviceError::Config(format!(
                "pixel size {} unsupported (only 2)",
                self.pixel_size
            )));
        }
        if self.payload_transfer_count == 0 {
            return Err(DeviceError::Config("payload transfer count is zero".into()));
        }
        Ok(())
    }

    pub fn shape(&self) -> FrameShape {
        FrameShape {
            width: self.width,
            height: self.height,
            pixel_size: self.pixel_size,
            payload_transfer_count: self.payload_transfer_count,
        }
    }
}

/// How the sample is lit during exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Illumination {
    #[default]
    Ambient,
    Laser,
}

/// Parameters for one acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquireParams {
    /// Exposure time in device units (microseconds).
    pub exposure: u32,
    pub illumination: Illumination,
}

impl Default for AcquireParams {
    fn default() -> Self {
        Self {
            exposure: 10_000,
            illumination: Illumination::Ambient,
        }
    }
}

/// Everything a [`crate::Camera`] needs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub filter: DeviceFilter,
    pub interfaces: InterfaceConfig,
    pub session: SessionConfig,
}

impl CameraConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.session.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }
}
