//! Register sequences that configure and arm one acquisition.
//!
//! Firmware revisions disagree on the exact sequence, so each known variant
//! is a profile. Writes are issued strictly in the order returned here.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DeviceError, Result};
use crate::regmap::*;

/// Stream layout discovered while configuring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamLayout {
    /// Streaming interface register map base.
    pub sirm: u64,
    pub leader_size: i32,
    pub trailer_size: i32,
}

/// Image geometry and transfer shape for one acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameShape {
    pub width: u32,
    pub height: u32,
    pub pixel_size: u32,
    pub payload_transfer_count: u32,
}

/// One register write in a profile sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterWrite {
    pub register: &'static str,
    pub address: u64,
    pub value: i32,
}

impl RegisterWrite {
    fn new(register: &'static str, address: u64, value: i32) -> Self {
        Self {
            register,
            address,
            value,
        }
    }
}

/// A known configuration sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigProfile {
    /// Trigger off, single frame, payload size and count, leader and
    /// trailer sizes, timed exposure, exposure time.
    #[default]
    Documented,
    /// The sequence observed from the UWP host driver, including its
    /// stream-disable, transfer sizes and early acquisition start.
    CapturedUwp,
}

impl ConfigProfile {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfigProfile::Documented => "documented",
            ConfigProfile::CapturedUwp => "captured_uwp",
        }
    }

    /// Writes issued in the Configuring state.
    pub fn configuration_writes(
        self,
        layout: &StreamLayout,
        shape: &FrameShape,
        exposure: u32,
    ) -> Result<Vec<RegisterWrite>> {
        let sirm = |offset: u64| layout.sirm.wrapping_add(offset);
        let (leader, trailer) = (layout.leader_size, layout.trailer_size);
        let exposure = to_register("exposure", u64::from(exposure))?;
        let pixels = u64::from(shape.width) * u64::from(shape.height);

        let mut writes = vec![
            RegisterWrite::new(
                "trigger_mode_frame_start",
                TRIGGER_MODE_FRAME_START,
                TRIGGER_MODE_OFF,
            ),
            RegisterWrite::new(
                "trigger_mode_acquisition_start",
                TRIGGER_MODE_ACQUISITION_START,
                TRIGGER_MODE_OFF,
            ),
            RegisterWrite::new(
                "acquisition_mode",
                ACQUISITION_MODE,
                ACQUISITION_MODE_SINGLE_FRAME,
            ),
        ];

        match self {
            ConfigProfile::Documented => {
                let bytes = pixels.saturating_mul(u64::from(shape.pixel_size));
                let payload = to_register("payload size", bytes)?;
                let count = to_register("payload count", u64::from(shape.payload_transfer_count))?;
                writes.extend([
                    RegisterWrite::new("payload_size", sirm(SIRM_PAYLOAD_SIZE), payload),
                    RegisterWrite::new("payload_count", sirm(SIRM_PAYLOAD_COUNT), count),
                    RegisterWrite::new("leader_size", sirm(SIRM_LEADER_SIZE), leader),
                    RegisterWrite::new("trailer_size", sirm(SIRM_TRAILER_SIZE), trailer),
                    RegisterWrite::new("exposure_mode", EXPOSURE_MODE, EXPOSURE_MODE_TIMED),
                    RegisterWrite::new("exposure_time", EXPOSURE_TIME, exposure),
                ]);
            }
            ConfigProfile::CapturedUwp => {
                let payload = to_register("payload size", pixels / 2)?;
                writes.extend([
                    RegisterWrite::new("stream_control", sirm(SIRM_CONTROL), STREAM_DISABLE),
                    RegisterWrite::new("payload_size", sirm(SIRM_PAYLOAD_SIZE), payload),
                    RegisterWrite::new("payload_count", sirm(SIRM_PAYLOAD_COUNT), 2),
                    RegisterWrite::new(
                        "transfer1_size",
                        sirm(SIRM_TRANSFER1_SIZE),
                        CAPTURED_TRANSFER1_SIZE,
                    ),
                    RegisterWrite::new("transfer2_size", sirm(SIRM_TRANSFER2_SIZE), 0),
                    RegisterWrite::new("leader_size", sirm(SIRM_LEADER_SIZE), leader),
                    RegisterWrite::new("trailer_size", sirm(SIRM_TRAILER_SIZE), trailer),
                    RegisterWrite::new("acquisition_start", ACQUISITION_START, EXECUTE),
                    RegisterWrite::new("exposure_mode", EXPOSURE_MODE, EXPOSURE_MODE_TIMED),
                    RegisterWrite::new("exposure_time", EXPOSURE_TIME, exposure),
                ]);
            }
        }
        Ok(writes)
    }

    /// Writes that enable the stream and start exposing.
    pub fn arm_writes(self, layout: &StreamLayout) -> [RegisterWrite; 2] {
        [
            RegisterWrite::new(
                "stream_control",
                layout.sirm.wrapping_add(SIRM_CONTROL),
                STREAM_ENABLE,
            ),
            RegisterWrite::new("acquisition_start", ACQUISITION_START, EXECUTE),
        ]
    }
}

impl fmt::Display for ConfigProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigProfile {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "documented" => Ok(ConfigProfile::Documented),
            "captured_uwp" | "captured-uwp" => Ok(ConfigProfile::CapturedUwp),
            other => Err(DeviceError::Config(format!("unknown profile {other:?}"))),
        }
    }
}

/// The stop write issued after draining.
pub fn stop_write() -> RegisterWrite {
    RegisterWrite::new("acquisition_stop", ACQUISITION_STOP, EXECUTE)
}

fn to_register(what: &str, value: u64) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| DeviceError::Config(format!("{what} {value} does not fit a 32-bit register")))
}
