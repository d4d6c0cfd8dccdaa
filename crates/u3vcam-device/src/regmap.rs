//! Register map of the supported acA1920-40um class devices.
//!
//! Addresses were recovered from bus captures of the vendor driver. Absolute
//! addresses are used as-is; `SIRM_*` values are offsets from the streaming
//! interface register map base that is read at runtime.

use serde::Serialize;

/// Holds the address of the technology-specific bootstrap register map.
pub const SBRM_POINTER: u64 = 0x1D8;
/// Offset within the SBRM of the SIRM base address.
pub const SBRM_SIRM_ADDRESS: u64 = 0x20;

/// Stream enable (1) / disable (0).
pub const SIRM_CONTROL: u64 = 0x04;
/// Largest leader the device will send.
pub const SIRM_MAX_LEADER_SIZE: u64 = 0x10;
/// Largest trailer the device will send.
pub const SIRM_MAX_TRAILER_SIZE: u64 = 0x14;
/// Leader size the host will accept.
pub const SIRM_LEADER_SIZE: u64 = 0x18;
/// Payload transfer size.
pub const SIRM_PAYLOAD_SIZE: u64 = 0x1C;
/// Number of payload transfers per frame.
pub const SIRM_PAYLOAD_COUNT: u64 = 0x20;
/// Size of the first final transfer.
pub const SIRM_TRANSFER1_SIZE: u64 = 0x24;
/// Size of the second final transfer.
pub const SIRM_TRANSFER2_SIZE: u64 = 0x28;
/// Trailer size the host will accept.
pub const SIRM_TRAILER_SIZE: u64 = 0x2C;

pub const ACQUISITION_MODE: u64 = 0x40004;
pub const ACQUISITION_START: u64 = 0x40024;
pub const ACQUISITION_STOP: u64 = 0x40044;
pub const TRIGGER_MODE_FRAME_START: u64 = 0x40104;
pub const TRIGGER_MODE_ACQUISITION_START: u64 = 0x40204;
/// 263172.
pub const EXPOSURE_MODE: u64 = 0x40404;
/// 263268, in microseconds.
pub const EXPOSURE_TIME: u64 = 0x40464;

pub const LASER_GPIO_CONFIG: u64 = 0xC0264;
pub const LASER_ENABLE: u64 = 0xC02E4;

pub const ACQUISITION_MODE_SINGLE_FRAME: i32 = 0;
pub const TRIGGER_MODE_OFF: i32 = 0;
pub const EXPOSURE_MODE_TIMED: i32 = 1;
pub const STREAM_ENABLE: i32 = 1;
pub const STREAM_DISABLE: i32 = 0;
/// Value written to command registers such as start and stop.
pub const EXECUTE: i32 = 1;
/// Drives the laser line as an output.
pub const LASER_GPIO_OUTPUT: i32 = 1;

/// Transfer-1 size written by the captured host driver.
pub const CAPTURED_TRANSFER1_SIZE: i32 = 206_848;

/// How a register's address is formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressBase {
    Absolute,
    Sbrm,
    Sirm,
}

/// One documented register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegisterInfo {
    pub name: &'static str,
    pub base: AddressBase,
    pub address: u64,
    pub width: u8,
    pub description: &'static str,
}

const fn reg(
    name: &'static str,
    base: AddressBase,
    address: u64,
    width: u8,
    description: &'static str,
) -> RegisterInfo {
    RegisterInfo {
        name,
        base,
        address,
        width,
        description,
    }
}

const fn absolute(name: &'static str, address: u64, description: &'static str) -> RegisterInfo {
    reg(name, AddressBase::Absolute, address, 4, description)
}

const fn sirm(name: &'static str, address: u64, description: &'static str) -> RegisterInfo {
    reg(name, AddressBase::Sirm, address, 4, description)
}

/// Every register the driver touches.
pub const REGISTERS: &[RegisterInfo] = &[
    reg(
        "sbrm_pointer",
        AddressBase::Absolute,
        SBRM_POINTER,
        8,
        "SBRM base address",
    ),
    reg(
        "sirm_address",
        AddressBase::Sbrm,
        SBRM_SIRM_ADDRESS,
        8,
        "SIRM base address",
    ),
    sirm("stream_control", SIRM_CONTROL, "stream enable"),
    sirm("max_leader_size", SIRM_MAX_LEADER_SIZE, "max leader"),
    sirm("max_trailer_size", SIRM_MAX_TRAILER_SIZE, "max trailer"),
    sirm("leader_size", SIRM_LEADER_SIZE, "host leader size"),
    sirm("payload_size", SIRM_PAYLOAD_SIZE, "payload transfer size"),
    sirm("payload_count", SIRM_PAYLOAD_COUNT, "payload transfers"),
    sirm("transfer1_size", SIRM_TRANSFER1_SIZE, "final transfer 1"),
    sirm("transfer2_size", SIRM_TRANSFER2_SIZE, "final transfer 2"),
    sirm("trailer_size", SIRM_TRAILER_SIZE, "host trailer size"),
    absolute("acquisition_mode", ACQUISITION_MODE, "0 = single frame"),
    absolute("acquisition_start", ACQUISITION_START, "start command"),
    absolute("acquisition_stop", ACQUISITION_STOP, "stop command"),
    absolute(
        "trigger_mode_frame_start",
        TRIGGER_MODE_FRAME_START,
        "0 = off",
    ),
    absolute(
        "trigger_mode_acquisition_start",
        TRIGGER_MODE_ACQUISITION_START,
        "0 = off",
    ),
    absolute("exposure_mode", EXPOSURE_MODE, "1 = timed"),
    absolute("exposure_time", EXPOSURE_TIME, "exposure in microseconds"),
    absolute("laser_gpio_config", LASER_GPIO_CONFIG, "laser line mode"),
    absolute("laser_enable", LASER_ENABLE, "laser on/off"),
];

/// Look up a register's name by its absolute address.
///
/// SIRM-relative registers resolve only when `sirm` is known.
pub fn register_name(address: u64, sirm: Option<u64>) -> &'static str {
    REGISTERS
        .iter()
        .find(|info| match info.base {
            AddressBase::Absolute => info.address == address,
            AddressBase::Sirm => {
                sirm.is_some_and(|base| base.wrapping_add(info.address) == address)
            }
            AddressBase::Sbrm => false,
        })
        .map_or("unknown", |info| info.name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_addresses_match_captures() {
        assert_eq!(EXPOSURE_MODE, 263_172);
        assert_eq!(EXPOSURE_TIME, 263_268);
    }

    #[test]
    fn names_resolve() {
        assert_eq!(register_name(ACQUISITION_START, None), "acquisition_start");
        assert_eq!(register_name(0x2_0004, Some(0x2_0000)), "stream_control");
        assert_eq!(register_name(0x2_0004, None), "unknown");
    }

    #[test]
    fn names_are_unique() {
        let mut names: Vec<_> = REGISTERS.iter().map(|r| r.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), REGISTERS.len());
    }
}
