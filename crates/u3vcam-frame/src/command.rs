//! USB3 Vision control command codes and header flags.
//!
//! Acknowledgment codes are the request code plus one.

/// Read device memory.
pub const READMEM_CMD: u16 = 0x0800;

/// Acknowledgment to [`READMEM_CMD`].
pub const READMEM_ACK: u16 = 0x0801;

/// Write device memory.
pub const WRITEMEM_CMD: u16 = 0x0802;

/// Acknowledgment to [`WRITEMEM_CMD`].
pub const WRITEMEM_ACK: u16 = 0x0803;

/// The device needs more time; the real acknowledgment follows.
pub const PENDING_ACK: u16 = 0x0805;

/// Asynchronous device event.
pub const EVENT_CMD: u16 = 0x0C00;

/// Header flag asking the device to acknowledge the command.
pub const FLAG_REQUEST_ACK: u16 = 0x4000;

/// Returns a human-readable name for a command code.
pub fn command_name(code: u16) -> &'static str {
    match code {
        READMEM_CMD => "READMEM_CMD",
        READMEM_ACK => "READMEM_ACK",
        WRITEMEM_CMD => "WRITEMEM_CMD",
        WRITEMEM_ACK => "WRITEMEM_ACK",
        PENDING_ACK => "PENDING_ACK",
        EVENT_CMD => "EVENT_CMD",
        _ => "UNKNOWN",
    }
}

/// Returns the acknowledgment code expected for a request code.
pub fn ack_for(code: u16) -> u16 {
    code.wrapping_add(1)
}

/// Returns true if the code is an acknowledgment rather than a request.
pub fn is_ack(code: u16) -> bool {
    matches!(code, READMEM_ACK | WRITEMEM_ACK | PENDING_ACK)
}
