//! Bulk-transfer transport abstraction for USB3 Vision devices.
//!
//! A USB3 Vision device exposes three bulk pipes:
//! - control-out (interface 0): register read/write commands
//! - control-in (interface 0): command acknowledgments
//! - stream-in (stream interface): image leader, payload and trailer
//!
//! This is the lowest layer of u3vcam. Device enumeration and interface
//! claiming belong to the host; everything above builds on the
//! [`BulkTransport`] trait provided here.

pub mod error;
#[cfg(feature = "mock")]
pub mod mock;
pub mod pipes;
pub mod traits;

pub use error::{Result, TransportError};
#[cfg(feature = "mock")]
pub use mock::{MockTransport, TransportCall};
pub use pipes::{InterfaceLayout, PipeBinding, UsbInterface};
pub use traits::{BulkTransport, Channel};
