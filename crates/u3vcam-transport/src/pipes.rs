use tracing::debug;

use crate::error::{Result, TransportError};

/// Bulk endpoints of one USB interface, as reported by the host enumerator.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UsbInterface {
    /// `bInterfaceNumber`.
    pub number: u8,
    /// Bulk-in endpoint addresses, in descriptor order.
    pub bulk_in: Vec<u8>,
    /// Bulk-out endpoint addresses, in descriptor order.
    pub bulk_out: Vec<u8>,
}

/// Which interface numbers carry the control and stream pipes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceLayout {
    /// Interface holding the control-in/control-out pair. Default: 0.
    pub control_interface: u8,
    /// Interface holding the stream-in pipe. Default: 1.
    pub stream_interface: u8,
}

impl Default for InterfaceLayout {
    fn default() -> Self {
        Self {
            control_interface: 0,
            stream_interface: 1,
        }
    }
}

/// The three bulk pipes bound for one physical connection.
///
/// Valid for the lifetime of a single attachment; a detach invalidates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipeBinding {
    pub control_out: u8,
    pub control_in: u8,
    pub stream_in: u8,
}

impl PipeBinding {
    /// Bind pipes from the device's interfaces using the first bulk endpoint
    /// of each required direction.
    pub fn bind(interfaces: &[UsbInterface], layout: &InterfaceLayout) -> Result<Self> {
        let control = find_interface(interfaces, layout.control_interface)?;
        let stream = find_interface(interfaces, layout.stream_interface)?;

        let binding = Self {
            control_out: first_endpoint(&control.bulk_out, control.number, "out")?,
            control_in: first_endpoint(&control.bulk_in, control.number, "in")?,
            stream_in: first_endpoint(&stream.bulk_in, stream.number, "in")?,
        };
        debug!(?binding, "bound bulk pipes");
        Ok(binding)
    }
}

fn find_interface(interfaces: &[UsbInterface], number: u8) -> Result<&UsbInterface> {
    interfaces
        .iter()
        .find(|iface| iface.number == number)
        .ok_or(TransportError::MissingPipe {
            interface: number,
            direction: "in/out",
        })
}

fn first_endpoint(endpoints: &[u8], interface: u8, direction: &'static str) -> Result<u8> {
    endpoints
        .first()
        .copied()
        .ok_or(TransportError::MissingPipe {
            interface,
            direction,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera_interfaces() -> Vec<UsbInterface> {
        vec![
            UsbInterface {
                number: 0,
                bulk_in: vec![0x81],
                bulk_out: vec![0x01],
            },
            UsbInterface {
                number: 1,
                bulk_in: vec![0x82],
                bulk_out: vec![],
            },
            UsbInterface {
                number: 2,
                bulk_in: vec![0x83],
                bulk_out: vec![],
            },
        ]
    }

    #[test]
    fn binds_default_layout() {
        let binding = PipeBinding::bind(&camera_interfaces(), &InterfaceLayout::default()).unwrap();
        assert_eq!(
            binding,
            PipeBinding {
                control_out: 0x01,
                control_in: 0x81,
                stream_in: 0x82,
            }
        );
    }

    #[test]
    fn binds_alternate_stream_interface() {
        let layout = InterfaceLayout {
            stream_interface: 2,
            ..InterfaceLayout::default()
        };
        let binding = PipeBinding::bind(&camera_interfaces(), &layout).unwrap();
        assert_eq!(binding.stream_in, 0x83);
    }

    #[test]
    fn missing_stream_interface() {
        let interfaces = vec![camera_interfaces().remove(0)];
        let err = PipeBinding::bind(&interfaces, &InterfaceLayout::default()).unwrap_err();
        assert!(matches!(
            err,
            TransportError::MissingPipe { interface: 1, .. }
        ));
    }

    #[test]
    fn missing_control_out_pipe() {
        let mut interfaces = camera_interfaces();
        interfaces[0].bulk_out.clear();
        let err = PipeBinding::bind(&interfaces, &InterfaceLayout::default()).unwrap_err();
        assert!(matches!(
            err,
            TransportError::MissingPipe {
                interface: 0,
                direction: "out"
            }
        ));
    }
}
