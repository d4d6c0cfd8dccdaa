use serde::Serialize;
use u3vcam_device::regmap::register_name;
use u3vcam_frame::{encode_read, encode_write, READMEM_CMD, WRITEMEM_CMD};

use crate::cmd::EncodeCommand;
use crate::exit::{CliResult, SUCCESS};
use crate::hex;
use crate::output::{print_record, OutputFormat, Record};

pub fn run(command: EncodeCommand, format: OutputFormat) -> CliResult<i32> {
    let record = match command {
        EncodeCommand::Read(args) => EncodedCommand::new(
            "READMEM_CMD",
            READMEM_CMD,
            args.request_id,
            args.address,
            None,
            encode_read(args.address, args.count, args.request_id).to_vec(),
        ),
        EncodeCommand::Write(args) => EncodedCommand::new(
            "WRITEMEM_CMD",
            WRITEMEM_CMD,
            args.request_id,
            args.address,
            Some(args.value),
            encode_write(args.address, args.value, args.request_id).to_vec(),
        ),
    };
    print_record(&record, format);
    Ok(SUCCESS)
}

#[derive(Serialize)]
struct EncodedCommand {
    command: &'static str,
    command_code: u16,
    request_id: u16,
    address: u64,
    register: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<i32>,
    length: usize,
    hex: String,
    #[serde(skip)]
    bytes: Vec<u8>,
}

impl EncodedCommand {
    fn new(
        command: &'static str,
        command_code: u16,
        request_id: u16,
        address: u64,
        value: Option<i32>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            command,
            command_code,
            request_id,
            address,
            register: register_name(address, None),
            value,
            length: bytes.len(),
            hex: hex::encode(&bytes),
            bytes,
        }
    }
}

impl Record for EncodedCommand {
    fn fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("command", self.command.to_string()),
            ("request_id", self.request_id.to_string()),
            ("address", format!("{:#x}", self.address)),
            ("register", self.register.to_string()),
        ];
        if let Some(value) = self.value {
            fields.push(("value", value.to_string()));
        }
        fields.push(("length", self.length.to_string()));
        fields.push(("hex", self.hex.clone()));
        fields
    }

    fn raw(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_record_carries_full_frame() {
        let record = EncodedCommand::new(
            "WRITEMEM_CMD",
            WRITEMEM_CMD,
            3,
            0x40024,
            Some(1),
            encode_write(0x40024, 1, 3).to_vec(),
        );
        assert_eq!(record.length, 28);
        assert_eq!(record.register, "acquisition_start");
        assert!(record.hex.starts_with("5533564300400208"));
    }
}
