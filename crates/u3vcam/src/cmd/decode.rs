use serde::Serialize;
use u3vcam_device::regmap::register_name;
use u3vcam_frame::command::{command_name, is_ack};
use u3vcam_frame::{
    decode_i32, decode_i64, decode_read, decode_write, AckHeader, CommandHeader, FrameError,
    HEADER_SIZE, READMEM_ACK, READMEM_CMD, WRITEMEM_CMD,
};

use crate::cmd::DecodeArgs;
use crate::exit::{frame_error, CliResult, SUCCESS};
use crate::hex;
use crate::output::{print_record, OutputFormat, Record};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let bytes = hex::decode(&args.hex)?;
    let record = decode_frame(&bytes).map_err(|err| frame_error("decode failed", err))?;
    print_record(&record, format);
    Ok(SUCCESS)
}

#[derive(Debug, Default, Serialize)]
struct DecodedFrame {
    kind: &'static str,
    command: &'static str,
    command_code: u16,
    request_id: u16,
    payload_length: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    flags: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<i16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    address: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    register: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    byte_count: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<String>,
}

fn decode_frame(bytes: &[u8]) -> Result<DecodedFrame, FrameError> {
    // Commands and acknowledgments share the prefix and field offsets.
    let header = CommandHeader::decode(bytes)?;
    let code = header.command_code;

    if is_ack(code) {
        let ack = AckHeader::decode(bytes)?;
        let data = &bytes[HEADER_SIZE..];
        let value = match (code, data.len()) {
            (READMEM_ACK, 8) => Some(decode_i64(bytes)?),
            (READMEM_ACK, 4) => Some(i64::from(decode_i32(bytes)?)),
            _ => None,
        };
        return Ok(DecodedFrame {
            kind: "ack",
            command: command_name(code),
            command_code: code,
            request_id: ack.request_id,
            payload_length: ack.payload_length,
            status: Some(ack.status),
            value,
            data: (!data.is_empty()).then(|| hex::encode(data)),
            ..DecodedFrame::default()
        });
    }

    let mut frame = DecodedFrame {
        kind: "command",
        command: command_name(code),
        command_code: code,
        request_id: header.request_id,
        payload_length: header.payload_length,
        flags: Some(header.flags),
        ..DecodedFrame::default()
    };
    match code {
        READMEM_CMD => {
            let (_, payload) = decode_read(bytes)?;
            frame.address = Some(payload.address);
            frame.register = Some(register_name(payload.address, None));
            frame.byte_count = Some(payload.byte_count);
        }
        WRITEMEM_CMD => {
            let (_, payload) = decode_write(bytes)?;
            frame.address = Some(payload.address);
            frame.register = Some(register_name(payload.address, None));
            frame.value = Some(i64::from(payload.data));
        }
        _ => {
            let data = &bytes[HEADER_SIZE..];
            frame.data = (!data.is_empty()).then(|| hex::encode(data));
        }
    }
    Ok(frame)
}

impl Record for DecodedFrame {
    fn fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("kind", self.kind.to_string()),
            ("command", format!("{} ({:#06x})", self.command, self.command_code)),
            ("request_id", self.request_id.to_string()),
            ("payload_length", self.payload_length.to_string()),
        ];
        if let Some(flags) = self.flags {
            fields.push(("flags", format!("{flags:#06x}")));
        }
        if let Some(status) = self.status {
            fields.push(("status", status.to_string()));
        }
        if let Some(address) = self.address {
            fields.push(("address", format!("{address:#x}")));
        }
        if let Some(register) = self.register {
            fields.push(("register", register.to_string()));
        }
        if let Some(count) = self.byte_count {
            fields.push(("byte_count", count.to_string()));
        }
        if let Some(value) = self.value {
            fields.push(("value", value.to_string()));
        }
        if let Some(data) = &self.data {
            fields.push(("data", data.clone()));
        }
        fields
    }
}
