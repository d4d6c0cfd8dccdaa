use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use u3vcam_device::regmap::RegisterInfo;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// A command result printable in every output format.
pub trait Record: Serialize {
    /// Field names and display values, in print order.
    fn fields(&self) -> Vec<(&'static str, String)>;

    /// Bytes written for `--format raw`.
    fn raw(&self) -> &[u8] {
        &[]
    }
}

pub fn print_record<R: Record>(record: &R, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(record).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            for (name, value) in record.fields() {
                table.add_row(vec![name.to_string(), value]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let line = record
                .fields()
                .into_iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join(" ");
            println!("{line}");
        }
        OutputFormat::Raw => print_raw(record.raw()),
    }
}

pub fn print_registers(registers: &[RegisterInfo], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(registers).unwrap_or_else(|_| "[]".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["NAME", "BASE", "ADDRESS", "WIDTH", "DESCRIPTION"]);
            for info in registers {
                table.add_row(vec![
                    info.name.to_string(),
                    base_name(info).to_string(),
                    format!("{:#x}", info.address),
                    info.width.to_string(),
                    info.description.to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            for info in registers {
                println!(
                    "{:<32} {:<8} {:#08x} {}",
                    info.name,
                    base_name(info),
                    info.address,
                    info.description
                );
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn base_name(info: &RegisterInfo) -> &'static str {
    use u3vcam_device::regmap::AddressBase;
    match info.base {
        AddressBase::Absolute => "absolute",
        AddressBase::Sbrm => "sbrm",
        AddressBase::Sirm => "sirm",
    }
}
