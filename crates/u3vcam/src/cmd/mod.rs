use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

use u3vcam_device::{ConfigProfile, StreamFault};

use crate::exit::CliResult;
use crate::hex::{parse_i32, parse_u64};
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod regmap;
pub mod simulate;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one acquisition against a simulated camera.
    Simulate(SimulateArgs),
    /// Encode a register command as hex.
    #[command(subcommand)]
    Encode(EncodeCommand),
    /// Decode a hex command or acknowledgment.
    Decode(DecodeArgs),
    /// List the registers the driver touches.
    Regmap(RegmapArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Simulate(args) => simulate::run(args, format),
        Command::Encode(command) => encode::run(command, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Regmap(args) => regmap::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ProfileArg {
    Documented,
    CapturedUwp,
}

impl From<ProfileArg> for ConfigProfile {
    fn from(arg: ProfileArg) -> Self {
        match arg {
            ProfileArg::Documented => ConfigProfile::Documented,
            ProfileArg::CapturedUwp => ConfigProfile::CapturedUwp,
        }
    }
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Camera configuration file (JSON).
    #[arg(long, value_name = "FILE", env = "U3VCAM_CONFIG")]
    pub config: Option<PathBuf>,
    /// Image width in pixels. Overrides the configuration file.
    #[arg(long)]
    pub width: Option<u32>,
    /// Image height in pixels. Overrides the configuration file.
    #[arg(long)]
    pub height: Option<u32>,
    /// Exposure time in device units.
    #[arg(long, default_value = "10000")]
    pub exposure: u32,
    /// Fire the laser during exposure.
    #[arg(long)]
    pub laser: bool,
    /// Register configuration sequence.
    #[arg(long, value_enum)]
    pub profile: Option<ProfileArg>,
    /// Stream transfer size of the simulated device. Default: one payload transfer.
    #[arg(long, value_name = "BYTES")]
    pub chunk_size: Option<usize>,
    /// Pending acknowledgments the device sends before each real one.
    #[arg(long, default_value = "0")]
    pub pending_acks: u32,
    /// Stream read attempts before giving up.
    #[arg(long)]
    pub max_attempts: Option<u32>,
    /// Fail one stream transfer: CHUNK:partial=N, CHUNK:transient, CHUNK:empty or
    /// CHUNK:detach. Chunk 0 is the leader. Repeatable.
    #[arg(long = "fault", value_name = "CHUNK:KIND", value_parser = parse_fault)]
    pub faults: Vec<(usize, StreamFault)>,
    /// Answer writes to ADDR with STATUS. Repeatable.
    #[arg(
        long = "reject-write",
        value_name = "ADDR=STATUS",
        value_parser = parse_rejection
    )]
    pub rejections: Vec<(u64, i16)>,
    /// Stop delivering stream transfers after N chunks.
    #[arg(long, value_name = "N")]
    pub stall_after: Option<usize>,
    /// Cancel the acquisition after this long (e.g. 5s, 500ms).
    #[arg(long)]
    pub timeout: Option<String>,
    /// Write the unpacked image (16-bit little-endian pixels) to FILE.
    #[arg(long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum EncodeCommand {
    /// READMEM command.
    Read(EncodeReadArgs),
    /// WRITEMEM command.
    Write(EncodeWriteArgs),
}

#[derive(Args, Debug)]
pub struct EncodeReadArgs {
    /// Register address (decimal or 0x-prefixed).
    #[arg(value_parser = parse_u64)]
    pub address: u64,
    /// Bytes to read.
    #[arg(long, default_value = "8")]
    pub count: u16,
    #[arg(long, default_value = "1")]
    pub request_id: u16,
}

#[derive(Args, Debug)]
pub struct EncodeWriteArgs {
    /// Register address (decimal or 0x-prefixed).
    #[arg(value_parser = parse_u64)]
    pub address: u64,
    /// 32-bit value.
    #[arg(value_parser = parse_i32, allow_hyphen_values = true)]
    pub value: i32,
    #[arg(long, default_value = "1")]
    pub request_id: u16,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Frame bytes as hex.
    pub hex: String,
}

#[derive(Args, Debug)]
pub struct RegmapArgs {
    /// Print only the register at this address.
    #[arg(long, value_name = "ADDR", value_parser = parse_u64)]
    pub resolve: Option<u64>,
    /// SIRM base used to resolve streaming registers.
    #[arg(long, value_name = "ADDR", value_parser = parse_u64)]
    pub sirm: Option<u64>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

fn parse_fault(input: &str) -> Result<(usize, StreamFault), String> {
    let (chunk, kind) = input
        .split_once(':')
        .ok_or_else(|| format!("expected CHUNK:KIND, got {input:?}"))?;
    let chunk = chunk
        .trim()
        .parse()
        .map_err(|err| format!("invalid chunk index {chunk:?}: {err}"))?;
    let fault = match kind.trim() {
        "transient" => StreamFault::Transient,
        "empty" => StreamFault::Empty,
        "detach" => StreamFault::Detach,
        other => match other.strip_prefix("partial=") {
            Some(received) => StreamFault::Partial {
                received: received
                    .parse()
                    .map_err(|err| format!("invalid byte count {received:?}: {err}"))?,
            },
            None => return Err(format!("unknown fault kind {other:?}")),
        },
    };
    Ok((chunk, fault))
}

fn parse_rejection(input: &str) -> Result<(u64, i16), String> {
    let (address, status) = input
        .split_once('=')
        .ok_or_else(|| format!("expected ADDR=STATUS, got {input:?}"))?;
    let status = status
        .trim()
        .parse()
        .map_err(|err| format!("invalid status {status:?}: {err}"))?;
    Ok((parse_u64(address)?, status))
}
