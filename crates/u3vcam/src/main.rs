mod cmd;
mod exit;
mod hex;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "u3vcam", version, about = "USB3 Vision camera CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simulate_subcommand() {
        let cli = Cli::try_parse_from([
            "u3vcam",
            "simulate",
            "--width",
            "64",
            "--height",
            "8",
            "--laser",
            "--fault",
            "1:partial=3",
        ])
        .expect("simulate args should parse");

        let Command::Simulate(args) = cli.command else {
            panic!("expected simulate");
        };
        assert_eq!((args.width, args.height), (Some(64), Some(8)));
        assert!(args.laser);
        assert_eq!(
            args.faults,
            vec![(1, u3vcam_device::StreamFault::Partial { received: 3 })]
        );
    }

    #[test]
    fn parses_encode_write() {
        let cli = Cli::try_parse_from([
            "u3vcam", "encode", "write", "0x40024", "1", "--request-id", "7",
        ])
        .expect("encode args should parse");
        assert!(matches!(cli.command, Command::Encode(_)));
    }

    #[test]
    fn rejects_unknown_profile() {
        let err = Cli::try_parse_from(["u3vcam", "simulate", "--profile", "bogus"])
            .expect_err("unknown profile should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["u3vcam", "regmap", "--format", "json"])
            .expect("global flag should parse");
        assert!(matches!(cli.format, Some(OutputFormat::Json)));
    }
}
