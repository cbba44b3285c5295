mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "flightcore", version, about = "Satellite command and telemetry core")]
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
    fn parses_wrap_subcommand() {
        let cli = Cli::try_parse_from([
            "flightcore",
            "wrap",
            "--type",
            "CommandObcPing",
            "--to",
            "obc",
        ])
        .expect("wrap args should parse");

        assert!(matches!(cli.command, Command::Wrap(_)));
    }

    #[test]
    fn rejects_conflicting_payload_args() {
        let err = Cli::try_parse_from([
            "flightcore",
            "wrap",
            "--type",
            "DataObcPong",
            "--data",
            "Pong",
            "--hex",
            "506f6e67",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn parses_run_with_repeated_uplinks() {
        let cli = Cli::try_parse_from([
            "flightcore",
            "run",
            "--duration",
            "500ms",
            "--uplink",
            "CommandObcPing",
            "--uplink",
            "CommandObcSendBeacon",
        ])
        .expect("run args should parse");

        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.uplink.len(), 2);
    }

    #[test]
    fn unknown_node_is_a_usage_error() {
        let err = Cli::try_parse_from(["flightcore", "wrap", "--type", "1", "--to", "moon"])
            .expect_err("unknown node should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
