use std::path::PathBuf;

use clap::{Args, Subcommand};
use flightcore_packet::{NodeId, PacketType};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod run;
pub mod unwrap;
pub mod version;
pub mod wrap;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Boot the flight core against simulated hardware.
    Run(RunArgs),
    /// Encode a packet for the radio or the companion link.
    Wrap(WrapArgs),
    /// Decode a radio or companion-link frame.
    Unwrap(UnwrapArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Run(args) => run::run(args, format),
        Command::Wrap(args) => wrap::run(args, format),
        Command::Unwrap(args) => unwrap::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// How long to run before shutting down (e.g. 30s, 1500ms).
    #[arg(long, default_value = "10s")]
    pub duration: String,
    /// JSON file overriding flight configuration defaults.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
    /// Simulated battery voltage.
    #[arg(long, default_value_t = 7.4)]
    pub voltage: f32,
    /// Start with the deployment marker already set.
    #[arg(long)]
    pub deployed: bool,
    /// Command packet to inject on the radio uplink at boot (repeatable).
    #[arg(long, value_name = "TYPE")]
    pub uplink: Vec<PacketType>,
}

#[derive(Args, Debug)]
pub struct WrapArgs {
    /// Packet type, by name (CommandObcPing) or number (256, 0x0100).
    #[arg(long = "type", value_name = "TYPE")]
    pub packet_type: PacketType,
    /// Origin node.
    #[arg(long, default_value = "ground")]
    pub from: NodeId,
    /// Destination node.
    #[arg(long, default_value = "obc")]
    pub to: NodeId,
    /// Channel the packet arrived on.
    #[arg(long, default_value_t = 0)]
    pub chanin: u8,
    /// Channel that should carry the packet out.
    #[arg(long, default_value_t = 0)]
    pub chanout: u8,
    /// Payload as a string.
    #[arg(long, conflicts_with = "hex")]
    pub data: Option<String>,
    /// Payload as hex bytes.
    #[arg(long, conflicts_with = "data")]
    pub hex: Option<String>,
    /// Produce a SLIP frame for the companion link instead of a radio frame.
    #[arg(long)]
    pub slip: bool,
}

#[derive(Args, Debug)]
pub struct UnwrapArgs {
    /// Frame bytes as hex.
    pub frame: String,
    /// Input is a SLIP frame from the companion link.
    #[arg(long)]
    pub slip: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse hex bytes, ignoring whitespace and an optional `0x` prefix.
pub fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let digits: String = input.split_whitespace().collect();
    let digits = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .unwrap_or(&digits);
    if digits.len() % 2 != 0 {
        return Err(CliError::new(USAGE, "hex input has an odd number of digits"));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            digits
                .get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| CliError::new(USAGE, format!("invalid hex at offset {i}")))
        })
        .collect()
}
