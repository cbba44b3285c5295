use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use flightcore_channels::{
    CancelToken, DeploymentStore, FlightConfig, FlightCore, MemoryStore, SimBench,
};
use flightcore_hal::{OutputPin, SystemClock};
use flightcore_packet::{codec, NodeId, Packet, PacketType, RADIO_MAX_FRAME};
use serde::Serialize;

use crate::cmd::RunArgs;
use crate::exit::{
    config_error, packet_error, scheduler_error, CliError, CliResult, INTERNAL, SUCCESS, USAGE,
};
use crate::output::{packet_table, pretty, print_json, OutputFormat, PacketView};

#[derive(Serialize)]
struct QueueReport {
    name: &'static str,
    len: usize,
    capacity: usize,
    evicted: u64,
}

#[derive(Serialize)]
struct RunReport {
    elapsed_ms: u128,
    deployed: bool,
    deployment_mode: bool,
    companion_powered: bool,
    running_channels: Vec<&'static str>,
    lingering_channels: Vec<&'static str>,
    pdu_requests: usize,
    queues: Vec<QueueReport>,
    transmitted: Vec<PacketView>,
}

pub fn run(args: RunArgs, format: OutputFormat) -> CliResult<i32> {
    let duration = parse_duration(&args.duration)?;
    let config = match &args.config {
        Some(path) => FlightConfig::from_path(path).map_err(config_error)?,
        None => FlightConfig::default(),
    };

    let mut bench = SimBench::new(args.voltage);
    if args.deployed {
        bench.deployment = MemoryStore::new(true);
    }
    for packet_type in &args.uplink {
        inject_uplink(&bench, *packet_type)?;
    }

    let mut core = FlightCore::boot(&config, Arc::new(SystemClock::new()), bench.hardware())
        .map_err(|err| scheduler_error("boot failed", err))?;

    let token = CancelToken::new();
    install_ctrlc_handler(token.clone())?;
    let timer = token.clone();
    thread::spawn(move || {
        thread::sleep(duration);
        timer.cancel();
    });

    tracing::info!(?duration, voltage = args.voltage, uplinks = args.uplink.len(), "simulated run");
    let started = Instant::now();
    let backplane = Arc::clone(core.backplane());
    let running_channels = backplane
        .scheduler
        .running()
        .into_iter()
        .map(|(_, name)| name)
        .collect();
    let lingering_channels = core.run(&token);

    let report = RunReport {
        elapsed_ms: started.elapsed().as_millis(),
        deployed: bench.deployment.is_deployed().unwrap_or(false),
        deployment_mode: backplane.deployment_mode(),
        companion_powered: bench.companion_enable.is_set_high(),
        running_channels,
        lingering_channels,
        pdu_requests: bench.pdu.requests().len(),
        queues: backplane
            .queues()
            .iter()
            .map(|queue| QueueReport {
                name: queue.name(),
                len: queue.len(),
                capacity: queue.capacity(),
                evicted: queue.evicted(),
            })
            .collect(),
        transmitted: bench
            .radio
            .transmitted()
            .iter()
            .filter_map(|frame| codec::unwrap(frame).ok())
            .map(|packet| PacketView::new(&packet))
            .collect(),
    };
    print_report(&report, format);
    Ok(SUCCESS)
}

fn inject_uplink(bench: &SimBench, packet_type: PacketType) -> CliResult<()> {
    if !packet_type.is_command() {
        return Err(CliError::new(
            USAGE,
            format!("--uplink expects a command type, got {packet_type}"),
        ));
    }
    let packet = Packet::new(packet_type, NodeId::Ground, NodeId::Obc);
    let frame = codec::wrap_to_bytes(&packet, RADIO_MAX_FRAME)
        .map_err(|err| packet_error("uplink encode failed", err))?;
    bench.radio.inject_rx(&frame);
    Ok(())
}

fn print_report(report: &RunReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Table => {
            println!(
                "ran {} ms, deployed={}, companion_powered={}, channels=[{}], pdu_requests={}",
                report.elapsed_ms,
                report.deployed,
                report.companion_powered,
                report.running_channels.join(", "),
                report.pdu_requests
            );
            for queue in &report.queues {
                println!(
                    "queue {}: {}/{} evicted={}",
                    queue.name, queue.len, queue.capacity, queue.evicted
                );
            }
            println!("{}", packet_table(&report.transmitted));
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            println!(
                "elapsed_ms={} deployed={} deployment_mode={} companion_powered={} pdu_requests={}",
                report.elapsed_ms,
                report.deployed,
                report.deployment_mode,
                report.companion_powered,
                report.pdu_requests
            );
            for view in &report.transmitted {
                println!("tx {}", pretty(view));
            }
        }
    }
}

fn install_ctrlc_handler(token: CancelToken) -> CliResult<()> {
    ctrlc::set_handler(move || token.cancel()).map_err(|err| {
        CliError::new(INTERNAL, format!("signal handler setup failed: {err}"))
    })
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(match unit {
        "ms" => Duration::from_millis(value),
        _ => Duration::from_secs(value),
    })
}
