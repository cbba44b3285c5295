use bytes::BytesMut;
use flightcore_packet::{codec, frame, ChannelId, Packet, DEFAULT_MAX_FRAME, RADIO_MAX_FRAME};
use serde::Serialize;

use crate::cmd::{parse_hex, WrapArgs};
use crate::exit::{packet_error, CliResult, SUCCESS};
use crate::output::{print_json, print_raw, to_hex, OutputFormat, PacketView};

#[derive(Serialize)]
struct WrapOutput {
    encoding: &'static str,
    frame_size: usize,
    frame: String,
    packet: PacketView,
}

pub fn run(args: WrapArgs, format: OutputFormat) -> CliResult<i32> {
    let packet = build_packet(&args)?;
    let encoded = encode(&packet, args.slip)?;
    let encoding = if args.slip { "slip" } else { "radio" };

    match format {
        OutputFormat::Json => print_json(&WrapOutput {
            encoding,
            frame_size: encoded.len(),
            frame: to_hex(&encoded),
            packet: PacketView::new(&packet),
        }),
        OutputFormat::Raw => print_raw(&encoded),
        OutputFormat::Table | OutputFormat::Pretty => println!("{}", to_hex(&encoded)),
    }
    Ok(SUCCESS)
}

fn build_packet(args: &WrapArgs) -> CliResult<Packet> {
    let payload = match (&args.data, &args.hex) {
        (Some(data), _) => data.as_bytes().to_vec(),
        (None, Some(hex)) => parse_hex(hex)?,
        (None, None) => Vec::new(),
    };
    Ok(Packet::new(args.packet_type, args.from, args.to)
        .with_channels(ChannelId(args.chanin), ChannelId(args.chanout))
        .with_payload(payload))
}

fn encode(packet: &Packet, slip: bool) -> CliResult<BytesMut> {
    let mut out = BytesMut::new();
    let result = if slip {
        frame(packet, DEFAULT_MAX_FRAME, &mut out)
    } else {
        codec::wrap(packet, RADIO_MAX_FRAME, &mut out)
    };
    result.map_err(|err| packet_error("encode failed", err))?;
    Ok(out)
}
