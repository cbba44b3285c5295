use bytes::BytesMut;
use flightcore_packet::{codec, deframe, Packet, DEFAULT_MAX_FRAME};

use crate::cmd::{parse_hex, UnwrapArgs};
use crate::exit::{packet_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_packet, OutputFormat};

pub fn run(args: UnwrapArgs, format: OutputFormat) -> CliResult<i32> {
    let bytes = parse_hex(&args.frame)?;
    let packet = decode(&bytes, args.slip)?;
    print_packet(&packet, format);
    Ok(SUCCESS)
}

fn decode(bytes: &[u8], slip: bool) -> CliResult<Packet> {
    if !slip {
        return codec::unwrap(bytes).map_err(|err| packet_error("unwrap failed", err));
    }
    let mut buf = BytesMut::from(bytes);
    match deframe(&mut buf, DEFAULT_MAX_FRAME) {
        Ok(Some(packet)) => Ok(packet),
        Ok(None) => Err(CliError::new(DATA_INVALID, "no complete SLIP frame in input")),
        Err(err) => Err(packet_error("deframe failed", err)),
    }
}
