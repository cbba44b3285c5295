use std::fmt::Write as _;
use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use flightcore_packet::{Beacon, Command, Packet, PacketType};
use serde::Serialize;

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

/// A decoded packet as printed by `unwrap` and `run`.
#[derive(Debug, Serialize)]
pub struct PacketView {
    pub packet_type: String,
    pub type_id: u16,
    pub origin: String,
    pub destination: String,
    pub channel_in: u8,
    pub channel_out: u8,
    pub payload_size: usize,
    pub payload: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decoded: Option<String>,
}

impl PacketView {
    pub fn new(packet: &Packet) -> Self {
        Self {
            packet_type: packet.packet_type.to_string(),
            type_id: packet.packet_type.0,
            origin: packet.origin.to_string(),
            destination: packet.destination.to_string(),
            channel_in: packet.channel_in.0,
            channel_out: packet.channel_out.0,
            payload_size: packet.payload.len(),
            payload: payload_preview(&packet.payload),
            decoded: describe(packet),
        }
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.packet_type.clone(),
            format!("{} -> {}", self.origin, self.destination),
            format!("{} -> {}", self.channel_in, self.channel_out),
            self.payload_size.to_string(),
            self.decoded.clone().unwrap_or_else(|| self.payload.clone()),
        ]
    }
}

/// Typed view of the payload when the packet type has one.
fn describe(packet: &Packet) -> Option<String> {
    if packet.packet_type == PacketType::DATA_OBC_BEACON {
        return Beacon::decode(&packet.payload)
            .ok()
            .map(|beacon| format!("{beacon:?}"));
    }
    if !packet.packet_type.is_command() {
        return None;
    }
    match Command::decode(packet) {
        Ok(Command::Unsupported(_)) => None,
        Ok(command) => Some(format!("{command:?}")),
        Err(err) => Some(format!("<{err}>")),
    }
}

pub fn packet_table(views: &[PacketView]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["TYPE", "ROUTE", "CHANNELS", "SIZE", "PAYLOAD"]);
    for view in views {
        table.add_row(view.row());
    }
    table
}

pub fn print_packet(packet: &Packet, format: OutputFormat) {
    let view = PacketView::new(packet);
    match format {
        OutputFormat::Json => print_json(&view),
        OutputFormat::Table => println!("{}", packet_table(std::slice::from_ref(&view))),
        OutputFormat::Pretty => println!("{}", pretty(&view)),
        OutputFormat::Raw => print_raw(&packet.payload),
    }
}

pub fn pretty(view: &PacketView) -> String {
    let mut line = format!(
        "type={} ({:#06x}) {}->{} chanin={} chanout={} size={} payload={}",
        view.packet_type,
        view.type_id,
        view.origin,
        view.destination,
        view.channel_in,
        view.channel_out,
        view.payload_size,
        view.payload
    );
    if let Some(decoded) = &view.decoded {
        let _ = write!(line, " decoded={decoded}");
    }
    line
}

pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

pub fn to_hex(data: &[u8]) -> String {
    data.iter().fold(String::with_capacity(data.len() * 2), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) if !text.chars().any(char::is_control) => text.to_string(),
        _ => format!("0x{}", to_hex(payload)),
    }
}

#[cfg(test)]
mod tests {
    use flightcore_packet::{NodeId, Switch, SwitchState};

    use super::*;

    #[test]
    fn text_payloads_print_as_text_and_binary_as_hex() {
        assert_eq!(payload_preview(b"Pong"), "Pong");
        assert_eq!(payload_preview(&[0x10, 0xff]), "0x10ff");
        assert_eq!(to_hex(&[]), "");
    }

    #[test]
    fn switch_command_is_described() {
        let packet = Command::EpsSwitchName {
            switch: Switch::HEATER,
            state: SwitchState::On,
            force: false,
        }
        .to_packet(NodeId::Ground, NodeId::Obc);
        let view = PacketView::new(&packet);
        assert_eq!(view.packet_type, "CommandEpsSwitchName");
        assert!(view.decoded.unwrap().contains("Rail5vB"));
    }

    #[test]
    fn data_packets_without_typed_payload_are_not_described() {
        let packet = Packet::new(PacketType::DATA_OBC_PONG, NodeId::Obc, NodeId::Ground)
            .with_payload(&b"Pong"[..]);
        assert!(PacketView::new(&packet).decoded.is_none());
    }
}
