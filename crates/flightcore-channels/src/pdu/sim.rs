//! A serial port that answers like the PDU board.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::BytesMut;
use flightcore_hal::SerialPort;
use flightcore_packet::{Switch, SwitchState, PHYSICAL_SWITCHES, TELEMETRY_SWITCHES};

use crate::pdu::wire::{PduReply, PduRequest, PduType, TELEMETRY_LEN};

#[derive(Debug)]
struct Board {
    switches: [SwitchState; PHYSICAL_SWITCHES],
    line: Vec<u8>,
    rx: VecDeque<u8>,
    requests: Vec<PduRequest>,
    scripted: VecDeque<PduReply>,
    silent: bool,
}

impl Board {
    fn state(&self, switch: Switch) -> SwitchState {
        switch
            .cache_slot()
            .map_or(SwitchState::Off, |slot| self.switches[slot])
    }

    fn telemetry(&self) -> PduReply {
        let mut states = [SwitchState::Off; TELEMETRY_LEN];
        for (slot, switch) in states.iter_mut().zip(TELEMETRY_SWITCHES) {
            *slot = self.state(switch);
        }
        PduReply::Telemetry(states)
    }

    fn answer(&mut self, request: PduRequest) -> Option<PduReply> {
        let reply = match (request.kind, request.switch) {
            (PduType::CommandPing, _) => PduReply::Pong,
            (PduType::CommandSetSwitch, Switch::All) => {
                self.switches = [request.state; PHYSICAL_SWITCHES];
                self.telemetry()
            }
            (PduType::CommandSetSwitch, switch) => {
                if let Some(slot) = switch.cache_slot() {
                    self.switches[slot] = request.state;
                }
                PduReply::SwitchStatus {
                    switch,
                    state: self.state(switch),
                }
            }
            (PduType::CommandGetSwitchStatus, Switch::All) => self.telemetry(),
            (PduType::CommandGetSwitchStatus, switch) => PduReply::SwitchStatus {
                switch,
                state: self.state(switch),
            },
            _ => return None,
        };
        Some(self.scripted.pop_front().unwrap_or(reply))
    }
}

/// Simulated PDU board behind a serial port. Clones share the board.
#[derive(Debug, Clone)]
pub struct SimPdu {
    board: Arc<Mutex<Board>>,
}

impl Default for SimPdu {
    fn default() -> Self {
        Self::new()
    }
}

impl SimPdu {
    /// A board with every switch off.
    pub fn new() -> Self {
        Self {
            board: Arc::new(Mutex::new(Board {
                switches: [SwitchState::Off; PHYSICAL_SWITCHES],
                line: Vec::new(),
                rx: VecDeque::new(),
                requests: Vec::new(),
                scripted: VecDeque::new(),
                silent: false,
            })),
        }
    }

    fn board(&self) -> MutexGuard<'_, Board> {
        self.board.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stop (or resume) answering requests.
    pub fn set_silent(&self, silent: bool) {
        self.board().silent = silent;
    }

    /// Answer the next request with `reply` instead of the real answer.
    pub fn script_reply(&self, reply: PduReply) {
        self.board().scripted.push_back(reply);
    }

    /// Bytes waiting on the line before any request is sent.
    pub fn inject_stale(&self, data: &[u8]) {
        self.board().rx.extend(data.iter().copied());
    }

    /// Flip a switch without a request, as a hardware fault would.
    pub fn force_state(&self, switch: Switch, state: SwitchState) {
        if let Some(slot) = switch.cache_slot() {
            self.board().switches[slot] = state;
        }
    }

    pub fn switch_state(&self, switch: Switch) -> SwitchState {
        self.board().state(switch)
    }

    /// Every request decoded so far, oldest first.
    pub fn requests(&self) -> Vec<PduRequest> {
        self.board().requests.clone()
    }

    /// Set-switch requests for one switch, in order.
    pub fn commands_for(&self, switch: Switch) -> Vec<SwitchState> {
        self.board()
            .requests
            .iter()
            .filter(|r| r.kind == PduType::CommandSetSwitch && r.switch == switch)
            .map(|r| r.state)
            .collect()
    }
}

impl Read for SimPdu {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut board = self.board();
        if board.rx.is_empty() {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let n = buf.len().min(board.rx.len());
        for (slot, byte) in buf.iter_mut().zip(board.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for SimPdu {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut board = self.board();
        for &byte in buf {
            if byte != b'\n' {
                board.line.push(byte);
                continue;
            }
            let line = std::mem::take(&mut board.line);
            let request = match PduRequest::decode(&line) {
                Ok(request) => request,
                Err(err) => {
                    tracing::debug!(error = %err, "sim PDU ignoring request");
                    continue;
                }
            };
            board.requests.push(request);
            if board.silent {
                continue;
            }
            if let Some(reply) = board.answer(request) {
                let mut out = BytesMut::new();
                reply.encode(&mut out);
                board.rx.extend(out.iter().copied());
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SerialPort for SimPdu {
    fn available(&self) -> usize {
        self.board().rx.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn send(pdu: &mut SimPdu, request: PduRequest) -> PduReply {
        let mut frame = BytesMut::new();
        request.encode(&mut frame);
        pdu.write_all(&frame).unwrap();
        let mut buf = [0u8; 32];
        let n = pdu.read(&mut buf).unwrap();
        PduReply::decode(&buf[..n]).unwrap()
    }

    #[test]
    fn answers_ping_and_switch_commands() {
        let mut pdu = SimPdu::new();
        assert_eq!(send(&mut pdu, PduRequest::ping()), PduReply::Pong);
        assert_eq!(
            send(&mut pdu, PduRequest::set_switch(Switch::Burn2, SwitchState::On)),
            PduReply::SwitchStatus {
                switch: Switch::Burn2,
                state: SwitchState::On
            }
        );
        assert_eq!(pdu.switch_state(Switch::Burn2), SwitchState::On);
        assert_eq!(pdu.commands_for(Switch::Burn2), vec![SwitchState::On]);
    }

    #[test]
    fn silent_board_records_but_never_answers() {
        let mut pdu = SimPdu::new();
        pdu.set_silent(true);
        let mut frame = BytesMut::new();
        PduRequest::ping().encode(&mut frame);
        pdu.write_all(&frame).unwrap();
        assert_eq!(pdu.available(), 0);
        assert_eq!(pdu.requests().len(), 1);
    }
}
