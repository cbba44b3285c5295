use std::io::{ErrorKind, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::BytesMut;
use flightcore_hal::{Clock, SerialPort};
use flightcore_packet::{Switch, SwitchState, PHYSICAL_SWITCHES, TELEMETRY_SWITCHES};

use crate::config::PduConfig;
use crate::error::PduError;
use crate::pdu::wire::{PduReply, PduRequest, TELEMETRY_LEN};

const READ_CHUNK: usize = 64;

/// Last confirmed state of every physical PDU switch.
///
/// Entries start unknown and are written only from PDU replies.
#[derive(Debug, Default)]
pub struct SwitchCache {
    states: Mutex<[Option<SwitchState>; PHYSICAL_SWITCHES]>,
}

impl SwitchCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, [Option<SwitchState>; PHYSICAL_SWITCHES]> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Confirmed state of a switch; `None` if unknown or not a PDU switch.
    pub fn get(&self, switch: Switch) -> Option<SwitchState> {
        switch.cache_slot().and_then(|slot| self.lock()[slot])
    }

    /// States of the telemetry switches, in wire order.
    pub fn telemetry(&self) -> [Option<SwitchState>; TELEMETRY_LEN] {
        let states = self.lock();
        TELEMETRY_SWITCHES.map(|switch| switch.cache_slot().and_then(|slot| states[slot]))
    }

    pub(crate) fn record(&self, switch: Switch, state: SwitchState) {
        if let Some(slot) = switch.cache_slot() {
            self.lock()[slot] = Some(state);
        }
    }

    pub(crate) fn record_telemetry(&self, states: &[SwitchState; TELEMETRY_LEN]) {
        let mut cache = self.lock();
        for (switch, state) in TELEMETRY_SWITCHES.iter().zip(states) {
            if let Some(slot) = switch.cache_slot() {
                cache[slot] = Some(*state);
            }
        }
    }
}

/// Request/reply driver for the PDU board.
///
/// Owns the serial link exclusively; no bus lock is involved.
pub struct PduEngine<S> {
    serial: S,
    clock: Arc<dyn Clock>,
    config: PduConfig,
    cache: Arc<SwitchCache>,
    rx: BytesMut,
    round_trips: u64,
}

impl<S: SerialPort> PduEngine<S> {
    pub fn new(serial: S, clock: Arc<dyn Clock>, config: PduConfig, cache: Arc<SwitchCache>) -> Self {
        Self {
            serial,
            clock,
            config,
            cache,
            rx: BytesMut::with_capacity(READ_CHUNK),
            round_trips: 0,
        }
    }

    pub fn cache(&self) -> &Arc<SwitchCache> {
        &self.cache
    }

    /// Requests written to the PDU so far.
    pub fn round_trips(&self) -> u64 {
        self.round_trips
    }

    pub fn config(&self) -> &PduConfig {
        &self.config
    }

    /// Send one ping and wait up to the reply timeout for a pong.
    pub fn ping(&mut self) -> Result<(), PduError> {
        self.exchange(PduRequest::ping(), |reply| {
            matches!(reply, PduReply::Pong).then_some(())
        })
    }

    /// Ping until answered, up to the configured retry count.
    pub fn ping_with_retry(&mut self) -> Result<(), PduError> {
        self.with_retries("ping", Self::ping)
    }

    /// Drive a switch and wait for the PDU to confirm it.
    ///
    /// Succeeds without touching the link when the cache already shows the
    /// requested state. For [`Switch::All`] the PDU answers with telemetry,
    /// which replaces the cached telemetry states.
    pub fn set_switch(&mut self, switch: Switch, state: SwitchState) -> Result<(), PduError> {
        if matches!(switch, Switch::None | Switch::Companion) {
            return Err(PduError::InvalidSwitch(switch));
        }
        if self.already_in(switch, state) {
            tracing::debug!(%switch, %state, "switch already in requested state");
            return Ok(());
        }

        let request = PduRequest::set_switch(switch, state);
        let reported = self.with_retries("set switch", |engine| {
            if switch == Switch::All {
                let states = engine.exchange(request, telemetry_reply)?;
                engine.cache.record_telemetry(&states);
                Ok(states.iter().copied().find(|s| *s != state).unwrap_or(state))
            } else {
                let reported = engine.exchange(request, |reply| match reply {
                    PduReply::SwitchStatus {
                        switch: got,
                        state: reported,
                    } if *got == switch => Some(*reported),
                    _ => None,
                })?;
                engine.cache.record(switch, reported);
                Ok(reported)
            }
        })?;

        if reported != state {
            return Err(PduError::NotConfirmed {
                switch,
                requested: state,
                reported,
            });
        }
        tracing::info!(%switch, %state, "switch confirmed");
        Ok(())
    }

    /// Query every switch and overwrite the cached telemetry states.
    pub fn refresh_switch_states(&mut self) -> Result<(), PduError> {
        let states = self.with_retries("switch status", |engine| {
            engine.exchange(PduRequest::switch_status(Switch::All), telemetry_reply)
        })?;
        self.cache.record_telemetry(&states);
        tracing::debug!("switch states refreshed");
        Ok(())
    }

    pub fn set_heater(&mut self, state: SwitchState) -> Result<(), PduError> {
        self.set_switch(Switch::HEATER, state)
    }

    pub fn set_burn_wire(&mut self, state: SwitchState) -> Result<(), PduError> {
        self.set_switch(Switch::BURN_WIRE, state)
    }

    fn already_in(&self, switch: Switch, state: SwitchState) -> bool {
        if switch == Switch::All {
            self.cache.telemetry().iter().all(|s| *s == Some(state))
        } else {
            self.cache.get(switch) == Some(state)
        }
    }

    /// Repeat `attempt` while it times out, pausing the retry interval
    /// between tries.
    fn with_retries<T>(
        &mut self,
        what: &'static str,
        mut attempt: impl FnMut(&mut Self) -> Result<T, PduError>,
    ) -> Result<T, PduError> {
        let tries = self.config.max_retries.max(1);
        let mut tried = 0;
        loop {
            tried += 1;
            match attempt(self) {
                Err(PduError::Timeout(timeout)) if tried < tries => {
                    tracing::warn!(what, attempt = tried, ?timeout, "PDU did not answer, retrying");
                    self.clock.sleep(self.config.retry_interval);
                }
                other => return other,
            }
        }
    }

    /// Write one request and wait for the first reply `accept` recognises.
    ///
    /// Replies that are not accepted, and lines that fail to decode, are
    /// discarded while waiting. Fails with [`PduError::Timeout`] once the
    /// reply timeout has elapsed.
    fn exchange<T>(
        &mut self,
        request: PduRequest,
        mut accept: impl FnMut(&PduReply) -> Option<T>,
    ) -> Result<T, PduError> {
        self.discard_input()?;
        self.write_request(&request)?;

        let timeout = self.config.reply_timeout;
        let deadline = self.clock.now() + timeout;
        loop {
            self.fill()?;
            while let Some(line) = self.next_line() {
                match PduReply::decode(&line) {
                    Ok(reply) => {
                        if let Some(value) = accept(&reply) {
                            return Ok(value);
                        }
                        tracing::debug!(?reply, request = ?request.kind, "ignoring unmatched PDU reply");
                    }
                    Err(err) => tracing::warn!(error = %err, "discarding PDU line"),
                }
            }

            let now = self.clock.now();
            if now >= deadline {
                tracing::warn!(request = ?request.kind, ?timeout, "PDU reply timed out");
                return Err(PduError::Timeout(timeout));
            }
            self.clock.sleep(self.config.poll_interval.min(deadline - now));
        }
    }

    fn write_request(&mut self, request: &PduRequest) -> Result<(), PduError> {
        let mut frame = BytesMut::new();
        request.encode(&mut frame);
        self.serial.write_all(&frame)?;
        self.serial.flush()?;
        self.round_trips += 1;
        tracing::debug!(
            kind = ?request.kind,
            switch = %request.switch,
            state = %request.state,
            "sent PDU request"
        );
        Ok(())
    }

    /// Drop anything left over from an earlier exchange.
    fn discard_input(&mut self) -> Result<(), PduError> {
        self.fill()?;
        if !self.rx.is_empty() {
            tracing::debug!(len = self.rx.len(), "discarding stale PDU input");
            self.rx.clear();
        }
        Ok(())
    }

    /// Move every byte the port has buffered into `rx` without blocking.
    fn fill(&mut self) -> Result<(), PduError> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.serial.read(&mut chunk) {
                Ok(0) => return Ok(()),
                Ok(n) => self.rx.extend_from_slice(&chunk[..n]),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn next_line(&mut self) -> Option<BytesMut> {
        let end = self.rx.iter().position(|b| *b == b'\n')?;
        Some(self.rx.split_to(end + 1))
    }
}

fn telemetry_reply(reply: &PduReply) -> Option<[SwitchState; TELEMETRY_LEN]> {
    match reply {
        PduReply::Telemetry(states) => Some(*states),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use flightcore_hal::sim::SimSerial;
    use flightcore_hal::ManualClock;

    use super::*;
    use crate::pdu::sim::SimPdu;
    use crate::pdu::wire::PduType;

    fn engine<S: SerialPort>(serial: S, clock: &ManualClock) -> PduEngine<S> {
        PduEngine::new(
            serial,
            Arc::new(clock.clone()),
            PduConfig::default(),
            Arc::new(SwitchCache::new()),
        )
    }

    #[test]
    fn ping_succeeds_on_pong() {
        let clock = ManualClock::new();
        let pdu = SimPdu::new();
        let mut engine = engine(pdu.clone(), &clock);
        engine.ping().unwrap();
        assert_eq!(pdu.requests()[0].kind, PduType::CommandPing);
        assert_eq!(clock.now(), Duration::ZERO);
    }

    #[test]
    fn ping_without_reply_fails_after_exactly_the_timeout() {
        let clock = ManualClock::new();
        let mut engine = engine(SimSerial::new(), &clock);
        let err = engine.ping().unwrap_err();
        assert!(matches!(err, PduError::Timeout(t) if t == Duration::from_secs(5)));
        assert_eq!(clock.now(), Duration::from_secs(5));
    }

    #[test]
    fn ping_timeout_is_exact_for_uneven_poll_intervals() {
        let clock = ManualClock::new();
        let mut config = PduConfig::default();
        config.reply_timeout = Duration::from_millis(250);
        config.poll_interval = Duration::from_millis(100);
        let mut engine = PduEngine::new(
            SimSerial::new(),
            Arc::new(clock.clone()),
            config,
            Arc::new(SwitchCache::new()),
        );
        assert!(engine.ping().is_err());
        assert_eq!(clock.now(), Duration::from_millis(250));
    }

    #[test]
    fn set_switch_updates_cache_from_confirmed_reply() {
        let clock = ManualClock::new();
        let pdu = SimPdu::new();
        let mut engine = engine(pdu.clone(), &clock);

        assert_eq!(engine.cache().get(Switch::HEATER), None);
        engine.set_heater(SwitchState::On).unwrap();
        assert_eq!(engine.cache().get(Switch::HEATER), Some(SwitchState::On));
        assert_eq!(pdu.switch_state(Switch::HEATER), SwitchState::On);
    }

    #[test]
    fn set_switch_twice_costs_one_round_trip() {
        let clock = ManualClock::new();
        let pdu = SimPdu::new();
        let mut engine = engine(pdu.clone(), &clock);

        engine.set_switch(Switch::Rail12v, SwitchState::On).unwrap();
        let after_first = engine.round_trips();
        engine.set_switch(Switch::Rail12v, SwitchState::On).unwrap();
        assert_eq!(engine.round_trips(), after_first);
        assert_eq!(pdu.requests().len(), 1);
    }

    #[test]
    fn silent_pdu_leaves_cache_untouched() {
        let clock = ManualClock::new();
        let pdu = SimPdu::new();
        pdu.set_silent(true);
        let mut engine = engine(pdu.clone(), &clock);

        let err = engine.set_burn_wire(SwitchState::On).unwrap_err();
        assert!(matches!(err, PduError::Timeout(_)));
        assert_eq!(engine.cache().get(Switch::BURN_WIRE), None);
        // three attempts, two pauses between them
        assert_eq!(pdu.requests().len(), 3);
        assert_eq!(clock.now(), Duration::from_secs(3 * 5 + 2));
    }

    #[test]
    fn reply_for_another_switch_is_not_a_confirmation() {
        let clock = ManualClock::new();
        let pdu = SimPdu::new();
        pdu.script_reply(PduReply::SwitchStatus {
            switch: Switch::Rail5vC,
            state: SwitchState::On,
        });
        let mut config = PduConfig::default();
        config.max_retries = 1;
        let mut engine = PduEngine::new(
            pdu,
            Arc::new(clock.clone()),
            config,
            Arc::new(SwitchCache::new()),
        );

        let err = engine.set_heater(SwitchState::On).unwrap_err();
        assert!(matches!(err, PduError::Timeout(_)));
        assert_eq!(engine.cache().get(Switch::HEATER), None);
        assert_eq!(engine.cache().get(Switch::Rail5vC), None);
    }

    #[test]
    fn reported_state_is_cached_even_when_it_differs() {
        let clock = ManualClock::new();
        let pdu = SimPdu::new();
        pdu.script_reply(PduReply::SwitchStatus {
            switch: Switch::HEATER,
            state: SwitchState::Off,
        });
        let mut engine = engine(pdu, &clock);

        let err = engine.set_heater(SwitchState::On).unwrap_err();
        assert!(matches!(
            err,
            PduError::NotConfirmed {
                reported: SwitchState::Off,
                ..
            }
        ));
        assert_eq!(engine.cache().get(Switch::HEATER), Some(SwitchState::Off));
    }

    #[test]
    fn set_all_accepts_only_telemetry() {
        let clock = ManualClock::new();
        let pdu = SimPdu::new();
        let mut engine = engine(pdu.clone(), &clock);

        engine.set_switch(Switch::All, SwitchState::On).unwrap();
        assert!(engine
            .cache()
            .telemetry()
            .iter()
            .all(|s| *s == Some(SwitchState::On)));
        // burn1/burn2 are outside telemetry and stay unknown
        assert_eq!(engine.cache().get(Switch::Burn2), None);
    }

    #[test]
    fn refresh_overwrites_telemetry_states() {
        let clock = ManualClock::new();
        let pdu = SimPdu::new();
        pdu.force_state(Switch::Vbatt, SwitchState::On);
        let mut engine = engine(pdu.clone(), &clock);

        engine.refresh_switch_states().unwrap();
        assert_eq!(engine.cache().get(Switch::Vbatt), Some(SwitchState::On));
        assert_eq!(engine.cache().get(Switch::Rail3v3A), Some(SwitchState::Off));
    }

    #[test]
    fn companion_and_none_are_not_pdu_switches() {
        let clock = ManualClock::new();
        let mut engine = engine(SimPdu::new(), &clock);
        for switch in [Switch::Companion, Switch::None] {
            assert!(matches!(
                engine.set_switch(switch, SwitchState::On),
                Err(PduError::InvalidSwitch(s)) if s == switch
            ));
        }
        assert_eq!(engine.round_trips(), 0);
    }

    #[test]
    fn stale_input_is_discarded_before_a_request() {
        let clock = ManualClock::new();
        let pdu = SimPdu::new();
        pdu.inject_stale(b"5>1\n");
        let mut engine = engine(pdu.clone(), &clock);

        engine.set_burn_wire(SwitchState::Off).unwrap();
        assert_eq!(engine.cache().get(Switch::BURN_WIRE), Some(SwitchState::Off));
    }
}
