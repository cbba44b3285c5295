//! In-memory devices for host runs and tests.
//!
//! Each simulated device is a cheap handle over shared state: clone it,
//! hand one copy to the code under test and keep the other to inject
//! input and inspect output.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{HalError, Result};
use crate::traits::{OutputPin, RadioDevice, RadioSettings, SerialPort};

fn lock<T>(state: &Mutex<T>) -> MutexGuard<'_, T> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct SerialState {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
    write_budget: Option<usize>,
}

/// A serial port backed by in-memory buffers.
#[derive(Debug, Clone, Default)]
pub struct SimSerial {
    state: Arc<Mutex<SerialState>>,
}

impl SimSerial {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes for the device side to read.
    pub fn inject_rx(&self, data: &[u8]) {
        lock(&self.state).rx.extend(data.iter().copied());
    }

    /// Drain everything written so far.
    pub fn take_tx(&self) -> Vec<u8> {
        std::mem::take(&mut lock(&self.state).tx)
    }

    /// Accept only `bytes` more bytes; later writes report zero bytes written.
    pub fn limit_writes(&self, bytes: usize) {
        lock(&self.state).write_budget = Some(bytes);
    }
}

impl Read for SimSerial {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = lock(&self.state);
        if state.rx.is_empty() {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let n = buf.len().min(state.rx.len());
        for (slot, byte) in buf.iter_mut().zip(state.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for SimSerial {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = lock(&self.state);
        let n = match state.write_budget {
            Some(budget) => {
                let n = budget.min(buf.len());
                state.write_budget = Some(budget - n);
                n
            }
            None => buf.len(),
        };
        state.tx.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SerialPort for SimSerial {
    fn available(&self) -> usize {
        lock(&self.state).rx.len()
    }
}

/// Power state of a simulated transceiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RadioMode {
    #[default]
    Off,
    Idle,
    Sleep,
    Receive,
    Transmit,
}

#[derive(Debug, Default)]
struct RadioState {
    settings: Option<RadioSettings>,
    init_failures: u32,
    mode: RadioMode,
    history: Vec<RadioMode>,
    on_air: Vec<Vec<u8>>,
    pending_rx: VecDeque<Vec<u8>>,
    confirm_sends: bool,
}

impl RadioState {
    fn enter(&mut self, mode: RadioMode) {
        if self.mode != mode {
            self.mode = mode;
            self.history.push(mode);
        }
    }
}

/// A transceiver that records transmissions and replays injected receptions.
#[derive(Debug, Clone)]
pub struct SimRadio {
    max_len: usize,
    state: Arc<Mutex<RadioState>>,
}

impl SimRadio {
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len,
            state: Arc::new(Mutex::new(RadioState {
                confirm_sends: true,
                ..RadioState::default()
            })),
        }
    }

    /// Make the next `count` calls to `init` fail.
    pub fn fail_init(&self, count: u32) {
        lock(&self.state).init_failures = count;
    }

    /// When false, transmissions never report completion.
    pub fn confirm_sends(&self, confirm: bool) {
        lock(&self.state).confirm_sends = confirm;
    }

    /// Deliver a frame as if it had been received over the air.
    pub fn inject_rx(&self, frame: &[u8]) {
        lock(&self.state).pending_rx.push_back(frame.to_vec());
    }

    /// Frames transmitted so far.
    pub fn transmitted(&self) -> Vec<Vec<u8>> {
        lock(&self.state).on_air.clone()
    }

    pub fn mode(&self) -> RadioMode {
        lock(&self.state).mode
    }

    /// Every mode change since creation, oldest first.
    pub fn mode_history(&self) -> Vec<RadioMode> {
        lock(&self.state).history.clone()
    }

    pub fn settings(&self) -> Option<RadioSettings> {
        lock(&self.state).settings
    }
}

impl RadioDevice for SimRadio {
    fn init(&mut self, settings: &RadioSettings) -> Result<()> {
        let mut state = lock(&self.state);
        if state.init_failures > 0 {
            state.init_failures -= 1;
            return Err(HalError::device("radio", "no response on SPI"));
        }
        state.settings = Some(*settings);
        state.enter(RadioMode::Idle);
        Ok(())
    }

    fn max_message_len(&self) -> usize {
        self.max_len
    }

    fn send(&mut self, frame: &[u8]) -> Result<()> {
        if frame.len() > self.max_len {
            return Err(HalError::device("radio", "frame exceeds FIFO"));
        }
        let mut state = lock(&self.state);
        if state.settings.is_none() {
            return Err(HalError::device("radio", "not initialised"));
        }
        state.enter(RadioMode::Transmit);
        if state.confirm_sends {
            state.on_air.push(frame.to_vec());
        }
        Ok(())
    }

    fn packet_sent(&mut self) -> Result<bool> {
        let mut state = lock(&self.state);
        if state.mode == RadioMode::Transmit && state.confirm_sends {
            state.enter(RadioMode::Idle);
            return Ok(true);
        }
        Ok(state.mode != RadioMode::Transmit)
    }

    fn available(&mut self) -> Result<bool> {
        let mut state = lock(&self.state);
        if state.mode != RadioMode::Transmit {
            state.enter(RadioMode::Receive);
        }
        Ok(!state.pending_rx.is_empty())
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        let mut state = lock(&self.state);
        let Some(frame) = state.pending_rx.pop_front() else {
            return Ok(None);
        };
        let n = frame.len().min(buf.len());
        buf[..n].copy_from_slice(&frame[..n]);
        Ok(Some(n))
    }

    fn sleep(&mut self) -> Result<()> {
        lock(&self.state).enter(RadioMode::Sleep);
        Ok(())
    }

    fn set_idle(&mut self) -> Result<()> {
        lock(&self.state).enter(RadioMode::Idle);
        Ok(())
    }
}

/// A digital output whose level can be observed from another handle.
#[derive(Debug, Clone, Default)]
pub struct SimPin {
    level: Arc<AtomicBool>,
}

impl SimPin {
    pub fn new(high: bool) -> Self {
        Self {
            level: Arc::new(AtomicBool::new(high)),
        }
    }
}

impl OutputPin for SimPin {
    fn set_high(&mut self) {
        self.level.store(true, Ordering::SeqCst);
    }

    fn set_low(&mut self) {
        self.level.store(false, Ordering::SeqCst);
    }

    fn is_set_high(&self) -> bool {
        self.level.load(Ordering::SeqCst)
    }
}
