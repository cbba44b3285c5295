//! Scoped access to shared hardware buses.
//!
//! A [`BusLock`] owns the device behind a shared bus (the radio on SPI, the
//! sensors on I2C). The device is reachable only inside
//! [`BusLock::transaction`], so the lock is released on every exit path,
//! including early returns and panics. A thread may hold at most one bus
//! at a time.

use std::cell::Cell;
use std::sync::{Mutex, PoisonError};

use crate::error::{HalError, Result};

thread_local! {
    static HELD_BUS: Cell<Option<&'static str>> = const { Cell::new(None) };
}

/// Marks the current thread as holding a bus for the lifetime of the guard.
struct HeldBus;

impl HeldBus {
    fn enter(requested: &'static str) -> Result<Self> {
        HELD_BUS.with(|held| match held.get() {
            Some(current) => Err(HalError::BusAlreadyHeld {
                held: current,
                requested,
            }),
            None => {
                held.set(Some(requested));
                Ok(Self)
            }
        })
    }
}

impl Drop for HeldBus {
    fn drop(&mut self) {
        HELD_BUS.with(|held| held.set(None));
    }
}

/// A named mutex around a bus-attached device.
#[derive(Debug)]
pub struct BusLock<T> {
    name: &'static str,
    device: Mutex<T>,
}

impl<T> BusLock<T> {
    pub fn new(name: &'static str, device: T) -> Self {
        Self {
            name,
            device: Mutex::new(device),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Run one hardware transaction with exclusive access to the device.
    ///
    /// Fails with [`HalError::BusAlreadyHeld`] if the calling thread is
    /// already inside a transaction on any bus.
    pub fn transaction<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let _held = HeldBus::enter(self.name)?;
        let mut device = self.device.lock().unwrap_or_else(PoisonError::into_inner);
        tracing::trace!(bus = self.name, "bus acquired");
        Ok(f(&mut device))
    }

    /// Like [`transaction`](Self::transaction) for closures that return
    /// their own `Result`, flattening bus errors into the caller's type.
    pub fn try_transaction<R, E>(
        &self,
        f: impl FnOnce(&mut T) -> std::result::Result<R, E>,
    ) -> std::result::Result<R, E>
    where
        E: From<HalError>,
    {
        self.transaction(f)?
    }
}

/// Name of the bus the calling thread currently holds, if any.
pub fn held_bus() -> Option<&'static str> {
    HELD_BUS.with(Cell::get)
}
