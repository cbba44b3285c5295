//! Channel lifecycle and execution.
//!
//! Each channel runs on its own execution context with its own stack
//! budget. The [`Scheduler`] keeps a registry of running channels keyed by
//! [`ChannelId`]; lifecycle moves strictly `NotStarted -> Running -> Killed`.
//!
//! Cancellation is cooperative: `kill` flags the channel and drops it from
//! the registry, and the channel observes the flag at its next yield point
//! ([`ChannelContext::sleep`] or the top of its run loop).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use flightcore_hal::Clock;
use flightcore_packet::ChannelId;

use crate::error::SchedulerError;

/// Smallest stack handed to a hosted thread, whatever the channel asks for.
const MIN_HOSTED_STACK: usize = 256 * 1024;

const JOIN_POLL: Duration = Duration::from_millis(1);

/// Lifecycle of a channel identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    NotStarted,
    Running,
    Killed,
}

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn same_as(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// What a running channel knows about itself.
#[derive(Clone)]
pub struct ChannelContext {
    id: ChannelId,
    name: &'static str,
    token: CancelToken,
    clock: Arc<dyn Clock>,
    slice: Duration,
}

impl ChannelContext {
    /// A context not tied to any registry, for driving channel logic inline.
    pub fn detached(
        id: ChannelId,
        name: &'static str,
        clock: Arc<dyn Clock>,
        slice: Duration,
    ) -> Self {
        Self {
            id,
            name,
            token: CancelToken::new(),
            clock,
            slice,
        }
    }

    /// Share cancellation with an existing token.
    pub fn with_token(mut self, token: CancelToken) -> Self {
        self.token = token;
        self
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Sleep for `duration` in slice-sized steps.
    ///
    /// Returns `false` as soon as the channel is cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        let step = if self.slice.is_zero() {
            duration
        } else {
            self.slice
        };
        let mut remaining = duration;
        while !remaining.is_zero() {
            if self.is_cancelled() {
                return false;
            }
            let nap = remaining.min(step);
            self.clock.sleep(nap);
            remaining -= nap;
        }
        !self.is_cancelled()
    }
}

impl std::fmt::Debug for ChannelContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelContext")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// A unit of work with a setup phase and a periodic run step.
pub trait Channel: Send + 'static {
    fn id(&self) -> ChannelId;

    fn name(&self) -> &'static str;

    /// Stack the channel was sized for on flight hardware.
    fn stack_budget(&self) -> usize;

    /// Runs once before the first `run_once`.
    fn setup(&mut self, ctx: &ChannelContext);

    /// One pass of the channel loop.
    fn run_once(&mut self, ctx: &ChannelContext);

    /// Delay between passes.
    fn period(&self) -> Duration;
}

/// Drive a channel until it is cancelled.
pub fn run_channel<C: Channel>(mut channel: C, ctx: &ChannelContext) {
    tracing::info!(channel = ctx.name(), "channel starting");
    channel.setup(ctx);
    while !ctx.is_cancelled() {
        channel.run_once(ctx);
        if !ctx.sleep(channel.period()) {
            break;
        }
    }
    tracing::info!(channel = ctx.name(), "channel stopped");
}

struct Entry {
    id: ChannelId,
    name: &'static str,
    token: CancelToken,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Registry {
    running: Vec<Entry>,
    states: HashMap<ChannelId, ChannelState>,
    stopping: Vec<(&'static str, JoinHandle<()>)>,
}

impl Registry {
    fn remove(&mut self, pos: usize) -> (ChannelId, &'static str, CancelToken) {
        let entry = self.running.remove(pos);
        self.states.insert(entry.id, ChannelState::Killed);
        self.stopping.push((entry.name, entry.handle));
        (entry.id, entry.name, entry.token)
    }
}

struct Inner {
    clock: Arc<dyn Clock>,
    slice: Duration,
    registry: Mutex<Registry>,
}

impl Inner {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop a channel whose entry point returned on its own.
    fn retire(&self, id: ChannelId, token: &CancelToken) {
        let mut registry = self.registry();
        if let Some(pos) = registry
            .running
            .iter()
            .position(|entry| entry.id == id && entry.token.same_as(token))
        {
            registry.remove(pos);
        }
    }
}

/// Registry of running channels.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(clock: Arc<dyn Clock>, slice: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                clock,
                slice,
                registry: Mutex::new(Registry::default()),
            }),
        }
    }

    /// Register a channel and begin executing `entry` on a new context.
    ///
    /// Fails with [`SchedulerError::AlreadyRunning`] if a channel with the
    /// same identity is registered.
    pub fn start<F>(
        &self,
        id: ChannelId,
        name: &'static str,
        stack_budget: usize,
        entry: F,
    ) -> Result<(), SchedulerError>
    where
        F: FnOnce(&ChannelContext) + Send + 'static,
    {
        let mut registry = self.inner.registry();
        if registry.running.iter().any(|entry| entry.id == id) {
            return Err(SchedulerError::AlreadyRunning(id));
        }

        let ctx = ChannelContext {
            id,
            name,
            token: CancelToken::new(),
            clock: Arc::clone(&self.inner.clock),
            slice: self.inner.slice,
        };
        let token = ctx.token.clone();
        let inner = Arc::clone(&self.inner);

        let handle = thread::Builder::new()
            .name(name.to_string())
            .stack_size(stack_budget.max(MIN_HOSTED_STACK))
            .spawn(move || {
                entry(&ctx);
                inner.retire(ctx.id, &ctx.token);
            })
            .map_err(|source| SchedulerError::Spawn { name, source })?;

        registry.running.push(Entry {
            id,
            name,
            token,
            handle,
        });
        registry.states.insert(id, ChannelState::Running);
        tracing::info!(channel = name, id = id.0, stack_budget, "channel registered");
        Ok(())
    }

    /// Start a [`Channel`] implementation.
    pub fn spawn<C: Channel>(&self, channel: C) -> Result<(), SchedulerError> {
        let id = channel.id();
        let name = channel.name();
        let stack = channel.stack_budget();
        self.start(id, name, stack, move |ctx| run_channel(channel, ctx))
    }

    /// Stop the first registered channel with this identity.
    ///
    /// The registry is left untouched when no channel matches.
    pub fn kill(&self, id: ChannelId) -> Result<(), SchedulerError> {
        let mut registry = self.inner.registry();
        let pos = registry
            .running
            .iter()
            .position(|entry| entry.id == id)
            .ok_or(SchedulerError::NotFound(id))?;
        let (_, name, token) = registry.remove(pos);
        token.cancel();
        tracing::info!(channel = name, id = id.0, "channel killed");
        Ok(())
    }

    pub fn state(&self, id: ChannelId) -> ChannelState {
        self.inner
            .registry()
            .states
            .get(&id)
            .copied()
            .unwrap_or(ChannelState::NotStarted)
    }

    pub fn is_running(&self, id: ChannelId) -> bool {
        self.state(id) == ChannelState::Running
    }

    /// Identities and names of running channels, in start order.
    pub fn running(&self) -> Vec<(ChannelId, &'static str)> {
        self.inner
            .registry()
            .running
            .iter()
            .map(|entry| (entry.id, entry.name))
            .collect()
    }

    /// Kill every running channel.
    pub fn shutdown(&self) {
        let ids: Vec<ChannelId> = self.running().into_iter().map(|(id, _)| id).collect();
        for id in ids {
            let _ = self.kill(id);
        }
    }

    /// Wait up to `grace` for stopped channels to leave their contexts.
    ///
    /// Returns the names of channels still executing at the deadline. Their
    /// threads are detached; a channel blocked in a hardware wait finishes
    /// it on its own.
    pub fn join(&self, grace: Duration) -> Vec<&'static str> {
        let mut pending = std::mem::take(&mut self.inner.registry().stopping);
        let deadline = Instant::now() + grace;
        loop {
            let (finished, rest): (Vec<_>, Vec<_>) = pending
                .into_iter()
                .partition(|(_, handle)| handle.is_finished());
            for (name, handle) in finished {
                if handle.join().is_err() {
                    tracing::error!(channel = name, "channel panicked");
                }
            }
            pending = rest;
            if pending.is_empty() || Instant::now() >= deadline {
                break;
            }
            thread::sleep(JOIN_POLL);
        }

        let lingering: Vec<&'static str> = pending.iter().map(|(name, _)| *name).collect();
        if !lingering.is_empty() {
            tracing::warn!(?lingering, ?grace, "channels still running after shutdown grace");
        }
        lingering
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("running", &self.running())
            .finish()
    }
}
