//! # Supervisor: owns the managed-process slot and its lifecycle.
//!
//! The [`Supervisor`] holds at most one managed process, the effective
//! configuration and the restart guard. All operations are methods on a
//! cloneable handle; clones share the same state.
//!
//! ## Lifecycle
//! ```text
//!              listen()                     readiness
//!   Empty ───────────────► Starting ───────────────────► Running ──┐
//!     ▲                        │         Ready                │     │
//!     │                        │ Failed / exit                │     │ exits on its own
//!     │◄───────────────────────┘ (process signalled)          │     │ (ServerExited)
//!     │                                                        │     │
//!     │◄──────────── kill(): signal, wait for exit ────────────┘     │
//!     │◄─────────────────────────────────────────────────────────────┘
//!
//! restart() = [guard] kill() + listen()
//! reset()   = kill() + config := defaults
//! ```
//!
//! ## Rules
//! - A `listen` while a process is starting or live never spawns; it reports
//!   [`ServerError::AlreadyStarted`] and leaves the slot untouched.
//! - Configuration is committed only when a spawn is actually attempted.
//! - At most one restart is in flight; the others get
//!   [`ServerError::AlreadyRestarting`].
//! - `kill` returns only after the OS reports the process gone.
//! - Only the first of several concurrent `kill`s sends the signal and reports the stop.
//! - State is never locked across an `.await`.
//!
//! ## Example
//! ```no_run
//! use devvisor::{ServerConfig, ServerOverrides, Supervisor};
//!
//! # async fn run() -> Result<(), devvisor::ServerError> {
//! let sup = Supervisor::new(ServerConfig::default());
//! let pid = sup.listen(ServerOverrides::new().path("target/debug/app")).await?;
//! let new_pid = sup.restart().await?;
//! assert_ne!(pid, new_pid);
//! sup.reset(None).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use futures::{Stream, StreamExt, pin_mut};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::builder::SupervisorBuilder;
use super::child::{ChildStreams, ExitInfo, ManagedChild};
use super::readiness::{self, Criteria, Readiness};
use super::slot::Slot;
use crate::config::{ServerConfig, ServerOverrides};
use crate::error::ServerError;
use crate::events::{Bus, Event, EventKind};
use crate::signal::Signal;

/// Cloneable handle to a single-process supervisor.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

struct State {
    slot: Slot,
    config: ServerConfig,
    generation: u64,
}

pub(super) struct Inner {
    state: Mutex<State>,
    defaults: ServerConfig,
    restarting: AtomicBool,
    bus: Bus,
    /// Cancelled when the last handle is dropped; stops the subscriber listener.
    runtime_token: CancellationToken,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.runtime_token.cancel();
    }
}

/// Holds the restart guard; released on every exit path.
struct RestartGuard<'a>(&'a AtomicBool);

impl<'a> RestartGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RestartGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Supervisor {
    /// Creates a supervisor with the given defaults and no subscribers.
    pub fn new(defaults: ServerConfig) -> Self {
        SupervisorBuilder::new().defaults(defaults).build()
    }

    /// Returns a builder for a supervisor with subscribers or a custom bus size.
    pub fn builder() -> SupervisorBuilder {
        SupervisorBuilder::new()
    }

    pub(super) fn from_parts(
        defaults: ServerConfig,
        bus: Bus,
        runtime_token: CancellationToken,
    ) -> Self {
        let state = State {
            slot: Slot::Empty,
            config: defaults.clone(),
            generation: 0,
        };
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                defaults,
                restarting: AtomicBool::new(false),
                bus,
                runtime_token,
            }),
        }
    }

    /// Merges `overrides` into the configuration, spawns the process and
    /// waits for readiness.
    ///
    /// Returns the pid of the listening process.
    ///
    /// # Errors
    /// - [`ServerError::PathRequired`] if the merged configuration has no path (fatal);
    /// - [`ServerError::AlreadyStarted`] if a process is starting or live;
    /// - [`ServerError::Spawn`] if the OS refused to create the process;
    /// - [`ServerError::NotReady`] if readiness failed.
    pub async fn listen(&self, overrides: ServerOverrides) -> Result<u32, ServerError> {
        let (child, streams, criteria) = self.inner.begin_listen(&overrides)?;

        // Settling runs detached so the slot always leaves `Starting`,
        // even if the caller stops polling.
        let inner = Arc::clone(&self.inner);
        let settle = tokio::spawn(async move { inner.settle(child, streams, criteria).await });
        match settle.await {
            Ok(res) => res,
            Err(e) => Err(ServerError::NotReady {
                reason: format!("readiness task failed: {e}"),
            }),
        }
    }

    /// Signals the live process and waits until it has exited.
    ///
    /// `signal` defaults to the configured kill signal.
    ///
    /// # Errors
    /// - [`ServerError::AlreadyStopped`] if no live process occupies the slot;
    /// - [`ServerError::Signal`] if the signal could not be delivered.
    pub async fn kill(&self, signal: Option<Signal>) -> Result<(), ServerError> {
        let Some((child, sig)) = self.inner.live_child(signal) else {
            self.inner.publish(Event::new(EventKind::AlreadyStopped));
            return Err(ServerError::AlreadyStopped);
        };

        if !child.begin_stop() {
            debug!(pid = child.pid(), "stop already in progress, waiting for exit");
            child.exited().await;
            return Ok(());
        }

        if let Err(e) = child.signal(sig).await {
            child.abort_stop();
            return Err(e);
        }
        let info = child.exited().await;
        if self.inner.clear(child.generation()) {
            self.inner.publish(
                Event::new(EventKind::ServerStopped)
                    .with_pid(child.pid())
                    .with_signal(sig)
                    .with_reason(info.to_string()),
            );
        }
        Ok(())
    }

    /// Stops the live process, if any, and starts it again with the retained configuration.
    ///
    /// Returns the pid of the new process.
    ///
    /// # Errors
    /// - [`ServerError::AlreadyRestarting`] if another restart is in flight;
    /// - [`ServerError::NotStarted`] if nothing runs and no path is configured (fatal);
    /// - any error from [`Supervisor::kill`] or [`Supervisor::listen`].
    pub async fn restart(&self) -> Result<u32, ServerError> {
        let Some(_guard) = RestartGuard::acquire(&self.inner.restarting) else {
            self.inner.publish(Event::new(EventKind::AlreadyRestarting));
            return Err(ServerError::AlreadyRestarting);
        };

        if self.is_running() {
            match self.kill(None).await {
                Ok(()) | Err(ServerError::AlreadyStopped) => {}
                Err(e) => return Err(e),
            }
        } else if !self.inner.has_path() {
            return Err(ServerError::NotStarted);
        }

        let pid = self.listen(ServerOverrides::default()).await?;
        self.inner
            .publish(Event::new(EventKind::ServerRestarted).with_pid(pid));
        Ok(pid)
    }

    /// Alias of [`Supervisor::restart`] for file-change triggers.
    pub async fn changed(&self) -> Result<u32, ServerError> {
        self.restart().await
    }

    /// Stops the live process and restores the default configuration.
    ///
    /// The configuration is restored whatever `kill` reports; its result is returned.
    pub async fn reset(&self, signal: Option<Signal>) -> Result<(), ServerError> {
        let res = self.kill(signal).await;
        self.inner.state.lock().config = self.inner.defaults.clone();
        self.inner.publish(Event::new(EventKind::ConfigReset));
        res
    }

    /// Forwards a batch of change notifications, restarting the server once
    /// before the first item is yielded.
    ///
    /// Runtime restart errors are logged and forwarding goes on. A fatal
    /// error ([`ServerError::is_fatal`]) is yielded instead of the first item
    /// and ends the stream.
    pub fn pipe<S>(
        &self,
        batch: S,
    ) -> impl Stream<Item = Result<S::Item, ServerError>> + Send + use<S>
    where
        S: Stream + Send + 'static,
        S::Item: Send + 'static,
    {
        let sup = self.clone();
        async_stream::try_stream! {
            pin_mut!(batch);
            let mut first = true;
            while let Some(item) = batch.next().await {
                if first {
                    first = false;
                    match sup.restart().await {
                        Ok(_) => {}
                        Err(e) if e.is_fatal() => Err::<(), _>(e)?,
                        Err(e) => {
                            warn!(error = %e, kind = e.as_label(), "restart on change failed");
                        }
                    }
                }
                yield item;
            }
        }
    }

    /// Pid of the live process, if any.
    pub fn pid(&self) -> Option<u32> {
        self.inner.state.lock().slot.live().map(ManagedChild::pid)
    }

    /// Returns `true` if a process passed readiness and has not exited.
    pub fn is_running(&self) -> bool {
        self.inner.state.lock().slot.live().is_some()
    }

    /// Snapshot of the effective configuration.
    pub fn config(&self) -> ServerConfig {
        self.inner.state.lock().config.clone()
    }

    /// Configuration restored by [`Supervisor::reset`].
    pub fn defaults(&self) -> &ServerConfig {
        &self.inner.defaults
    }

    /// Raw receiver of lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.bus.subscribe()
    }
}

impl Inner {
    #[inline]
    fn publish(&self, ev: Event) {
        self.bus.publish(ev);
    }

    fn has_path(&self) -> bool {
        self.state.lock().config.has_path()
    }

    fn live_child(&self, signal: Option<Signal>) -> Option<(ManagedChild, Signal)> {
        let st = self.state.lock();
        let child = st.slot.live()?.clone();
        if let Some(age) = st.slot.age() {
            debug!(pid = child.pid(), uptime = ?age, "stopping managed process");
        }
        Some((child, signal.unwrap_or(st.config.kill_signal)))
    }

    /// Validates, commits the merged configuration and spawns the process.
    fn begin_listen(
        self: &Arc<Self>,
        overrides: &ServerOverrides,
    ) -> Result<(ManagedChild, ChildStreams, Criteria), ServerError> {
        let mut st = self.state.lock();
        let merged = st.config.merged(overrides);
        merged.validate()?;

        let busy = match &st.slot {
            Slot::Starting { .. } => Some(None),
            slot => slot.live().map(|c| Some(c.pid())),
        };
        if let Some(pid) = busy {
            drop(st);
            let ev = Event::new(EventKind::AlreadyStarted);
            self.publish(match pid {
                Some(pid) => ev.with_pid(pid),
                None => ev,
            });
            return Err(ServerError::AlreadyStarted);
        }

        st.config = merged;
        st.generation += 1;
        let generation = st.generation;
        let weak = Arc::downgrade(self);
        let spawned = ManagedChild::spawn(&st.config, generation, move |pid, info| {
            on_exit(&weak, generation, pid, info);
        });

        match spawned {
            Ok((child, streams)) => {
                st.slot = Slot::Starting {
                    generation,
                    since: Instant::now(),
                };
                let criteria = Criteria::from(&st.config);
                drop(st);
                self.publish(Event::new(EventKind::ServerSpawned).with_pid(child.pid()));
                Ok((child, streams, criteria))
            }
            Err(e) => {
                st.slot = Slot::Empty;
                drop(st);
                self.publish(Event::new(EventKind::ServerFailed).with_reason(e.to_string()));
                Err(e)
            }
        }
    }

    /// Waits for readiness and moves the slot out of `Starting`.
    async fn settle(
        self: Arc<Self>,
        child: ManagedChild,
        streams: ChildStreams,
        criteria: Criteria,
    ) -> Result<u32, ServerError> {
        let pid = child.pid();
        let outcome =
            readiness::detect(streams.stdout, streams.stderr, child.exit_watch(), criteria).await;

        let reason = match outcome {
            Readiness::Ready if child.is_connected() => {
                if self.promote(&child) {
                    self.publish(Event::new(EventKind::ServerListening).with_pid(pid));
                    return Ok(pid);
                }
                "slot was taken over before readiness resolved".to_string()
            }
            Readiness::Ready => "exited before becoming ready".to_string(),
            Readiness::Failed(reason) => reason,
        };

        self.clear(child.generation());
        if child.is_connected() && child.begin_stop() {
            let sig = self.state.lock().config.kill_signal;
            let doomed = child.clone();
            tokio::spawn(async move {
                if let Err(e) = doomed.signal(sig).await {
                    warn!(pid = doomed.pid(), error = %e, "failed to stop unready process");
                }
            });
        }
        self.publish(
            Event::new(EventKind::ServerFailed)
                .with_pid(pid)
                .with_reason(reason.as_str()),
        );
        Err(ServerError::NotReady { reason })
    }

    /// Moves `Starting` to `Running` for the child's generation.
    fn promote(&self, child: &ManagedChild) -> bool {
        let mut st = self.state.lock();
        if !st.slot.is_starting() || !st.slot.is_owned_by(child.generation()) {
            return false;
        }
        st.slot = Slot::Running {
            child: child.clone(),
            since: Instant::now(),
        };
        true
    }

    /// Empties the slot if it still belongs to `generation`.
    fn clear(&self, generation: u64) -> bool {
        let mut st = self.state.lock();
        if st.slot.is_owned_by(generation) {
            st.slot = Slot::Empty;
            true
        } else {
            false
        }
    }
}

/// Reaper hook: clears the slot when a live process exits on its own.
fn on_exit(inner: &Weak<Inner>, generation: u64, pid: u32, info: ExitInfo) {
    let Some(inner) = inner.upgrade() else {
        return;
    };
    let unsolicited = {
        let mut st = inner.state.lock();
        let owned = matches!(
            &st.slot,
            Slot::Running { child, .. } if child.generation() == generation && !child.is_stopping()
        );
        if owned {
            st.slot = Slot::Empty;
        }
        owned
    };
    if unsolicited {
        inner.publish(
            Event::new(EventKind::ServerExited)
                .with_pid(pid)
                .with_reason(info.to_string()),
        );
    }
}
