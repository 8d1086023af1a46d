//! # Lifecycle events emitted by the supervisor.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Lifecycle events**: the managed process moving between spawned, listening and stopped
//! - **No-op events**: a request rejected because the supervisor was already in that state
//! - **Subscriber events**: delivery problems inside the subscriber fan-out
//!
//! The [`Event`] struct carries the process id, a reason and the signal involved.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use devvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::ServerFailed)
//!     .with_pid(4242)
//!     .with_reason("Error: cannot bind");
//!
//! assert_eq!(ev.kind, EventKind::ServerFailed);
//! assert_eq!(ev.pid, Some(4242));
//! assert_eq!(ev.reason.as_deref(), Some("Error: cannot bind"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::signal::Signal;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of supervisor events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Process lifecycle ===
    /// Process created; readiness is pending.
    ///
    /// Sets: `pid`
    ServerSpawned,

    /// Readiness resolved successfully; the process now occupies the slot.
    ///
    /// Sets: `pid`
    ServerListening,

    /// Spawn or readiness failed; the slot stays empty.
    ///
    /// Sets: `pid` (absent when the spawn itself failed), `reason`
    ServerFailed,

    /// Process stopped by `kill`.
    ///
    /// Sets: `pid`, `signal`, `reason` (exit description)
    ServerStopped,

    /// Process exited on its own; the slot was cleared.
    ///
    /// Sets: `pid`, `reason` (exit description)
    ServerExited,

    /// A restart completed and the new process is listening.
    ///
    /// Sets: `pid` (the new process)
    ServerRestarted,

    /// Configuration returned to defaults.
    ConfigReset,

    // === Rejected requests ===
    /// `listen` found a live process.
    ///
    /// Sets: `pid` (when known)
    AlreadyStarted,

    /// `kill` found no process.
    AlreadyStopped,

    /// `restart` found another restart in flight.
    AlreadyRestarting,

    // === Subscriber events ===
    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `reason` (subscriber name and cause)
    SubscriberOverflow,

    /// Subscriber panicked during event processing.
    ///
    /// Sets: `reason` (panic message)
    SubscriberPanicked,
}

/// Supervisor event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Process id of the managed process, if applicable.
    pub pid: Option<u32>,
    /// Human-readable reason (errors, exit status, subscriber names).
    pub reason: Option<Arc<str>>,
    /// Name of the signal involved, if any.
    pub signal: Option<&'static str>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            pid: None,
            reason: None,
            signal: None,
        }
    }

    /// Attaches a process id.
    #[inline]
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches the signal name.
    #[inline]
    pub fn with_signal(mut self, signal: Signal) -> Self {
        self.signal = Some(signal.as_str());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_reason(format!("subscriber={subscriber} info={info}"))
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_is_monotonic() {
        let a = Event::new(EventKind::ServerSpawned);
        let b = Event::new(EventKind::ServerListening);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn signal_is_stored_by_name() {
        let ev = Event::new(EventKind::ServerStopped).with_signal(Signal::SIGTERM);
        assert_eq!(ev.signal, Some("SIGTERM"));
    }
}
