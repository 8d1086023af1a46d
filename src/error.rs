//! Error type returned by every supervisor operation.
//!
//! [`ServerError`] covers three families of failure:
//!
//! - **configuration errors** ([`ServerError::PathRequired`], [`ServerError::NotStarted`]):
//!   caller misuse, returned before the operation suspends; see [`ServerError::is_fatal`];
//! - **already-in-state errors** ([`ServerError::AlreadyStarted`], [`ServerError::AlreadyStopped`],
//!   [`ServerError::AlreadyRestarting`]): the operation was a no-op and prior state is untouched;
//!   see [`ServerError::is_already`];
//! - **runtime failures** ([`ServerError::Spawn`], [`ServerError::NotReady`], [`ServerError::Signal`]).
//!
//! Helper methods (`as_label`, `as_message`) mirror the shape used by the event log.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// # Errors produced by the supervisor.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ServerError {
    /// `listen` was called without a `path` and none was stored by a previous call.
    #[error("application `path` required")]
    PathRequired,

    /// `restart` was called with no running process and no configured `path`.
    #[error("development server not started")]
    NotStarted,

    /// A live process already occupies the slot (or is still becoming ready).
    #[error("development server already started")]
    AlreadyStarted,

    /// `kill` found no process in the slot.
    #[error("development server already stopped")]
    AlreadyStopped,

    /// Another restart is still in flight.
    #[error("development server already received restart request")]
    AlreadyRestarting,

    /// The operating system refused to create the process.
    #[error("failed to spawn {path:?}: {source}")]
    Spawn {
        /// Program that was being spawned.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The process was spawned but reported a failure before becoming ready.
    #[error("development server error: {reason}")]
    NotReady {
        /// Matched diagnostic line or exit description.
        reason: String,
    },

    /// Delivering a signal to the process failed.
    #[error("failed to signal process {pid}: {source}")]
    Signal {
        /// Target process id.
        pid: u32,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl ServerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use devvisor::ServerError;
    ///
    /// assert_eq!(ServerError::AlreadyStopped.as_label(), "already_stopped");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ServerError::PathRequired => "path_required",
            ServerError::NotStarted => "not_started",
            ServerError::AlreadyStarted => "already_started",
            ServerError::AlreadyStopped => "already_stopped",
            ServerError::AlreadyRestarting => "already_restarting",
            ServerError::Spawn { .. } => "spawn_failed",
            ServerError::NotReady { .. } => "not_ready",
            ServerError::Signal { .. } => "signal_failed",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            ServerError::Spawn { path, source } => format!("spawn {}: {source}", path.display()),
            ServerError::NotReady { reason } => format!("not ready: {reason}"),
            ServerError::Signal { pid, source } => format!("signal pid={pid}: {source}"),
            other => other.to_string(),
        }
    }

    /// Indicates caller misuse rather than a runtime condition.
    ///
    /// Fatal errors are returned before the operation touches any process,
    /// so they cannot be confused with a failed start.
    ///
    /// # Example
    /// ```
    /// use devvisor::ServerError;
    ///
    /// assert!(ServerError::PathRequired.is_fatal());
    /// assert!(!ServerError::AlreadyStarted.is_fatal());
    /// ```
    pub fn is_fatal(&self) -> bool {
        matches!(self, ServerError::PathRequired | ServerError::NotStarted)
    }

    /// Indicates the operation was a no-op because the supervisor was already in the requested state.
    pub fn is_already(&self) -> bool {
        matches!(
            self,
            ServerError::AlreadyStarted
                | ServerError::AlreadyStopped
                | ServerError::AlreadyRestarting
        )
    }
}
