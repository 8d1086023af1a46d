//! # LogWriter: human-readable lifecycle log
//!
//! Renders incoming [`Event`]s as `tracing` records under the `devvisor` target.
//!
//! ## Example output
//! ```text
//! INFO development server listening. (PID: 4242)
//! INFO development server was stopped. (PID: 4242) signal=SIGTERM status=signal 15
//! INFO development server was restarted. (PID: 4251)
//! WARN development server error: Error: cannot bind
//! INFO development server already started.
//! ```

use async_trait::async_trait;
use tracing::{info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn pid(e: &Event) -> String {
    e.pid.map_or_else(|| "?".to_string(), |p| p.to_string())
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let reason = e.reason.as_deref().unwrap_or("unknown");
        match e.kind {
            EventKind::ServerSpawned => {
                info!(target: "devvisor", "development server spawned. (PID: {})", pid(e));
            }
            EventKind::ServerListening => {
                info!(target: "devvisor", "development server listening. (PID: {})", pid(e));
            }
            EventKind::ServerFailed => {
                warn!(target: "devvisor", "development server error: {reason}");
            }
            EventKind::ServerStopped => {
                info!(
                    target: "devvisor",
                    "development server was stopped. (PID: {}) signal={} status={reason}",
                    pid(e),
                    e.signal.unwrap_or("-"),
                );
            }
            EventKind::ServerExited => {
                info!(
                    target: "devvisor",
                    "development server exited. (PID: {}) status={reason}",
                    pid(e)
                );
            }
            EventKind::ServerRestarted => {
                info!(target: "devvisor", "development server was restarted. (PID: {})", pid(e));
            }
            EventKind::ConfigReset => {
                info!(target: "devvisor", "development server options reset.");
            }
            EventKind::AlreadyStarted => {
                info!(target: "devvisor", "development server already started.");
            }
            EventKind::AlreadyStopped => {
                info!(target: "devvisor", "development server already stopped.");
            }
            EventKind::AlreadyRestarting => {
                info!(target: "devvisor", "development server already received restart request.");
            }
            EventKind::SubscriberOverflow => {
                warn!(target: "devvisor", "[subscriber-overflow] {reason}");
            }
            EventKind::SubscriberPanicked => {
                warn!(target: "devvisor", "[subscriber-panicked] {reason}");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
