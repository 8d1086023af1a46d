use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use super::supervisor::Supervisor;
use crate::config::ServerConfig;
use crate::events::Bus;
use crate::subscribers::{Subscribe, SubscriberSet};

/// Default ring-buffer size of the event bus.
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// Builder for a [`Supervisor`] with subscribers or custom defaults.
pub struct SupervisorBuilder {
    defaults: ServerConfig,
    bus_capacity: usize,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl Default for SupervisorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SupervisorBuilder {
    /// Creates a builder with compiled-in defaults and no subscribers.
    pub fn new() -> Self {
        Self {
            defaults: ServerConfig::default(),
            bus_capacity: DEFAULT_BUS_CAPACITY,
            subscribers: Vec::new(),
        }
    }

    /// Sets the configuration every `listen` merges into and `reset` restores.
    pub fn defaults(mut self, defaults: ServerConfig) -> Self {
        self.defaults = defaults;
        self
    }

    /// Sets the event bus capacity (min 1).
    pub fn bus_capacity(mut self, capacity: usize) -> Self {
        self.bus_capacity = capacity;
        self
    }

    /// Sets event subscribers.
    ///
    /// Subscribers receive lifecycle events through dedicated workers with
    /// bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the supervisor.
    ///
    /// With subscribers, this spawns the fan-out workers and must be called
    /// from within a Tokio runtime.
    pub fn build(self) -> Supervisor {
        let bus = Bus::new(self.bus_capacity);
        let runtime_token = CancellationToken::new();

        if !self.subscribers.is_empty() {
            let set = SubscriberSet::new(self.subscribers, bus.clone());
            subscriber_listener(&bus, set, runtime_token.clone());
        }
        Supervisor::from_parts(self.defaults, bus, runtime_token)
    }
}

/// Forwards bus events to the subscriber set until the supervisor is dropped.
fn subscriber_listener(bus: &Bus, set: SubscriberSet, token: CancellationToken) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                ev = rx.recv() => match ev {
                    Ok(ev) => set.emit(ev),
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "subscriber listener lagged behind the bus");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        set.shutdown().await;
    });
}
