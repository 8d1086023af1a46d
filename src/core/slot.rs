use std::time::Instant;

use super::child::ManagedChild;

/// Occupancy of the single managed-process slot.
pub(super) enum Slot {
    /// No process, ready to accept `listen`.
    Empty,

    /// Process spawned, readiness still pending.
    Starting {
        /// Spawn generation that owns the slot.
        generation: u64,
        /// When the spawn happened.
        since: Instant,
    },

    /// Process passed readiness.
    Running {
        child: ManagedChild,
        /// When readiness resolved.
        since: Instant,
    },
}

impl Slot {
    /// Child that passed readiness and has not been reaped yet.
    pub fn live(&self) -> Option<&ManagedChild> {
        match self {
            Slot::Running { child, .. } if child.is_connected() => Some(child),
            _ => None,
        }
    }

    pub fn is_starting(&self) -> bool {
        matches!(self, Slot::Starting { .. })
    }

    /// Returns `true` if the slot is held by the given spawn generation.
    pub fn is_owned_by(&self, generation: u64) -> bool {
        match self {
            Slot::Starting { generation: g, .. } => *g == generation,
            Slot::Running { child, .. } => child.generation() == generation,
            Slot::Empty => false,
        }
    }

    /// Time spent in the current state, if any.
    pub fn age(&self) -> Option<std::time::Duration> {
        match self {
            Slot::Empty => None,
            Slot::Starting { since, .. } | Slot::Running { since, .. } => Some(since.elapsed()),
        }
    }
}
