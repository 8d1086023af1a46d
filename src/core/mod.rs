//! Runtime core: process lifecycle and supervision.
//!
//! The only public API from this module is [`Supervisor`] (built with
//! [`SupervisorBuilder`]) plus the [`ExitInfo`] it reports.
//!
//! Internal modules:
//! - [`child`]: spawns a process and hands it to a reaper task;
//! - [`readiness`]: decides once whether a fresh process is ready;
//! - [`slot`]: occupancy of the single process slot;
//! - [`supervisor`]: listen/kill/restart/reset state machine;
//! - [`builder`]: wires the bus and subscribers.

mod builder;
mod child;
mod readiness;
mod slot;
mod supervisor;

pub use builder::{DEFAULT_BUS_CAPACITY, SupervisorBuilder};
pub use child::ExitInfo;
pub use supervisor::Supervisor;
