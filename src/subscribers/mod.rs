//! # Event subscribers.
//!
//! The supervisor reports lifecycle events to an external logger through this module.
//!
//! ```text
//! Supervisor ── publish(Event) ──► Bus ──► subscriber listener ──► SubscriberSet
//!                                                                   │
//!                                                    ┌──────────────┼──────────┐
//!                                                    ▼              ▼          ▼
//!                                                LogWriter      Livereload   Custom
//! ```
//!
//! Implement [`Subscribe`] to plug in a custom handler; enable the `logging`
//! feature (default) for the built-in [`LogWriter`].

#[cfg(feature = "logging")]
mod log;
mod subscriber;
mod subscriber_set;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use subscriber::Subscribe;
pub use subscriber_set::SubscriberSet;
