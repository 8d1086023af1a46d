//! # devvisor
//!
//! **Devvisor** supervises a single long-running development server on behalf
//! of a build or watch pipeline.
//!
//! It starts the process, decides when it has become ready, restarts it on
//! demand (e.g. after source changes) and shuts it down cleanly. Overlapping
//! requests are rejected instead of corrupting supervisor state.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   watch pipeline / CLI driver
//!     │ listen · kill · restart · reset · pipe
//!     ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Supervisor (cloneable handle)                                    │
//! │  - slot: Empty | Starting | Running(ManagedChild)                 │
//! │  - config: defaults merged with the latest overrides              │
//! │  - restart guard (single flight)                                  │
//! └──────┬──────────────────────────────┬─────────────────────────────┘
//!        │ spawn                        │ publish(Event)
//!        ▼                              ▼
//! ┌────────────────┐            ┌──────────────────┐
//! │  reaper task   │            │ Bus (broadcast)  │
//! │ owns the Child │            └────────┬─────────┘
//! │ signals / wait │                     ▼
//! └──────┬─────────┘            subscriber listener
//!        │ stdout / stderr / exit        │
//!        ▼                               ▼
//! ┌────────────────┐              SubscriberSet
//! │ readiness      │           ┌─────────┼─────────┐
//! │ timer · lines  │           ▼         ▼         ▼
//! │ · exit         │       LogWriter   custom    custom
//! └────────────────┘
//! ```
//!
//! ### Readiness
//! ```text
//! spawn ──► ServerSpawned
//!   ├─ success line on stdout ─────────► Ready  ──► ServerListening
//!   ├─ `delay` elapsed in silence ─────► Ready  ──► ServerListening
//!   ├─ error line on stderr ───────────► Failed ──► ServerFailed (process signalled)
//!   └─ process exits first ────────────► Failed ──► ServerFailed
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                    |
//! |-------------------|--------------------------------------------------------------|---------------------------------------|
//! | **Supervision**   | Start, stop, restart and reset one managed process.          | [`Supervisor`]                        |
//! | **Configuration** | Defaults plus per-call overrides, merged field by field.      | [`ServerConfig`], [`ServerOverrides`] |
//! | **Subscriber API**| Hook into lifecycle events (logging, livereload, custom).     | [`Subscribe`], [`Event`]              |
//! | **Errors**        | Typed errors split into fatal, already-in-state and runtime.  | [`ServerError`]                       |
//!
//! ## Optional features
//! - `logging` (default): exports the built-in [`LogWriter`] subscriber.
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use devvisor::{ServerOverrides, Subscribe, Supervisor};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(devvisor::LogWriter::new())];
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn Subscribe>> = Vec::new();
//!
//!     let sup = Supervisor::builder().with_subscribers(subs).build();
//!     sup.listen(ServerOverrides::new().path("target/debug/api").args(["--port", "1337"]))
//!         .await?;
//!
//!     // ... source changed
//!     sup.restart().await?;
//!
//!     sup.reset(None).await?;
//!     Ok(())
//! }
//! ```

mod config;
mod core;
mod error;
mod events;
mod signal;
mod subscribers;

// ---- Public re-exports ----

pub use config::{DEV_ENV_KEY, ExecOptions, MessagePattern, ServerConfig, ServerOverrides};
pub use crate::core::{DEFAULT_BUS_CAPACITY, ExitInfo, Supervisor, SupervisorBuilder};
pub use error::ServerError;
pub use events::{Bus, Event, EventKind};
pub use signal::Signal;
pub use subscribers::{Subscribe, SubscriberSet};

// Built-in logger subscriber.
// Enabled by default; disable with `--no-default-features`.
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
