//! # alerts-common
//!
//! Lifecycle and timing primitives shared by the alerts-sdk crates.
//!
//! - [`Disposable`]: idempotent teardown handle, composable into ordered groups
//! - [`Event`]: ordered, snapshot-on-fire listener registry with per-listener
//!   panic isolation
//! - [`Scheduler`]: cancellable delayed execution and exponential backoff
//!
//! All types are `Send + Sync`. Timers run on the ambient tokio runtime.

pub mod disposable;
pub mod error;
pub mod event;
pub mod logging;
pub mod scheduler;

pub use disposable::Disposable;
pub use error::{BoxError, Result, SchedulerError};
pub use event::{Event, FireReport};
pub use scheduler::{BackoffPolicy, Scheduled, Scheduler, TimerToken, DEFAULT_BACKOFF_BASE};
