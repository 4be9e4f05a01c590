//! Readiness-gated, deduplicating action scheduler
//!
//! Callers submit named [`Action`]s through an [`ActionHandle`]. At most one
//! action per name is pending at a time: resubmitting a name that is still
//! queued replaces the stored action but keeps its place in line. A single
//! scheduler task drains submissions, checks readiness, defers actions that
//! are not ready yet, and hands ready ones to a strictly serial execution sink.
//!
//! # Architecture
//!
//! ```text
//! producers ──submit/remove──▶ intake (mpsc) ──▶ Scheduler loop ──dispatch──▶ ExecutionSink
//!                                                  │  primary queue               (one body at a time)
//!                                                  └─ idle queue (not ready)
//! ```
//!
//! - Only the intake channel is shared between threads; the registry and its
//!   queues are owned by the scheduler task.
//! - The loop sleeps when it has nothing to dispatch: 500 ms by default, or
//!   50 ms while deferred actions must be re-polled. Submissions wake it early.
//! - [`Lifecycle`] stops schedulers and waits for their sinks to drain.
//!
//! # Shutdown
//!
//! Stopping a scheduler drops every action still queued or deferred without
//! running it. Actions already handed to the sink always run to completion.

mod action;
mod error;
mod handle;
mod lifecycle;
mod message;
mod registry;
mod scheduler;
mod sink;


pub use action::{Action, FnAction, Gate};
pub use error::SchedulerError;
pub use handle::ActionHandle;
pub use lifecycle::Lifecycle;
pub use message::SchedulerStats;
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerWorker};
pub use sink::SinkStats;
