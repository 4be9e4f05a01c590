//! Messages carried by the scheduler's intake channel
//!
//! The intake channel is the only state shared between producers and the
//! scheduler task. Commands are applied in the order they were sent.

use serde::Serialize;
use tokio::sync::oneshot;

use crate::action::Action;

/// A request sent to the scheduler loop
pub(crate) enum Command {
  /// Register an action, or replace the stored one if its name is pending
  Submit(Box<dyn Action>),
  /// Forget a pending action. Unknown names are ignored.
  Remove(String),
  /// Report a snapshot of queue sizes and counters
  Stats(oneshot::Sender<SchedulerStats>),
}

impl std::fmt::Debug for Command {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Submit(action) => f.debug_tuple("Submit").field(&action.name()).finish(),
      Self::Remove(name) => f.debug_tuple("Remove").field(name).finish(),
      Self::Stats(_) => f.write_str("Stats"),
    }
  }
}

/// Snapshot of a scheduler's registry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
  /// Names waiting in the primary queue
  pub queued: usize,
  /// Names parked in the idle queue until they report ready
  pub deferred: usize,
  /// Submissions accepted by the loop, including replacements
  pub submitted: u64,
  /// Submissions that replaced a pending action of the same name
  pub replaced: u64,
  /// Pending actions cancelled through `remove`
  pub removed: u64,
  /// Actions handed to the execution sink
  pub dispatched: u64,
  /// Readiness checks that moved a name to the idle queue
  pub deferrals: u64,
  /// Idle names promoted back to the primary queue
  pub promotions: u64,
  /// Readiness checks that panicked and were treated as not ready
  pub ready_panics: u64,
}
