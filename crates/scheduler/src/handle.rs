//! Handle for submitting work to a scheduler
//!
//! The handle is cheap to clone and can be shared across tasks and plain OS
//! threads. `submit` and `remove` never block and never wait for the
//! scheduler loop; they only enqueue a command and wake the loop.

use tokio::sync::{mpsc, oneshot};

use crate::{
  action::Action,
  error::SchedulerError,
  message::{Command, SchedulerStats},
};

#[derive(Clone, Debug)]
pub struct ActionHandle {
  tx: mpsc::UnboundedSender<Command>,
}

impl ActionHandle {
  pub(crate) fn new(tx: mpsc::UnboundedSender<Command>) -> Self {
    Self { tx }
  }

  /// Submit an action.
  ///
  /// If an action with the same name is still pending it is replaced, and
  /// the name keeps its place in the queue.
  pub fn submit<A: Action>(&self, action: A) -> Result<(), SchedulerError> {
    self.submit_boxed(Box::new(action))
  }

  /// Submit an already boxed action
  pub fn submit_boxed(&self, action: Box<dyn Action>) -> Result<(), SchedulerError> {
    if action.name().is_empty() {
      return Err(SchedulerError::EmptyName);
    }
    self.send(Command::Submit(action))
  }

  /// Cancel a pending action.
  ///
  /// Only effective if the scheduler has not dispatched it yet; a running
  /// body is never interrupted. Unknown names are ignored.
  pub fn remove(&self, name: impl Into<String>) -> Result<(), SchedulerError> {
    self.send(Command::Remove(name.into()))
  }

  /// Snapshot of queue sizes and counters, taken after every command sent
  /// before this call has been applied
  pub async fn stats(&self) -> Result<SchedulerStats, SchedulerError> {
    let (reply_tx, reply_rx) = oneshot::channel();
    self.send(Command::Stats(reply_tx))?;
    reply_rx.await.map_err(|_| SchedulerError::SchedulerGone)
  }

  /// Whether the scheduler loop has stopped accepting commands
  pub fn is_closed(&self) -> bool {
    self.tx.is_closed()
  }

  fn send(&self, command: Command) -> Result<(), SchedulerError> {
    self.tx.send(command).map_err(|_| SchedulerError::SchedulerGone)
  }
}
