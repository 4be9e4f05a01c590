//! Scheduler - the loop that owns the registry and dispatches actions
//!
//! Each iteration:
//!
//! 1. Drain the intake channel into the registry (submit/remove/stats)
//! 2. Check the front of the primary queue: dispatch it if ready, defer it otherwise
//! 3. Re-poll the idle queue when the primary queue is empty, or when a full
//!    pass over it has completed since the last re-poll
//! 4. If nothing is queued, sleep until a command arrives or the wait elapses
//!
//! The wait is long (`idle_wait`) when nothing is deferred and short
//! (`poll_interval`) while deferred actions need re-polling. A command always
//! wakes the loop; the timeout only bounds how stale readiness can get.

use std::{sync::Arc, time::Duration};

use actionq_core::SchedulerSettings;
use tokio::{
  sync::mpsc::{self, error::TryRecvError},
  task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
  action::Action,
  handle::ActionHandle,
  message::Command,
  registry::{ActionRegistry, Step},
  sink::{ExecutionSink, SinkCounters, SinkStats},
};

/// Timing configuration for a scheduler loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
  /// Wait while nothing is queued or deferred
  pub idle_wait: Duration,
  /// Wait while deferred actions are waiting to become ready
  pub poll_interval: Duration,
}

impl Default for SchedulerConfig {
  fn default() -> Self {
    Self::from(&SchedulerSettings::default())
  }
}

impl From<&SchedulerSettings> for SchedulerConfig {
  fn from(settings: &SchedulerSettings) -> Self {
    Self {
      idle_wait: settings.idle_wait(),
      poll_interval: settings.poll_interval(),
    }
  }
}

pub struct Scheduler {
  config: SchedulerConfig,
  registry: ActionRegistry,
  intake: mpsc::UnboundedReceiver<Command>,
  /// Set once every handle has been dropped
  intake_closed: bool,
  sink: mpsc::UnboundedSender<Box<dyn Action>>,
  cancel: CancellationToken,
}

impl Scheduler {
  /// Spawn a scheduler loop and its execution sink.
  ///
  /// Returns the handle producers submit through, and the worker used to
  /// stop the loop and wait for the sink to drain. Must be called from
  /// within a tokio runtime.
  pub fn spawn(config: SchedulerConfig, cancel: CancellationToken) -> (ActionHandle, SchedulerWorker) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (sink_tx, sink_task, sink_counters) = ExecutionSink::spawn();

    let scheduler = Self {
      config,
      registry: ActionRegistry::new(),
      intake: rx,
      intake_closed: false,
      sink: sink_tx,
      cancel: cancel.clone(),
    };
    let loop_task = tokio::spawn(scheduler.run());

    let worker = SchedulerWorker {
      cancel,
      loop_task,
      sink_task,
      sink_counters,
    };
    (ActionHandle::new(tx), worker)
  }

  /// Main loop. Runs until cancelled, or until every handle is dropped and
  /// no pending action is left.
  async fn run(mut self) {
    info!(
      idle_wait_ms = self.config.idle_wait.as_millis() as u64,
      poll_interval_ms = self.config.poll_interval.as_millis() as u64,
      "Scheduler started"
    );

    loop {
      if self.cancel.is_cancelled() {
        info!("Scheduler shutting down (cancelled)");
        break;
      }

      self.drain_intake();
      self.dispatch_step();

      if self.registry.should_poll_idle() {
        let promoted = self.registry.promote_ready();
        if promoted > 0 {
          debug!(promoted, "Promoted deferred actions");
        }
      }

      if self.registry.queued_len() > 0 {
        // More work queued; let the sink and producers make progress
        tokio::task::yield_now().await;
        continue;
      }

      if self.intake_closed && self.registry.is_empty() {
        info!("Scheduler shutting down (all handles dropped)");
        break;
      }

      self.suspend().await;
    }

    let dropped = self.registry.clear();
    if dropped > 0 {
      info!(dropped, "Dropped pending actions at shutdown");
    }
    info!(stats = ?self.registry.stats(), "Scheduler stopped");
  }

  /// Apply every command received so far, in order
  fn drain_intake(&mut self) {
    if self.intake_closed {
      return;
    }

    loop {
      match self.intake.try_recv() {
        Ok(command) => self.apply(command),
        Err(TryRecvError::Empty) => break,
        Err(TryRecvError::Disconnected) => {
          self.intake_closed = true;
          break;
        }
      }
    }
  }

  fn apply(&mut self, command: Command) {
    match command {
      Command::Submit(action) => {
        self.registry.merge(action);
      }
      Command::Remove(name) => {
        self.registry.remove(&name);
      }
      Command::Stats(reply) => {
        let _ = reply.send(self.registry.stats());
      }
    }
  }

  fn dispatch_step(&mut self) {
    let Step::Dispatch(action) = self.registry.dispatch_next() else {
      return;
    };

    if let Err(rejected) = self.sink.send(action) {
      // Only possible if the sink task died, which it does not do on its own
      warn!(action = %rejected.0.name(), "Execution sink is gone, dropping action");
    }
  }

  /// Sleep until a command arrives, the wait elapses, or the loop is cancelled
  async fn suspend(&mut self) {
    let wait = if self.registry.deferred_len() == 0 {
      self.config.idle_wait
    } else {
      self.config.poll_interval
    };

    if self.intake_closed {
      tokio::select! {
          biased;
          _ = self.cancel.cancelled() => {}
          _ = tokio::time::sleep(wait) => {}
      }
      return;
    }

    tokio::select! {
        biased;

        _ = self.cancel.cancelled() => {}

        command = self.intake.recv() => {
            match command {
                Some(command) => self.apply(command),
                None => self.intake_closed = true,
            }
        }

        _ = tokio::time::sleep(wait) => {}
    }
  }
}

/// Stop control for a spawned scheduler
pub struct SchedulerWorker {
  cancel: CancellationToken,
  loop_task: JoinHandle<()>,
  sink_task: JoinHandle<()>,
  sink_counters: Arc<SinkCounters>,
}

impl SchedulerWorker {
  /// Current execution counts
  pub fn sink_stats(&self) -> SinkStats {
    self.sink_counters.snapshot()
  }

  /// Token that stops this scheduler's loop when cancelled
  pub fn cancel_token(&self) -> CancellationToken {
    self.cancel.clone()
  }

  /// Stop the loop, then wait for the sink to finish every dispatched body.
  ///
  /// Actions still queued or deferred are dropped without running.
  pub async fn shutdown(self) -> SinkStats {
    self.cancel.cancel();
    self.join().await
  }

  /// Wait for the loop to stop on its own (cancellation or all handles
  /// dropped), then for the sink to drain
  pub async fn join(self) -> SinkStats {
    if let Err(e) = self.loop_task.await {
      warn!(error = %e, "Scheduler loop task failed");
    }
    if let Err(e) = self.sink_task.await {
      warn!(error = %e, "Execution sink task failed");
    }
    self.sink_counters.snapshot()
  }
}
