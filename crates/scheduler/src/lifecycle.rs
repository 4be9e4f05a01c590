//! Lifecycle host for scheduler workers
//!
//! The host owns a master `CancellationToken`. Every managed worker runs
//! under a child token, so cancelling the master stops every loop. Shutdown
//! then waits for each worker's sink to drain, in registration order.
//!
//! ```text
//! Lifecycle (master token)
//!   ├── "exports"  SchedulerWorker (child token) ── ExecutionSink
//!   └── "refresh"  SchedulerWorker (child token) ── ExecutionSink
//! ```

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
  handle::ActionHandle,
  scheduler::{Scheduler, SchedulerConfig, SchedulerWorker},
  sink::SinkStats,
};

pub struct Lifecycle {
  cancel: CancellationToken,
  workers: Vec<(String, SchedulerWorker)>,
}

impl Default for Lifecycle {
  fn default() -> Self {
    Self::new()
  }
}

impl Lifecycle {
  pub fn new() -> Self {
    Self {
      cancel: CancellationToken::new(),
      workers: Vec::new(),
    }
  }

  /// Spawn a scheduler under this host and return its handle
  pub fn spawn_scheduler(&mut self, name: impl Into<String>, config: SchedulerConfig) -> ActionHandle {
    let (handle, worker) = Scheduler::spawn(config, self.cancel.child_token());
    self.manage(name, worker);
    handle
  }

  /// Take over stop control of an already spawned worker
  pub fn manage(&mut self, name: impl Into<String>, worker: SchedulerWorker) {
    let name = name.into();
    info!(worker = %name, "Managing scheduler worker");
    self.workers.push((name, worker));
  }

  /// Token that triggers shutdown of every managed worker when cancelled
  pub fn cancel_token(&self) -> CancellationToken {
    self.cancel.clone()
  }

  /// Execution counts per managed worker
  pub fn stats(&self) -> Vec<(String, SinkStats)> {
    self
      .workers
      .iter()
      .map(|(name, worker)| (name.clone(), worker.sink_stats()))
      .collect()
  }

  /// Stop every loop, then wait for every sink to drain.
  ///
  /// Returns the final execution counts per worker.
  pub async fn shutdown(self) -> Vec<(String, SinkStats)> {
    info!(workers = self.workers.len(), "Stopping scheduler workers");
    self.cancel.cancel();

    let mut report = Vec::with_capacity(self.workers.len());
    for (name, worker) in self.workers {
      let stats = worker.shutdown().await;
      info!(worker = %name, ?stats, "Scheduler worker drained");
      report.push((name, stats));
    }

    info!("Lifecycle shutdown complete");
    report
  }

  /// Wait for ctrl-c or for the master token to be cancelled, then shut down
  pub async fn run_until_signal(self) -> Vec<(String, SinkStats)> {
    let cancel = self.cancel.clone();

    tokio::select! {
        _ = cancel.cancelled() => {
            info!("Shutdown requested");
        }
        result = signal::ctrl_c() => {
            match result {
                Ok(()) => info!("Received ctrl-c, shutting down..."),
                Err(e) => {
                    warn!("Failed to listen for ctrl-c: {}", e);
                    cancel.cancelled().await;
                }
            }
        }
    }

    self.shutdown().await
  }
}
