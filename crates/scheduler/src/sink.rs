//! ExecutionSink - strictly serial executor for dispatched actions
//!
//! The sink runs one action body at a time, in dispatch order, on its own
//! task. The scheduler loop never waits for a body to finish; it only pushes
//! into the sink's channel.
//!
//! # Lifecycle
//!
//! The sink runs until its channel is closed (the scheduler loop dropped its
//! sender). It then finishes every body already accepted and exits. It does
//! not observe cancellation: shutdown drains, it never aborts a body.

use std::{
  panic::AssertUnwindSafe,
  sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
  },
  time::Instant,
};

use futures::FutureExt;
use serde::Serialize;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info, warn};

use crate::action::Action;

/// Completed/failed/panicked counts for a sink
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SinkStats {
  pub completed: u64,
  pub failed: u64,
  pub panicked: u64,
}

impl SinkStats {
  /// Bodies that have finished, whatever the outcome
  pub fn finished(&self) -> u64 {
    self.completed + self.failed + self.panicked
  }
}

#[derive(Debug, Default)]
pub(crate) struct SinkCounters {
  completed: AtomicU64,
  failed: AtomicU64,
  panicked: AtomicU64,
}

impl SinkCounters {
  pub(crate) fn snapshot(&self) -> SinkStats {
    SinkStats {
      completed: self.completed.load(Ordering::Relaxed),
      failed: self.failed.load(Ordering::Relaxed),
      panicked: self.panicked.load(Ordering::Relaxed),
    }
  }
}

pub(crate) struct ExecutionSink {
  rx: mpsc::UnboundedReceiver<Box<dyn Action>>,
  counters: Arc<SinkCounters>,
}

impl ExecutionSink {
  /// Spawn the sink task.
  ///
  /// Returns the sender dispatched actions are pushed into, the task handle
  /// that completes once the sink has drained, and the shared counters.
  pub(crate) fn spawn() -> (mpsc::UnboundedSender<Box<dyn Action>>, JoinHandle<()>, Arc<SinkCounters>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let counters = Arc::new(SinkCounters::default());

    let sink = Self {
      rx,
      counters: Arc::clone(&counters),
    };
    let task = tokio::spawn(sink.run());

    (tx, task, counters)
  }

  async fn run(mut self) {
    debug!("ExecutionSink started");

    while let Some(action) = self.rx.recv().await {
      self.execute(action).await;
    }

    info!(stats = ?self.counters.snapshot(), "ExecutionSink drained");
  }

  /// Run one body to completion. Errors and panics are reported and counted;
  /// they never stop the sink.
  async fn execute(&self, mut action: Box<dyn Action>) {
    let name = action.name().to_owned();
    let started = Instant::now();
    debug!(action = %name, "Running action");

    let outcome = AssertUnwindSafe(action.run()).catch_unwind().await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match outcome {
      Ok(Ok(())) => {
        self.counters.completed.fetch_add(1, Ordering::Relaxed);
        debug!(action = %name, elapsed_ms, "Action completed");
      }
      Ok(Err(e)) => {
        self.counters.failed.fetch_add(1, Ordering::Relaxed);
        warn!(action = %name, elapsed_ms, error = %e, "Action failed");
      }
      Err(panic) => {
        self.counters.panicked.fetch_add(1, Ordering::Relaxed);
        error!(action = %name, elapsed_ms, panic = panic_message(&*panic), "Action panicked");
      }
    }
  }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
  if let Some(message) = panic.downcast_ref::<&'static str>() {
    message
  } else if let Some(message) = panic.downcast_ref::<String>() {
    message.as_str()
  } else {
    "non-string panic payload"
  }
}
