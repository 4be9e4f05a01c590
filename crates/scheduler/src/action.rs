//! The unit of deferred work
//!
//! An [`Action`] is identified by its name. The scheduler keeps at most one
//! pending action per name, asks it whether it is [`ready`](Action::ready),
//! and runs it exactly once when it is.

use std::sync::{
  Arc,
  atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;

/// A named unit of work with a readiness predicate.
///
/// `ready` is called synchronously on the scheduler task, possibly many
/// times, and must be cheap and non-blocking. Each check is authoritative
/// only at the instant it is taken. `run` is called at most once, on the
/// execution sink, after the action has left the registry. A recurring task
/// resubmits itself from its body.
#[async_trait]
pub trait Action: Send + 'static {
  /// Dedup key. Must be non-empty.
  fn name(&self) -> &str;

  /// Whether the action may be dispatched now
  fn ready(&self) -> bool {
    true
  }

  /// Execute the action body
  async fn run(&mut self) -> anyhow::Result<()>;
}

type Body = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;
type Predicate = Box<dyn Fn() -> bool + Send>;

/// Closure-backed [`Action`].
///
/// The body is synchronous and runs on tokio's blocking pool, so long
/// exports or file writes do not stall the runtime. Executions stay serial
/// because the sink awaits each body before starting the next.
pub struct FnAction {
  name: String,
  body: Option<Body>,
  ready: Option<Predicate>,
}

impl FnAction {
  pub fn new<F>(name: impl Into<String>, body: F) -> Self
  where
    F: FnOnce() -> anyhow::Result<()> + Send + 'static,
  {
    Self {
      name: name.into(),
      body: Some(Box::new(body)),
      ready: None,
    }
  }

  /// Only dispatch once `predicate` returns true
  pub fn ready_when<P>(mut self, predicate: P) -> Self
  where
    P: Fn() -> bool + Send + 'static,
  {
    self.ready = Some(Box::new(predicate));
    self
  }

  /// Only dispatch while `gate` is open
  pub fn gated(self, gate: &Gate) -> Self {
    let gate = gate.clone();
    self.ready_when(move || gate.is_open())
  }
}

impl std::fmt::Debug for FnAction {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("FnAction")
      .field("name", &self.name)
      .field("spent", &self.body.is_none())
      .field("gated", &self.ready.is_some())
      .finish()
  }
}

#[async_trait]
impl Action for FnAction {
  fn name(&self) -> &str {
    &self.name
  }

  fn ready(&self) -> bool {
    self.ready.as_ref().is_none_or(|predicate| predicate())
  }

  async fn run(&mut self) -> anyhow::Result<()> {
    let Some(body) = self.body.take() else {
      anyhow::bail!("action {} already ran", self.name);
    };

    match tokio::task::spawn_blocking(body).await {
      Ok(result) => result,
      // Surface the panic to the sink so it is reported as one
      Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
      Err(e) => Err(anyhow::anyhow!("action {} was cancelled: {}", self.name, e)),
    }
  }
}

/// Shared readiness flag.
///
/// Cheap to clone; every clone observes the same state. Typical use is an
/// action that must wait for some external resource to finish loading.
#[derive(Clone, Debug, Default)]
pub struct Gate {
  open: Arc<AtomicBool>,
}

impl Gate {
  /// Create a closed gate
  pub fn new() -> Self {
    Self::default()
  }

  pub fn open(&self) {
    self.open.store(true, Ordering::Release);
  }

  pub fn close(&self) {
    self.open.store(false, Ordering::Release);
  }

  pub fn is_open(&self) -> bool {
    self.open.load(Ordering::Acquire)
  }
}
