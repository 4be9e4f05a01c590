//! Deduplicating store of pending actions
//!
//! The registry maps each live name to its current action and orders names in
//! two queues:
//!
//! - `primary`: names awaiting a readiness check, in first-registration order
//! - `idle`: names that failed a check, re-polled when the loop has spare time
//!
//! A name is in at most one queue, and in `by_name` iff it is in a queue.
//! The registry has no locks; it is owned by the scheduler task.

use std::{
  collections::{HashMap, VecDeque, hash_map::Entry},
  panic::AssertUnwindSafe,
};

use tracing::{debug, warn};

use crate::{action::Action, message::SchedulerStats};

/// Outcome of merging a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Merge {
  /// New name, appended to the primary queue
  Queued,
  /// Name was pending; the stored action was replaced in place
  Replaced,
}

/// Outcome of one dispatch attempt
pub(crate) enum Step {
  /// The front name was ready and has left the registry
  Dispatch(Box<dyn Action>),
  /// The front name was not ready and moved to the idle queue
  Deferred,
  /// The primary queue was empty
  Empty,
}

impl std::fmt::Debug for Step {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Dispatch(action) => f.debug_tuple("Dispatch").field(&action.name()).finish(),
      Self::Deferred => f.write_str("Deferred"),
      Self::Empty => f.write_str("Empty"),
    }
  }
}

#[derive(Debug, Default)]
struct Counters {
  submitted: u64,
  replaced: u64,
  removed: u64,
  dispatched: u64,
  deferrals: u64,
  promotions: u64,
  ready_panics: u64,
}

#[derive(Default)]
pub(crate) struct ActionRegistry {
  by_name: HashMap<String, Box<dyn Action>>,
  primary: VecDeque<String>,
  idle: VecDeque<String>,
  /// Dispatch attempts left before the idle queue is re-polled even though
  /// the primary queue still has work
  cycle_remaining: usize,
  counters: Counters,
}

impl ActionRegistry {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  /// Register `action`, or replace the pending action with the same name.
  ///
  /// A replacement keeps the name's current queue position.
  pub(crate) fn merge(&mut self, action: Box<dyn Action>) -> Merge {
    self.counters.submitted += 1;

    match self.by_name.entry(action.name().to_owned()) {
      Entry::Occupied(mut entry) => {
        entry.insert(action);
        self.counters.replaced += 1;
        debug!(action = %entry.key(), "Replaced pending action");
        Merge::Replaced
      }
      Entry::Vacant(entry) => {
        self.primary.push_back(entry.key().clone());
        debug!(action = %entry.key(), "Queued action");
        entry.insert(action);
        Merge::Queued
      }
    }
  }

  /// Forget a pending action. Returns false if the name was not registered.
  pub(crate) fn remove(&mut self, name: &str) -> bool {
    if self.by_name.remove(name).is_none() {
      return false;
    }

    self.primary.retain(|queued| queued != name);
    self.idle.retain(|queued| queued != name);
    self.counters.removed += 1;
    debug!(action = %name, "Removed pending action");
    true
  }

  /// Pop the front of the primary queue and check it.
  ///
  /// A ready action is removed from the registry before it is returned, so
  /// resubmitting the same name from its body registers a fresh entry.
  pub(crate) fn dispatch_next(&mut self) -> Step {
    while let Some(name) = self.primary.pop_front() {
      self.cycle_remaining = self.cycle_remaining.saturating_sub(1);

      let Some(action) = self.by_name.get(&name) else {
        continue;
      };

      if Self::check_ready(&mut self.counters, &name, action.as_ref()) {
        let Some(action) = self.by_name.remove(&name) else {
          continue;
        };
        self.counters.dispatched += 1;
        debug!(action = %name, "Dispatching action");
        return Step::Dispatch(action);
      }

      if self.idle.is_empty() {
        // First deferred name starts a drain cycle over what is queued now
        self.cycle_remaining = self.primary.len();
      }
      self.idle.push_back(name);
      self.counters.deferrals += 1;
      return Step::Deferred;
    }

    Step::Empty
  }

  /// Re-check every idle name; ready ones move to the back of the primary
  /// queue in idle order. They are dispatched by a later `dispatch_next`.
  ///
  /// Returns the number of promoted names.
  pub(crate) fn promote_ready(&mut self) -> usize {
    let idle = std::mem::take(&mut self.idle);
    let mut promoted = 0;

    for name in idle {
      let Some(action) = self.by_name.get(&name) else {
        continue;
      };

      if Self::check_ready(&mut self.counters, &name, action.as_ref()) {
        debug!(action = %name, "Promoting deferred action");
        self.primary.push_back(name);
        promoted += 1;
      } else {
        self.idle.push_back(name);
      }
    }

    self.counters.promotions += promoted as u64;
    self.cycle_remaining = self.primary.len();
    promoted
  }

  /// Whether the idle queue is due for a re-poll: either nothing else is
  /// queued, or a full pass over the primary queue has completed since the
  /// last re-poll.
  pub(crate) fn should_poll_idle(&self) -> bool {
    !self.idle.is_empty() && (self.primary.is_empty() || self.cycle_remaining == 0)
  }

  /// Number of names awaiting a readiness check
  pub(crate) fn queued_len(&self) -> usize {
    self.primary.len()
  }

  /// Number of names deferred until they report ready
  pub(crate) fn deferred_len(&self) -> usize {
    self.idle.len()
  }

  pub(crate) fn is_empty(&self) -> bool {
    self.by_name.is_empty()
  }

  #[cfg(test)]
  pub(crate) fn contains(&self, name: &str) -> bool {
    self.by_name.contains_key(name)
  }

  /// Drop every pending action. Returns how many were dropped.
  pub(crate) fn clear(&mut self) -> usize {
    let dropped = self.by_name.len();
    self.by_name.clear();
    self.primary.clear();
    self.idle.clear();
    self.cycle_remaining = 0;
    dropped
  }

  pub(crate) fn stats(&self) -> SchedulerStats {
    SchedulerStats {
      queued: self.primary.len(),
      deferred: self.idle.len(),
      submitted: self.counters.submitted,
      replaced: self.counters.replaced,
      removed: self.counters.removed,
      dispatched: self.counters.dispatched,
      deferrals: self.counters.deferrals,
      promotions: self.counters.promotions,
      ready_panics: self.counters.ready_panics,
    }
  }

  /// A panicking predicate counts as "not ready" for this check only
  fn check_ready(counters: &mut Counters, name: &str, action: &dyn Action) -> bool {
    match std::panic::catch_unwind(AssertUnwindSafe(|| action.ready())) {
      Ok(ready) => ready,
      Err(_) => {
        counters.ready_panics += 1;
        warn!(action = %name, "Readiness check panicked, treating as not ready");
        false
      }
    }
  }
}
