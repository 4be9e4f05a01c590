//! Dispatch behaviour tests: dedup, deferral, removal, resubmission,
//! serial execution and starvation freedom.

#[cfg(test)]
mod tests {
  use std::{
    sync::{
      Arc,
      atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
  };

  use async_trait::async_trait;
  use pretty_assertions::assert_eq;

  use crate::{
    Action, FnAction, Gate, SchedulerConfig, SchedulerError,
    __tests__::helpers::{SchedulerTestContext, wait_for_stats, wait_until},
  };

  const TIMEOUT: Duration = Duration::from_secs(5);

  /// Far below any configured wait in the wake-up tests
  const WAKE_BUDGET: Duration = Duration::from_millis(500);

  fn waits(idle_wait_ms: u64, poll_interval_ms: u64) -> SchedulerConfig {
    SchedulerConfig {
      idle_wait: Duration::from_millis(idle_wait_ms),
      poll_interval: Duration::from_millis(poll_interval_ms),
    }
  }

  // ==========================================================================
  // Dedup
  // ==========================================================================

  /// Test: a name resubmitted before dispatch runs once, with the latest
  /// payload, at the position of its first submission.
  #[tokio::test]
  async fn test_resubmit_before_dispatch_overwrites_in_place() {
    let ctx = SchedulerTestContext::new();
    let gate = Gate::new();

    ctx.handle.submit(ctx.action("x", 1).gated(&gate)).unwrap();
    ctx.handle.submit(ctx.action("a", 0).gated(&gate)).unwrap();
    ctx.handle.submit(ctx.action("b", 0).gated(&gate)).unwrap();
    ctx.handle.submit(ctx.action("x", 2).gated(&gate)).unwrap();

    assert!(
      wait_for_stats(&ctx.handle, TIMEOUT, |s| s.submitted == 4 && s.deferred == 3).await,
      "all three names should be deferred behind the gate"
    );
    gate.open();

    assert!(wait_until(TIMEOUT, || ctx.recorder.len() == 3).await);
    assert_eq!(ctx.recorder.names(), vec!["x", "a", "b"]);

    let x_runs = ctx.recorder.runs_of("x");
    assert_eq!(x_runs.len(), 1, "x should run exactly once");
    assert_eq!(x_runs[0].payload, 2, "the latest submission should win");

    let stats = ctx.stats().await;
    assert_eq!(stats.replaced, 1);
    assert_eq!(stats.dispatched, 3);
  }

  // ==========================================================================
  // Deferral
  // ==========================================================================

  /// Test: a not-ready action parks in the idle queue and runs after it
  /// turns ready.
  #[tokio::test]
  async fn test_not_ready_action_waits_for_gate() {
    let ctx = SchedulerTestContext::new();
    let gate = Gate::new();

    ctx.handle.submit(ctx.action("other", 0)).unwrap();
    ctx.handle.submit(ctx.action("y", 0).gated(&gate)).unwrap();

    assert!(wait_for_stats(&ctx.handle, TIMEOUT, |s| s.deferred == 1 && s.dispatched == 1).await);
    assert!(wait_until(TIMEOUT, || ctx.recorder.len() == 1).await);

    // Several poll intervals pass without the gate opening
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(ctx.recorder.names(), vec!["other"]);

    gate.open();
    assert!(wait_until(TIMEOUT, || ctx.recorder.len() == 2).await);
    assert_eq!(ctx.recorder.names(), vec!["other", "y"]);

    let stats = ctx.stats().await;
    assert_eq!(stats.deferred, 0);
    assert!(stats.promotions >= 1);
  }

  /// Test: a predicate that flips back to false after promotion is
  /// re-checked at dispatch time and deferred again.
  #[tokio::test]
  async fn test_non_monotonic_readiness_is_rechecked() {
    struct Flicker {
      checks: Arc<AtomicUsize>,
      ran: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Action for Flicker {
      fn name(&self) -> &str {
        "flicker"
      }

      // not ready, ready, not ready, then ready for good
      fn ready(&self) -> bool {
        let check = self.checks.fetch_add(1, Ordering::SeqCst);
        check == 1 || check >= 3
      }

      async fn run(&mut self) -> anyhow::Result<()> {
        self.ran.store(true, Ordering::SeqCst);
        Ok(())
      }
    }

    let ctx = SchedulerTestContext::new();
    let checks = Arc::new(AtomicUsize::new(0));
    let ran = Arc::new(AtomicBool::new(false));
    ctx
      .handle
      .submit(Flicker {
        checks: Arc::clone(&checks),
        ran: Arc::clone(&ran),
      })
      .unwrap();

    assert!(wait_until(TIMEOUT, || ran.load(Ordering::SeqCst)).await);
    // Promoted on the second check, deferred again on the third
    assert!(checks.load(Ordering::SeqCst) >= 5);
    assert_eq!(ctx.stats().await.deferrals, 2);
  }

  // ==========================================================================
  // Removal
  // ==========================================================================

  /// Test: removing a pending action before it is ready cancels it.
  #[tokio::test]
  async fn test_remove_before_dispatch_cancels() {
    let ctx = SchedulerTestContext::new();
    let gate = Gate::new();

    ctx.handle.submit(ctx.action("z", 0).gated(&gate)).unwrap();
    ctx.handle.remove("z").unwrap();
    gate.open();

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(ctx.recorder.runs_of("z").is_empty(), "removed action must never run");

    let stats = ctx.stats().await;
    assert_eq!(stats.removed, 1);
    assert_eq!(stats.dispatched, 0);
    assert_eq!(stats.queued + stats.deferred, 0);
  }

  /// Test: removing from the idle queue works too.
  #[tokio::test]
  async fn test_remove_deferred_action() {
    let ctx = SchedulerTestContext::new();
    let gate = Gate::new();

    ctx.handle.submit(ctx.action("parked", 0).gated(&gate)).unwrap();
    assert!(wait_for_stats(&ctx.handle, TIMEOUT, |s| s.deferred == 1).await);

    ctx.handle.remove("parked").unwrap();
    assert!(wait_for_stats(&ctx.handle, TIMEOUT, |s| s.deferred == 0 && s.removed == 1).await);

    gate.open();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(ctx.recorder.len(), 0);
  }

  /// Test: removing an unknown name is a no-op, not an error.
  #[tokio::test]
  async fn test_remove_unknown_name_is_noop() {
    let ctx = SchedulerTestContext::new();

    ctx.handle.remove("ghost").unwrap();
    ctx.handle.submit(ctx.action("real", 0)).unwrap();

    assert!(wait_until(TIMEOUT, || ctx.recorder.len() == 1).await);
    assert_eq!(ctx.stats().await.removed, 0);
  }

  /// Test: empty names are rejected at the handle.
  #[tokio::test]
  async fn test_empty_name_is_rejected() {
    let ctx = SchedulerTestContext::new();

    let result = ctx.handle.submit(ctx.action("", 0));
    assert_eq!(result, Err(SchedulerError::EmptyName));
    assert_eq!(ctx.stats().await.submitted, 0);
  }

  // ==========================================================================
  // Resubmission
  // ==========================================================================

  /// Test: an action that resubmits its own name from its body runs again
  /// as an independent dispatch.
  #[tokio::test]
  async fn test_self_resubmission_runs_again() {
    let ctx = SchedulerTestContext::new();

    ctx
      .handle
      .submit(ctx.action("refresh", 0).resubmit(&ctx.handle, 2))
      .unwrap();

    assert!(wait_until(TIMEOUT, || ctx.recorder.len() == 3).await);
    let payloads: Vec<u32> = ctx.recorder.runs().iter().map(|run| run.payload).collect();
    assert_eq!(payloads, vec![0, 1, 2]);

    // The chain ends; no extra runs
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(ctx.recorder.len(), 3);
    assert_eq!(ctx.stats().await.replaced, 0);
  }

  // ==========================================================================
  // Serial execution
  // ==========================================================================

  /// Test: bodies submitted concurrently from several threads never overlap.
  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn test_no_overlapping_execution_under_concurrent_submission() {
    let ctx = SchedulerTestContext::new();
    let producers = 4;
    let per_producer = 20;

    let threads: Vec<_> = (0..producers)
      .map(|p| {
        let handle = ctx.handle.clone();
        let recorder = ctx.recorder.clone();
        std::thread::spawn(move || {
          for i in 0..per_producer {
            let action = crate::__tests__::helpers::RecordingAction::new(&format!("p{p}-{i}"), i, &recorder)
              .work(Duration::from_millis(1));
            handle.submit(action).expect("submit from producer thread");
          }
        })
      })
      .collect();
    for thread in threads {
      thread.join().expect("producer thread");
    }

    let total = (producers * per_producer) as usize;
    assert!(wait_until(TIMEOUT, || ctx.recorder.len() == total).await);

    let mut runs = ctx.recorder.runs();
    runs.sort_by_key(|run| run.started);
    for pair in runs.windows(2) {
      assert!(
        pair[1].started >= pair[0].finished,
        "{} started before {} finished",
        pair[1].name,
        pair[0].name
      );
    }

    // Each producer's submissions keep their relative order
    for p in 0..producers {
      let prefix = format!("p{p}-");
      let order: Vec<u32> = ctx
        .recorder
        .runs()
        .iter()
        .filter(|run| run.name.starts_with(&prefix))
        .map(|run| run.payload)
        .collect();
      assert_eq!(order, (0..per_producer).collect::<Vec<_>>());
    }
  }

  /// Test: closure actions run on the blocking pool, one at a time.
  #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
  async fn test_fn_actions_run_serially() {
    let ctx = SchedulerTestContext::new();
    let active = Arc::new(AtomicUsize::new(0));
    let max_active = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(AtomicUsize::new(0));

    for i in 0..5 {
      let active = Arc::clone(&active);
      let max_active = Arc::clone(&max_active);
      let done = Arc::clone(&done);
      ctx
        .handle
        .submit(FnAction::new(format!("export-{i}"), move || {
          let now = active.fetch_add(1, Ordering::SeqCst) + 1;
          max_active.fetch_max(now, Ordering::SeqCst);
          std::thread::sleep(Duration::from_millis(5));
          active.fetch_sub(1, Ordering::SeqCst);
          done.fetch_add(1, Ordering::SeqCst);
          Ok(())
        }))
        .unwrap();
    }

    assert!(wait_until(TIMEOUT, || done.load(Ordering::SeqCst) == 5).await);
    assert_eq!(max_active.load(Ordering::SeqCst), 1);
  }

  // ==========================================================================
  // Wake-up
  // ==========================================================================

  /// Test: a submission wakes a loop sleeping the long idle wait.
  #[tokio::test]
  async fn test_submit_wakes_idle_wait() {
    let ctx = SchedulerTestContext::with_config(waits(30_000, 30_000));

    // Let the loop settle into its first wait
    tokio::time::sleep(Duration::from_millis(50)).await;

    let submitted_at = Instant::now();
    ctx.handle.submit(ctx.action("wake", 0)).unwrap();

    assert!(wait_until(WAKE_BUDGET, || ctx.recorder.len() == 1).await);
    assert!(submitted_at.elapsed() < WAKE_BUDGET);
  }

  /// Test: a submission wakes a loop sleeping the poll wait while another
  /// name is deferred.
  #[tokio::test]
  async fn test_submit_wakes_poll_wait() {
    let ctx = SchedulerTestContext::with_config(waits(30_000, 30_000));
    let gate = Gate::new();

    ctx.handle.submit(ctx.action("parked", 0).gated(&gate)).unwrap();
    assert!(wait_for_stats(&ctx.handle, TIMEOUT, |s| s.deferred == 1).await);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let submitted_at = Instant::now();
    ctx.handle.submit(ctx.action("wake", 0)).unwrap();

    assert!(wait_until(WAKE_BUDGET, || ctx.recorder.len() == 1).await);
    assert!(submitted_at.elapsed() < WAKE_BUDGET);
    assert_eq!(ctx.recorder.names(), vec!["wake"]);
  }

  /// Test: with a deferred name parked, the loop sleeps the short poll wait,
  /// so a readiness change is noticed without any new submission.
  #[tokio::test]
  async fn test_deferred_name_uses_poll_wait() {
    let ctx = SchedulerTestContext::with_config(waits(30_000, 10));
    let gate = Gate::new();

    ctx.handle.submit(ctx.action("parked", 0).gated(&gate)).unwrap();
    assert!(wait_for_stats(&ctx.handle, TIMEOUT, |s| s.deferred == 1).await);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let opened_at = Instant::now();
    gate.open();

    assert!(wait_until(WAKE_BUDGET, || ctx.recorder.len() == 1).await);
    assert!(opened_at.elapsed() < WAKE_BUDGET);
  }

  // ==========================================================================
  // Starvation freedom
  // ==========================================================================

  /// Test: a deferred action that turns ready is dispatched even while the
  /// primary queue is continuously fed with ready work.
  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn test_deferred_action_not_starved_by_ready_stream() {
    let ctx = SchedulerTestContext::new();
    let gate = Gate::new();
    let stop = Arc::new(AtomicBool::new(false));

    ctx.handle.submit(ctx.action("late", 0).gated(&gate)).unwrap();
    assert!(wait_for_stats(&ctx.handle, TIMEOUT, |s| s.deferred == 1).await);

    let feeder = {
      let handle = ctx.handle.clone();
      let recorder = ctx.recorder.clone();
      let stop = Arc::clone(&stop);
      std::thread::spawn(move || {
        let mut i = 0u32;
        while !stop.load(Ordering::SeqCst) {
          let action = crate::__tests__::helpers::RecordingAction::new(&format!("feed-{i}"), i, &recorder);
          if handle.submit(action).is_err() {
            break;
          }
          i += 1;
          if i % 32 == 0 {
            std::thread::sleep(Duration::from_millis(1));
          }
        }
      })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    gate.open();

    let promoted = wait_until(TIMEOUT, || !ctx.recorder.runs_of("late").is_empty()).await;
    stop.store(true, Ordering::SeqCst);
    feeder.join().expect("feeder thread");

    assert!(promoted, "late should run while the feeder is still submitting");
  }
}
