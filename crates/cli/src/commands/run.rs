//! `actionq run`: synthetic workload against a single scheduler

use std::time::{Duration, Instant};

use actionq::{ActionHandle, FnAction, Gate, Lifecycle, SchedulerConfig, SchedulerStats, SinkStats};
use actionq_core::Config;
use anyhow::{Context, Result, bail};
use rand::Rng;
use tracing::{debug, info, warn};

/// How often the runner checks whether the workload has settled
const SETTLE_POLL: Duration = Duration::from_millis(20);

pub struct RunArgs {
  pub producers: usize,
  pub actions: usize,
  pub names: usize,
  pub gated: usize,
  pub work_ms: u64,
  pub gate_delay_ms: u64,
  pub json: bool,
}

impl RunArgs {
  fn validate(&self) -> Result<()> {
    if self.names == 0 {
      bail!("--names must be at least 1");
    }
    if self.gated > self.names {
      bail!("--gated ({}) cannot exceed --names ({})", self.gated, self.names);
    }
    Ok(())
  }
}

fn action_name(index: usize) -> String {
  format!("action-{index:03}")
}

/// Submit `count` actions over randomly picked names from one producer thread
fn produce(producer: usize, args: &RunArgs, handle: &ActionHandle, gate: &Gate) -> Result<usize> {
  let mut rng = rand::rng();
  let work = Duration::from_millis(args.work_ms);

  for seq in 0..args.actions {
    let index = rng.random_range(0..args.names);
    let name = action_name(index);
    let label = name.clone();

    let mut action = FnAction::new(name, move || {
      std::thread::sleep(work);
      debug!(action = %label, producer, seq, "Body finished");
      Ok(())
    });
    // The first `gated` names wait on the shared gate
    if index < args.gated {
      action = action.gated(gate);
    }

    handle
      .submit(action)
      .with_context(|| format!("Producer {producer} could not submit"))?;
  }

  Ok(args.actions)
}

/// Settled once nothing is pending and every dispatched body has finished
fn settled(stats: &SchedulerStats, sink: SinkStats) -> bool {
  stats.queued == 0 && stats.deferred == 0 && sink.finished() == stats.dispatched
}

pub async fn cmd_run(config: &Config, args: RunArgs) -> Result<()> {
  args.validate()?;
  let args = std::sync::Arc::new(args);

  let mut lifecycle = Lifecycle::new();
  let handle = lifecycle.spawn_scheduler("workload", SchedulerConfig::from(&config.scheduler));
  let gate = Gate::new();
  let started = Instant::now();

  info!(
    producers = args.producers,
    actions = args.actions,
    names = args.names,
    gated = args.gated,
    "Starting workload"
  );

  let opener = {
    let gate = gate.clone();
    let delay = Duration::from_millis(args.gate_delay_ms);
    tokio::spawn(async move {
      tokio::time::sleep(delay).await;
      gate.open();
      info!("Gate opened");
    })
  };

  let producers: Vec<_> = (0..args.producers)
    .map(|producer| {
      let args = std::sync::Arc::clone(&args);
      let handle = handle.clone();
      let gate = gate.clone();
      tokio::task::spawn_blocking(move || produce(producer, &args, &handle, &gate))
    })
    .collect();

  let workload = async {
    let mut submitted = 0;
    for producer in producers {
      submitted += producer.await.context("Producer thread panicked")??;
    }
    info!(submitted, "Producers finished");

    loop {
      let stats = handle.stats().await?;
      let sink = lifecycle
        .stats()
        .first()
        .map(|(_, stats)| *stats)
        .unwrap_or_default();
      if settled(&stats, sink) {
        return anyhow::Ok((submitted, stats));
      }
      tokio::time::sleep(SETTLE_POLL).await;
    }
  };

  let outcome = tokio::select! {
      result = workload => Some(result?),
      result = tokio::signal::ctrl_c() => {
          if let Err(e) = result {
              warn!("Failed to listen for ctrl-c: {}", e);
          }
          None
      }
  };

  // Snapshot before shutdown; the handle stops answering afterwards
  let interrupted = outcome.is_none();
  let (submitted, scheduler_stats) = match outcome {
    Some(done) => done,
    None => (0, handle.stats().await.unwrap_or_default()),
  };

  opener.abort();
  let report = lifecycle.shutdown().await;
  let sink_stats = report.first().map(|(_, stats)| *stats).unwrap_or_default();
  let elapsed = started.elapsed();

  if args.json {
    let summary = serde_json::json!({
      "interrupted": interrupted,
      "elapsed_ms": elapsed.as_millis() as u64,
      "submitted": submitted,
      "scheduler": scheduler_stats,
      "sink": sink_stats,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    return Ok(());
  }

  if interrupted {
    println!("Interrupted; pending actions were dropped");
    println!();
  }
  println!("Workload summary ({:.2}s)", elapsed.as_secs_f64());
  println!("  Submitted:   {}", scheduler_stats.submitted);
  println!("  Overwritten: {}", scheduler_stats.replaced);
  println!("  Dispatched:  {}", scheduler_stats.dispatched);
  println!(
    "  Deferrals:   {} (promoted {})",
    scheduler_stats.deferrals, scheduler_stats.promotions
  );
  if scheduler_stats.ready_panics > 0 {
    println!("  Ready panics: {}", scheduler_stats.ready_panics);
  }
  println!(
    "  Executed:    {} ok, {} failed, {} panicked",
    sink_stats.completed, sink_stats.failed, sink_stats.panicked
  );

  Ok(())
}
