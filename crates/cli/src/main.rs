//! actionq CLI - drive a named-action scheduler with a synthetic workload

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod logging;

use commands::{RunArgs, cmd_config_init, cmd_config_show, cmd_run, load_config};
use logging::{init_cli_logging, init_logging};

#[derive(Parser)]
#[command(name = "actionq")]
#[command(about = "Deduplicating scheduler for named background actions")]
#[command(after_help = "\
QUICK START:
  actionq config init             # Write .actionq/config.toml
  actionq run                     # Run the default workload
  actionq run --names 4 --gated 2 # Heavy dedup, two gated names

Set RUST_LOG=actionq=debug to watch queue transitions.")]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

/// Subcommands for `actionq config`
#[derive(Subcommand)]
pub enum ConfigCommand {
  /// Show the effective configuration
  Show {
    /// Read this file instead of the project/user config
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
  },
  /// Create a project config file in the current directory
  Init,
}

#[derive(Subcommand)]
enum Commands {
  /// Run producers against one scheduler and print the summary
  #[command(long_about = "Run producers against one scheduler and print the summary.\n\n\
    Each producer thread submits its actions over a shared pool of names, so \
    resubmissions of a pending name overwrite it in place. Gated names stay \
    deferred until their gate opens. Ctrl-c stops early; bodies already \
    dispatched still finish.")]
  Run {
    /// Producer threads
    #[arg(short, long, default_value = "4")]
    producers: usize,
    /// Actions submitted by each producer
    #[arg(short, long, default_value = "50")]
    actions: usize,
    /// Distinct action names shared by all producers
    #[arg(short, long, default_value = "16")]
    names: usize,
    /// Names whose readiness waits on a gate
    #[arg(short, long, default_value = "2")]
    gated: usize,
    /// Simulated work per action body, in milliseconds
    #[arg(short, long, default_value = "5")]
    work_ms: u64,
    /// Delay before the gate opens, in milliseconds
    #[arg(long, default_value = "300")]
    gate_delay_ms: u64,
    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
    /// Config file to use instead of the project/user config
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
  },
  /// Manage configuration
  Config {
    #[command(subcommand)]
    command: ConfigCommand,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();

  match cli.command {
    Commands::Run {
      producers,
      actions,
      names,
      gated,
      work_ms,
      gate_delay_ms,
      json,
      config,
    } => {
      let config = load_config(config.as_deref())?;
      // Keep the guard alive so buffered file logs are flushed on exit
      let _guard = init_logging(&config.log);

      let args = RunArgs {
        producers,
        actions,
        names,
        gated,
        work_ms,
        gate_delay_ms,
        json,
      };
      cmd_run(&config, args).await
    }
    Commands::Config { command } => {
      init_cli_logging();
      match command {
        ConfigCommand::Show { config } => cmd_config_show(config.as_deref()),
        ConfigCommand::Init => cmd_config_init(),
      }
    }
  }
}
