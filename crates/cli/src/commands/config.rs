//! `actionq config` commands

use std::path::Path;

use actionq_core::Config;
use anyhow::{Context, Result, bail};

/// Resolve the effective configuration for the current directory
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
  let cwd = std::env::current_dir().context("Cannot determine current directory")?;
  let config = Config::resolve(explicit, &cwd)?;
  Ok(config)
}

/// Show current effective configuration
pub fn cmd_config_show(explicit: Option<&Path>) -> Result<()> {
  let cwd = std::env::current_dir().context("Cannot determine current directory")?;
  let config = load_config(explicit)?;

  let project_config = Config::project_config_path(&cwd);
  let user_config = Config::user_config_path();

  println!("Effective configuration for: {}", cwd.display());
  println!();

  if let Some(path) = explicit {
    println!("Using config: {}", path.display());
  } else if project_config.exists() {
    println!("Using project config: {}", project_config.display());
  } else if let Some(user_path) = user_config.as_ref().filter(|p| p.exists()) {
    println!("Using user config: {}", user_path.display());
  } else {
    println!("Using default configuration (no config file found)");
  }
  println!();

  let toml_str = toml::to_string_pretty(&config).context("Failed to render configuration")?;
  println!("{}", toml_str);

  Ok(())
}

/// Initialize project configuration file
pub fn cmd_config_init() -> Result<()> {
  let cwd = std::env::current_dir().context("Cannot determine current directory")?;
  let config_path = Config::project_config_path(&cwd);

  if config_path.exists() {
    bail!(
      "Config file already exists: {} (delete it first to regenerate)",
      config_path.display()
    );
  }

  if let Some(parent) = config_path.parent() {
    std::fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
  }

  std::fs::write(&config_path, Config::generate_template())
    .with_context(|| format!("Failed to write {}", config_path.display()))?;

  println!("Created project config: {}", config_path.display());
  println!("Edit the file to customize settings.");

  Ok(())
}
