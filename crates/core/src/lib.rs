//! Shared configuration for the actionq scheduler and its front ends.

pub mod config;

pub use config::{Config, ConfigError, LogConfig, SchedulerSettings};
