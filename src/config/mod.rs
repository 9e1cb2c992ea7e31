//! Configuration management for resync.
//!
//! This module handles loading configuration from `~/.resync/`.

mod paths;
mod settings;

pub use paths::{Paths, HOME_ENV};
pub use settings::{
    ActionsConfig, BackendConfig, Config, LoggingConfig, MonitorConfig, QueueConfig,
};
