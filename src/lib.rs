//! resync - offline-first operation queue
//!
//! Records user mutations durably while the backend is unreachable and
//! replays them in order once connectivity returns. The crate provides the
//! durable queue store, the operation queue, a connectivity monitor and a
//! dispatch layer that runs actions online or defers them to the queue.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod features;
pub mod output;
pub mod storage;

pub use cli::args::{Cli, Commands, OutputFormat};
pub use error::ResyncError;
