//! Storage layer for resync.
//!
//! This module provides SQLite-based persistence for:
//! - The offline operation queue (see `features::queue::SqliteQueueStore`)
//! - Key-value records used by quick action ranking

mod database;
mod kv;
mod migrations;

pub use database::Database;
pub use kv::{KeyValueStore, MemoryKv, SqliteKv};
