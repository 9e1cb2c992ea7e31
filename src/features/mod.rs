//! Feature implementations for resync.
//!
//! - Durable operation queue
//! - Connectivity monitoring and sync-on-restore
//! - Execute-or-queue dispatch and quick actions

pub mod connectivity;
pub mod dispatch;
pub mod queue;
