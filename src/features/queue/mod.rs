//! Durable offline operation queue.
//!
//! Operations that cannot reach the backend are persisted here and
//! replayed in enqueue order once connectivity returns.
//!
//! Features:
//! - Pluggable durable store (`SQLite` or in-memory)
//! - Per-type online executors
//! - Bounded retries with dead-lettering
//! - Coalesced, non-reentrant sync passes

pub mod engine;
pub mod executor;
pub mod operation;
pub mod sqlite;
pub mod store;

pub use engine::{format_sync_report, OperationQueue, SyncOutcome, SyncReport};
pub use executor::{ExecutorCall, ExecutorRegistry, FnExecutor, HttpExecutor, OnlineExecutor};
pub use operation::{OfflineOperation, OperationId, OperationStatus, OperationType, PageCursor};
pub use sqlite::SqliteQueueStore;
pub use store::{MemoryQueueStore, QueueStats, QueueStore};
