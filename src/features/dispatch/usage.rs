//! Quick action usage tracking and ranking.
//!
//! Usage is a bounded log of `(action, time)` records. Rankings are
//! derived from the log on demand:
//! - recent: distinct actions, most recently used first
//! - prioritized: use count descending, then recency descending
//!
//! Pins are kept separately and never expire.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::StorageError;
use crate::storage::KeyValueStore;

const USAGE_KEY: &str = "quick_actions.usage";
const PINNED_KEY: &str = "quick_actions.pinned";

/// One recorded use of an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Action id
    pub action_id: String,
    /// When it was used
    pub used_at: DateTime<Utc>,
}

/// Usage statistics for one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionUsage {
    /// Action id
    pub action_id: String,
    /// Uses within the retained log
    pub count: usize,
    /// Most recent use
    pub last_used: DateTime<Utc>,
}

/// Records action usage and pins in a key-value store.
pub struct UsageTracker {
    store: Arc<dyn KeyValueStore>,
    max_records: usize,
    // Serializes read-modify-write cycles
    write: Mutex<()>,
}

impl std::fmt::Debug for UsageTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageTracker")
            .field("max_records", &self.max_records)
            .finish_non_exhaustive()
    }
}

impl UsageTracker {
    /// Create a tracker keeping the `max_records` most recent uses.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, max_records: usize) -> Self {
        Self {
            store,
            max_records,
            write: Mutex::new(()),
        }
    }

    /// Record a use of `action_id` now.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn record(&self, action_id: &str) -> Result<(), StorageError> {
        self.record_at(action_id, Utc::now())
    }

    /// Record a use of `action_id` at `used_at`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn record_at(&self, action_id: &str, used_at: DateTime<Utc>) -> Result<(), StorageError> {
        let _write = self.write.lock().unwrap_or_else(PoisonError::into_inner);

        let mut records = self.records()?;
        records.push(UsageRecord {
            action_id: action_id.to_string(),
            used_at,
        });
        if records.len() > self.max_records {
            let excess = records.len() - self.max_records;
            records.drain(..excess);
        }

        self.save(USAGE_KEY, &records)
    }

    /// Retained usage log, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or holds malformed data.
    pub fn records(&self) -> Result<Vec<UsageRecord>, StorageError> {
        self.load(USAGE_KEY)
    }

    /// Pin an action. Pinning twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn pin(&self, action_id: &str) -> Result<(), StorageError> {
        let _write = self.write.lock().unwrap_or_else(PoisonError::into_inner);

        let mut pinned = self.pinned()?;
        if !pinned.iter().any(|id| id == action_id) {
            pinned.push(action_id.to_string());
            self.save(PINNED_KEY, &pinned)?;
        }
        Ok(())
    }

    /// Unpin an action. Returns whether it was pinned.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn unpin(&self, action_id: &str) -> Result<bool, StorageError> {
        let _write = self.write.lock().unwrap_or_else(PoisonError::into_inner);

        let mut pinned = self.pinned()?;
        let before = pinned.len();
        pinned.retain(|id| id != action_id);
        if pinned.len() == before {
            return Ok(false);
        }
        self.save(PINNED_KEY, &pinned)?;
        Ok(true)
    }

    /// Pinned actions, in pin order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or holds malformed data.
    pub fn pinned(&self) -> Result<Vec<String>, StorageError> {
        self.load(PINNED_KEY)
    }

    /// Up to `limit` distinct actions, most recently used first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or holds malformed data.
    pub fn recent(&self, limit: usize) -> Result<Vec<String>, StorageError> {
        let records = self.records()?;
        let mut seen = Vec::new();

        for record in records.iter().rev() {
            if seen.len() == limit {
                break;
            }
            if !seen.contains(&record.action_id) {
                seen.push(record.action_id.clone());
            }
        }

        Ok(seen)
    }

    /// Up to `limit` actions ranked by use count, ties broken by recency.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or holds malformed data.
    pub fn prioritized(&self, limit: usize) -> Result<Vec<ActionUsage>, StorageError> {
        let records = self.records()?;

        // (count, position of last use, last use)
        let mut stats: HashMap<&str, (usize, usize, DateTime<Utc>)> = HashMap::new();
        for (position, record) in records.iter().enumerate() {
            let entry = stats
                .entry(record.action_id.as_str())
                .or_insert((0, position, record.used_at));
            entry.0 += 1;
            entry.1 = position;
            entry.2 = record.used_at;
        }

        let mut ranked: Vec<_> = stats.into_iter().collect();
        ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(b.1 .1.cmp(&a.1 .1)));

        Ok(ranked
            .into_iter()
            .take(limit)
            .map(|(action_id, (count, _, last_used))| ActionUsage {
                action_id: action_id.to_string(),
                count,
                last_used,
            })
            .collect())
    }

    fn load<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T, StorageError> {
        match self.store.get(key)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(T::default()),
        }
    }

    fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        self.store.set(key, &serde_json::to_string(value)?)
    }
}
