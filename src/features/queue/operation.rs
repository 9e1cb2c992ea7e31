//! Operation records for the offline queue.
//!
//! Defines the closed set of operation types, the status lifecycle and the
//! persisted `OfflineOperation` record.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Operation types that can be queued.
///
/// Each type selects the online executor that replays it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationType {
    /// Upload a captured photo
    CapturePhoto,
    /// Upload a captured voice recording
    CaptureVoice,
    /// Save a captured text note
    CaptureText,
    /// Run a registry-described quick action
    QuickAction,
    /// Attach a voice note
    VoiceNote,
    /// Share a property
    PropertyShare,
    /// Record a check-in
    CheckIn,
    /// Create a content item
    ContentCreate,
    /// Update a content item
    ContentUpdate,
    /// Delete a content item
    ContentDelete,
}

impl OperationType {
    /// Every operation type, in declaration order.
    pub const ALL: [Self; 10] = [
        Self::CapturePhoto,
        Self::CaptureVoice,
        Self::CaptureText,
        Self::QuickAction,
        Self::VoiceNote,
        Self::PropertyShare,
        Self::CheckIn,
        Self::ContentCreate,
        Self::ContentUpdate,
        Self::ContentDelete,
    ];

    /// Stable wire and storage name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CapturePhoto => "capture-photo",
            Self::CaptureVoice => "capture-voice",
            Self::CaptureText => "capture-text",
            Self::QuickAction => "quick-action",
            Self::VoiceNote => "voice-note",
            Self::PropertyShare => "property-share",
            Self::CheckIn => "check-in",
            Self::ContentCreate => "content-create",
            Self::ContentUpdate => "content-update",
            Self::ContentDelete => "content-delete",
        }
    }

    /// Get the display name for this operation type.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::CapturePhoto => "Capture Photo",
            Self::CaptureVoice => "Capture Voice",
            Self::CaptureText => "Capture Text",
            Self::QuickAction => "Quick Action",
            Self::VoiceNote => "Voice Note",
            Self::PropertyShare => "Property Share",
            Self::CheckIn => "Check-in",
            Self::ContentCreate => "Create Content",
            Self::ContentUpdate => "Update Content",
            Self::ContentDelete => "Delete Content",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| format!("unknown operation type: {s}"))
    }
}

/// Status of a queued operation.
///
/// Transitions only move forward, except `Failed -> Pending` when an
/// operation is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// Waiting to be synchronized
    Pending,
    /// A sync attempt is in progress
    Syncing,
    /// Applied by the backend
    Completed,
    /// Last attempt failed
    Failed,
}

impl OperationStatus {
    /// Stable storage name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Syncing => "syncing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Syncing)
                | (Self::Syncing, Self::Completed | Self::Failed)
                | (Self::Failed, Self::Pending)
        )
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "syncing" => Ok(Self::Syncing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown operation status: {other}")),
        }
    }
}

/// Unique, immutable operation identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(Uuid);

impl OperationId {
    /// Generate a fresh identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for OperationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// A queued operation with its sync metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineOperation {
    /// Unique ID, also the idempotency key sent to the backend
    pub id: OperationId,
    /// Operation type
    #[serde(rename = "type")]
    pub op_type: OperationType,
    /// Opaque payload, passed through untouched
    pub payload: Value,
    /// Current status
    pub status: OperationStatus,
    /// Number of failed sync attempts
    pub retry_count: u32,
    /// When the operation was queued; defines replay order
    pub created_at: DateTime<Utc>,
    /// When the operation last completed
    pub synced_at: Option<DateTime<Utc>>,
    /// Last error message, only while failed
    pub error: Option<String>,
}

impl OfflineOperation {
    /// Create a new pending operation.
    #[must_use]
    pub fn new(op_type: OperationType, payload: Value, created_at: DateTime<Utc>) -> Self {
        Self {
            id: OperationId::new(),
            op_type,
            payload,
            status: OperationStatus::Pending,
            retry_count: 0,
            created_at,
            synced_at: None,
            error: None,
        }
    }

    /// Whether the retry bound has been exhausted.
    #[must_use]
    pub const fn is_dead_lettered(&self, retry_bound: u32) -> bool {
        matches!(self.status, OperationStatus::Failed) && self.retry_count > retry_bound
    }

    /// Whether the next sync pass should attempt this operation.
    #[must_use]
    pub const fn is_retryable(&self, retry_bound: u32) -> bool {
        match self.status {
            OperationStatus::Pending | OperationStatus::Syncing => true,
            OperationStatus::Failed => self.retry_count <= retry_bound,
            OperationStatus::Completed => false,
        }
    }

    /// Position of this operation in replay order.
    #[must_use]
    pub fn cursor(&self) -> PageCursor {
        PageCursor {
            created_at: self.created_at,
            id: self.id,
        }
    }
}

/// Resume point for paging through the queue in replay order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PageCursor {
    /// Enqueue time of the last item seen
    pub created_at: DateTime<Utc>,
    /// Id of the last item seen, breaking timestamp ties
    pub id: OperationId,
}

/// Format a timestamp so that lexicographic order matches time order.
#[must_use]
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a timestamp written by [`format_timestamp`].
///
/// # Errors
///
/// Returns the parse error message.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("invalid timestamp '{s}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operation_type_names() {
        assert_eq!(OperationType::CaptureText.as_str(), "capture-text");
        assert_eq!(OperationType::CheckIn.display_name(), "Check-in");
        for op_type in OperationType::ALL {
            assert_eq!(op_type.as_str().parse::<OperationType>().unwrap(), op_type);
        }
        assert_eq!(
            "QUICK_ACTION".parse::<OperationType>().unwrap(),
            OperationType::QuickAction
        );
        assert!("teleport".parse::<OperationType>().is_err());
    }

    #[test]
    fn test_operation_type_serde_matches_storage_name() {
        let json = serde_json::to_string(&OperationType::PropertyShare).unwrap();
        assert_eq!(json, "\"property-share\"");
    }

    #[test]
    fn test_status_transitions() {
        use OperationStatus::{Completed, Failed, Pending, Syncing};

        assert!(Pending.can_transition_to(Syncing));
        assert!(Syncing.can_transition_to(Completed));
        assert!(Syncing.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Pending));

        assert!(!Completed.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Syncing));
        assert!(!Syncing.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Failed.can_transition_to(Syncing));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("Failed".parse::<OperationStatus>().unwrap(), OperationStatus::Failed);
        assert!("in_progress".parse::<OperationStatus>().is_err());
    }

    #[test]
    fn test_retryable_and_dead_lettered() {
        let mut op = OfflineOperation::new(OperationType::CaptureText, json!({}), Utc::now());
        assert!(op.is_retryable(3));

        op.status = OperationStatus::Failed;
        op.retry_count = 3;
        assert!(op.is_retryable(3));
        assert!(!op.is_dead_lettered(3));

        op.retry_count = 4;
        assert!(!op.is_retryable(3));
        assert!(op.is_dead_lettered(3));

        op.status = OperationStatus::Completed;
        assert!(!op.is_retryable(3));
        assert!(!op.is_dead_lettered(3));
    }

    #[test]
    fn test_timestamp_format_sorts_chronologically() {
        let earlier = parse_timestamp("2024-05-01T09:59:59.999999Z").unwrap();
        let later = parse_timestamp("2024-05-01T10:00:00.000001Z").unwrap();

        assert!(format_timestamp(&earlier) < format_timestamp(&later));
        assert_eq!(parse_timestamp(&format_timestamp(&later)).unwrap(), later);
    }

    #[test]
    fn test_operation_id_roundtrip() {
        let id = OperationId::new();
        assert_eq!(id.to_string().parse::<OperationId>().unwrap(), id);
        assert!("not-a-uuid".parse::<OperationId>().is_err());
    }
}
