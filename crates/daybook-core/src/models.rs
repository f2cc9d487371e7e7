//! Data models for Daybook
//!
//! Defines the planner record, the partial used for merge updates, and the
//! option/result types shared by the batch operations.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default freshness bound for cached reads: 24 hours
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Lifecycle status of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    /// Not yet done
    #[default]
    Pending,
    /// Completed
    Done,
    /// Kept for history, hidden from active views
    Archived,
}

impl RecordStatus {
    /// Wire representation of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Pending => "pending",
            RecordStatus::Done => "done",
            RecordStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A planner record
///
/// The `id` is the storage key and never changes once the record is created.
/// Soft deletion is expressed through `removed`; such records stay in the
/// store but are excluded from listings unless explicitly requested.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Unique identifier, immutable once created
    pub id: String,
    /// The record text
    pub text: String,
    /// Lifecycle status
    pub status: RecordStatus,
    /// Optional emoji shown next to the text
    pub emoji: Option<String>,
    /// Optional instant the record is scheduled for
    pub date: Option<DateTime<Utc>>,
    /// Optional wall-clock time as "HH:mm"
    pub time: Option<String>,
    /// Soft-deletion marker
    pub removed: bool,
}

impl Record {
    /// Create a new record with a generated id
    pub fn new(text: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), text)
    }

    /// Create a record with a caller-supplied id
    pub fn with_id(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            status: RecordStatus::Pending,
            emoji: None,
            date: None,
            time: None,
            removed: false,
        }
    }

    /// Set the status
    pub fn with_status(mut self, status: RecordStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the scheduled instant
    pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    /// Set the wall-clock time
    pub fn with_time(mut self, time: impl Into<String>) -> Self {
        self.time = Some(time.into());
        self
    }

    /// Set the emoji
    pub fn with_emoji(mut self, emoji: impl Into<String>) -> Self {
        self.emoji = Some(emoji.into());
        self
    }
}

/// Partial record for merge updates
///
/// `Some` fields overwrite the fetched record, `None` fields leave it
/// untouched. There is deliberately no `id` field: ids are immutable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPatch {
    pub text: Option<String>,
    pub status: Option<RecordStatus>,
    pub emoji: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub time: Option<String>,
    pub removed: Option<bool>,
}

impl RecordPatch {
    /// Patch that soft-deletes a record
    pub fn removal() -> Self {
        Self {
            removed: Some(true),
            ..Self::default()
        }
    }

    /// Patch that sets the status
    pub fn status(status: RecordStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Full-overwrite patch carrying every field of `record` except the id
    pub fn from_record(record: &Record) -> Self {
        Self {
            text: Some(record.text.clone()),
            status: Some(record.status),
            emoji: record.emoji.clone(),
            date: record.date,
            time: record.time.clone(),
            removed: Some(record.removed),
        }
    }

    /// Shallow-merge this patch onto `record`
    pub fn apply(&self, record: &mut Record) {
        if let Some(text) = &self.text {
            record.text = text.clone();
        }
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(emoji) = &self.emoji {
            record.emoji = Some(emoji.clone());
        }
        if let Some(date) = self.date {
            record.date = Some(date);
        }
        if let Some(time) = &self.time {
            record.time = Some(time.clone());
        }
        if let Some(removed) = self.removed {
            record.removed = removed;
        }
    }
}

/// A single failed item within a batch operation
#[derive(Debug, Clone, PartialEq)]
pub struct BatchError {
    /// Id of the record the failure belongs to
    pub id: String,
    /// Error message
    pub error: String,
}

/// Outcome of a batch or reconciliation call
///
/// Individual item failures never abort the batch; they are captured here.
/// After a stop-on-error abort, unattempted items appear in neither count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResult {
    /// Number of items that succeeded
    pub succeeded: usize,
    /// Number of items that failed
    pub failed: usize,
    /// Per-item failures, in processing order
    pub errors: Vec<BatchError>,
}

impl BatchResult {
    /// Count one successful item
    pub fn record_success(&mut self) {
        self.succeeded += 1;
    }

    /// Count one failed item and capture its error
    pub fn record_failure(&mut self, id: impl Into<String>, error: impl fmt::Display) {
        self.failed += 1;
        self.errors.push(BatchError {
            id: id.into(),
            error: error.to_string(),
        });
    }

    /// Number of items that were actually attempted
    pub fn attempted(&self) -> usize {
        self.succeeded + self.failed
    }

    /// Merge another result by summing counts and concatenating errors
    pub fn merge(mut self, other: BatchResult) -> Self {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.errors.extend(other.errors);
        self
    }
}

/// Options for listing operations
#[derive(Debug, Clone, PartialEq)]
pub struct LoadOptions {
    /// Maximum acceptable age of cached reads
    pub max_age: Duration,
    /// Whether soft-deleted records are included
    pub include_removed: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            max_age: DEFAULT_MAX_AGE,
            include_removed: false,
        }
    }
}

impl LoadOptions {
    /// Options that bypass every cache
    pub fn fresh() -> Self {
        Self {
            max_age: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Include soft-deleted records in the listing
    pub fn include_removed(mut self) -> Self {
        self.include_removed = true;
        self
    }
}

/// Progress callback invoked after each processed batch item
pub type ProgressFn = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Options for batch operations
#[derive(Clone, Default)]
pub struct BatchOptions {
    /// Halt at the first failure, leaving later items unattempted
    pub stop_on_error: bool,
    /// Called with (completed, total) after each processed item
    pub on_progress: Option<ProgressFn>,
}

impl BatchOptions {
    /// Options that halt at the first failure
    pub fn stop_on_error() -> Self {
        Self {
            stop_on_error: true,
            on_progress: None,
        }
    }

    /// Attach a progress callback
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.on_progress = Some(progress);
        self
    }
}

impl fmt::Debug for BatchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchOptions")
            .field("stop_on_error", &self.stop_on_error)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

/// An independently addressable named collection in the remote store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope(pub String);

impl Scope {
    /// Create a new scope
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the scope name
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Scope {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Scope {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
