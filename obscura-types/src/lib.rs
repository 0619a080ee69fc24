//! Shared identifiers and data model for the Obscura sync engine.
//!
//! Everything here is plain data — no I/O, no clocks. Timestamps on
//! [`UploadTask`] are always supplied by the caller so the stores built on
//! top of these types stay deterministic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for an upload task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a local media record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId(pub Uuid);

impl FileId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a media folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FolderId(pub Uuid);

impl FolderId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for FolderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of media a local record holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Photo,
    Video,
    Audio,
    Note,
    Pdf,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Photo => "photo",
            MediaType::Video => "video",
            MediaType::Audio => "audio",
            MediaType::Note => "note",
            MediaType::Pdf => "pdf",
        }
    }

    /// Remote object-key category segment. Lower-case and stable across
    /// renames — this string ends up in S3 keys.
    pub fn category_segment(&self) -> &'static str {
        match self {
            MediaType::Photo => "photos",
            MediaType::Video => "videos",
            MediaType::Audio => "audio",
            MediaType::Note => "notes",
            MediaType::Pdf => "pdfs",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "photo" => Some(MediaType::Photo),
            "video" => Some(MediaType::Video),
            "audio" => Some(MediaType::Audio),
            "note" => Some(MediaType::Note),
            "pdf" => Some(MediaType::Pdf),
            _ => None,
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of an upload task in the durable queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Success,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Success => "SUCCESS",
            TaskStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(TaskStatus::Pending),
            "IN_PROGRESS" => Some(TaskStatus::InProgress),
            "SUCCESS" => Some(TaskStatus::Success),
            "FAILED" => Some(TaskStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A durable upload task — one row in the upload queue.
///
/// `media_type` and `folder_id` are denormalized copies of the media
/// record's fields so the remote object key can be rebuilt while the
/// metadata store is vault-locked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadTask {
    pub id: TaskId,
    pub file_id: FileId,
    pub status: TaskStatus,
    /// Fractional completion in `[0.0, 1.0]`.
    pub progress: f64,
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub media_type: MediaType,
    pub folder_id: Option<FolderId>,
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// User-facing message, set only on failure.
    pub error_message: Option<String>,
    /// Remote URL, set if and only if the task succeeded.
    pub uploaded_url: Option<String>,
}

impl UploadTask {
    /// True once the task has burned through all its attempts and failed.
    /// Exhausted tasks are never picked up by the pending-work query again.
    pub fn is_exhausted(&self) -> bool {
        self.status == TaskStatus::Failed && self.attempt_count >= self.max_attempts
    }

    pub fn is_terminal(&self) -> bool {
        self.status == TaskStatus::Success || self.is_exhausted()
    }
}

/// Fields needed to enqueue a new upload task. The queue assigns the id
/// and stamps `created_at` with the caller-supplied time.
#[derive(Debug, Clone)]
pub struct NewUploadTask {
    pub file_id: FileId,
    pub media_type: MediaType,
    pub folder_id: Option<FolderId>,
    pub max_attempts: u32,
}

/// A node in the user's folder hierarchy, as far as the sync engine
/// cares: a name and an optional parent link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderRecord {
    pub id: FolderId,
    pub name: String,
    pub parent: Option<FolderId>,
}

/// Counts by status for user-visible progress summaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSummary {
    pub pending: u64,
    pub in_progress: u64,
    pub succeeded: u64,
    pub failed: u64,
}

impl QueueSummary {
    pub fn total(&self) -> u64 {
        self.pending + self.in_progress + self.succeeded + self.failed
    }
}
