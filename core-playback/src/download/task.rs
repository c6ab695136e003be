//! Download task model

use crate::source::MediaSource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Lifecycle of a download task.
///
/// The happy path is `Pending → Resolving → Downloading → Verifying →
/// Completed`. `Failed` and `Cancelled` are reachable from any non-terminal
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadState {
    Pending,
    Resolving,
    Downloading,
    Verifying,
    Completed,
    Failed,
    Cancelled,
}

impl DownloadState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadState::Completed | DownloadState::Failed | DownloadState::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadState::Pending => "pending",
            DownloadState::Resolving => "resolving",
            DownloadState::Downloading => "downloading",
            DownloadState::Verifying => "verifying",
            DownloadState::Completed => "completed",
            DownloadState::Failed => "failed",
            DownloadState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for DownloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one download.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadTask {
    pub id: String,
    pub source: MediaSource,
    pub state: DownloadState,
    /// Completed fraction in `0.0..=1.0`; never decreases, exactly `1.0`
    /// once `Completed`.
    pub progress: f32,
    pub downloaded_bytes: u64,
    pub total_bytes: Option<u64>,
    /// First line of the failure, for `Failed` tasks.
    pub error_message: Option<String>,
    pub result_path: Option<PathBuf>,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DownloadTask {
    pub(crate) fn new(id: String, source: MediaSource, now: DateTime<Utc>) -> Self {
        Self {
            id,
            source,
            state: DownloadState::Pending,
            progress: 0.0,
            downloaded_bytes: 0,
            total_bytes: None,
            error_message: None,
            result_path: None,
            title: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Why a [`TaskListUpdate`] was sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum UpdateCause {
    Created { task_id: String },
    StateChanged { task_id: String, state: DownloadState },
    Progress { task_id: String },
    Removed { task_id: String },
}

impl UpdateCause {
    pub fn task_id(&self) -> &str {
        match self {
            UpdateCause::Created { task_id }
            | UpdateCause::StateChanged { task_id, .. }
            | UpdateCause::Progress { task_id }
            | UpdateCause::Removed { task_id } => task_id,
        }
    }
}

/// The whole task list after one change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskListUpdate {
    pub cause: UpdateCause,
    /// Active tasks, oldest first.
    pub tasks: Vec<DownloadTask>,
}

impl TaskListUpdate {
    pub fn task(&self, id: &str) -> Option<&DownloadTask> {
        self.tasks.iter().find(|task| task.id == id)
    }
}

/// Result of [`start_download`](crate::download::DownloadTaskManager::start_download).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// A non-terminal task with this id already exists; nothing changed.
    AlreadyActive,
}
