//! Transfer progress and rate estimation

use core_async::time::Instant;
use serde::{Deserialize, Serialize};

/// Raw byte counts reported by the download engine after every chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransferProgress {
    pub downloaded_bytes: u64,
    /// Expected total, from `Content-Length` or the provider's stream size.
    pub total_bytes: Option<u64>,
}

impl TransferProgress {
    /// Completed fraction, clamped to `0.0..=1.0`. Zero while the total is
    /// unknown.
    pub fn fraction(&self) -> f32 {
        match self.total_bytes {
            Some(total) if total > 0 => {
                (self.downloaded_bytes as f64 / total as f64).clamp(0.0, 1.0) as f32
            }
            _ => 0.0,
        }
    }
}

/// Speed and ETA tracking for one transfer.
///
/// Uses the runtime clock, so paused-time tests see deterministic rates.
#[derive(Debug, Clone)]
pub struct DownloadProgress {
    /// Task identifier
    pub task_id: String,

    /// Total file size in bytes, when known
    pub total_bytes: Option<u64>,

    /// Bytes downloaded so far
    pub downloaded_bytes: u64,

    /// Download progress percentage (0-100)
    pub progress_percent: u8,

    /// Current download speed in bytes/second
    pub speed_bytes_per_sec: u64,

    /// Estimated time remaining in seconds
    pub eta_seconds: Option<u64>,

    started_at: Instant,
}

impl DownloadProgress {
    /// Create new download progress tracker.
    pub fn new(task_id: impl Into<String>, total_bytes: Option<u64>) -> Self {
        Self {
            task_id: task_id.into(),
            total_bytes,
            downloaded_bytes: 0,
            progress_percent: 0,
            speed_bytes_per_sec: 0,
            eta_seconds: None,
            started_at: Instant::now(),
        }
    }

    /// Fold in a transfer report.
    pub fn update(&mut self, transfer: TransferProgress) {
        if transfer.total_bytes.is_some() {
            self.total_bytes = transfer.total_bytes;
        }
        self.downloaded_bytes = transfer.downloaded_bytes;

        if let Some(total) = self.total_bytes.filter(|t| *t > 0) {
            let percent = (self.downloaded_bytes as f64 / total as f64) * 100.0;
            self.progress_percent = percent.min(100.0) as u8;
        }

        let elapsed_ms = self.started_at.elapsed().as_millis().max(1) as u64;
        self.speed_bytes_per_sec = self.downloaded_bytes.saturating_mul(1000) / elapsed_ms;

        self.eta_seconds = match (self.total_bytes, self.speed_bytes_per_sec) {
            (Some(total), speed) if speed > 0 => {
                Some(total.saturating_sub(self.downloaded_bytes) / speed)
            }
            _ => None,
        };
    }

    /// Returns true if download is complete.
    pub fn is_complete(&self) -> bool {
        matches!(self.total_bytes, Some(total) if self.downloaded_bytes >= total)
    }

    /// Format speed as human-readable string.
    pub fn speed_string(&self) -> String {
        format_bytes_per_sec(self.speed_bytes_per_sec)
    }

    /// Format ETA as human-readable string.
    pub fn eta_string(&self) -> String {
        match self.eta_seconds {
            Some(secs) => format_duration_seconds(secs),
            None => "calculating...".to_string(),
        }
    }
}

/// Format bytes per second as human-readable string.
pub fn format_bytes_per_sec(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B/s", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB/s", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB/s", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB/s", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format duration in seconds as human-readable string.
pub fn format_duration_seconds(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}
