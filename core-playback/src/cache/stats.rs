//! Cache statistics

use serde::{Deserialize, Serialize};

/// Statistics about the media cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of entries in the index
    pub entry_count: usize,

    /// Bytes on disk under the tracks directory, index excluded
    pub total_bytes: u64,

    /// Configured budget
    pub max_bytes: u64,

    /// Timestamp when stats were calculated
    pub calculated_at: i64,
}

impl CacheStats {
    /// Cache usage as a percentage of the budget.
    pub fn usage_percentage(&self) -> f64 {
        if self.max_bytes == 0 {
            return 0.0;
        }

        (self.total_bytes as f64 / self.max_bytes as f64) * 100.0
    }

    /// Returns true if the cache is near capacity (>90%).
    pub fn is_near_capacity(&self) -> bool {
        self.usage_percentage() > 90.0
    }

    /// Returns true if the cache is full (>=100%).
    pub fn is_full(&self) -> bool {
        self.total_bytes >= self.max_bytes
    }

    /// Bytes over budget.
    pub fn space_needed(&self) -> u64 {
        self.total_bytes.saturating_sub(self.max_bytes)
    }

    /// Returns average bytes per entry.
    pub fn average_entry_size(&self) -> u64 {
        if self.entry_count == 0 {
            0
        } else {
            self.total_bytes / self.entry_count as u64
        }
    }
}
