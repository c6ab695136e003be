//! Cache configuration and policies

use serde::{Deserialize, Serialize};

/// Configuration for the media cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum cache size in bytes (default: 2GB)
    #[serde(default = "default_max_size_bytes")]
    pub max_size_bytes: u64,

    /// Files smaller than this are treated as corrupt (default: 10KB)
    #[serde(default = "default_min_valid_bytes")]
    pub min_valid_bytes: u64,

    /// Eviction policy when cache is over budget
    #[serde(default)]
    pub eviction_policy: EvictionPolicy,

    /// Subdirectory holding cached files and the index
    #[serde(default = "default_tracks_dir")]
    pub tracks_dir: String,

    /// Sibling subdirectory for in-flight downloads
    #[serde(default = "default_partial_dir")]
    pub partial_dir: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: default_max_size_bytes(),
            min_valid_bytes: default_min_valid_bytes(),
            eviction_policy: EvictionPolicy::default(),
            tracks_dir: default_tracks_dir(),
            partial_dir: default_partial_dir(),
        }
    }
}

impl CacheConfig {
    /// Create a new cache configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum cache size.
    pub fn with_max_size(mut self, bytes: u64) -> Self {
        self.max_size_bytes = bytes;
        self
    }

    /// Set the minimum valid file size.
    pub fn with_min_valid_bytes(mut self, bytes: u64) -> Self {
        self.min_valid_bytes = bytes;
        self
    }

    /// Set eviction policy.
    pub fn with_eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.eviction_policy = policy;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_size_bytes == 0 {
            return Err("max_size_bytes must be greater than 0".to_string());
        }

        if self.min_valid_bytes > self.max_size_bytes {
            return Err("min_valid_bytes cannot exceed max_size_bytes".to_string());
        }

        if self.tracks_dir.is_empty() || self.partial_dir.is_empty() {
            return Err("cache subdirectories cannot be empty".to_string());
        }

        if self.tracks_dir == self.partial_dir {
            return Err("tracks_dir and partial_dir must differ".to_string());
        }

        Ok(())
    }
}

/// Policy for evicting tracks when the cache is over budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Remove tracks that haven't been played recently
    #[default]
    LeastRecentlyUsed,

    /// Remove oldest downloaded tracks first
    FirstInFirstOut,

    /// Remove largest tracks first to free more space
    LargestFirst,
}

impl EvictionPolicy {
    /// Returns a human-readable description of the policy.
    pub fn description(&self) -> &'static str {
        match self {
            EvictionPolicy::LeastRecentlyUsed => {
                "Remove tracks that haven't been played recently"
            }
            EvictionPolicy::FirstInFirstOut => "Remove oldest downloaded tracks first",
            EvictionPolicy::LargestFirst => "Remove largest tracks first to free more space",
        }
    }
}

fn default_max_size_bytes() -> u64 {
    2 * 1024 * 1024 * 1024
}

fn default_min_valid_bytes() -> u64 {
    10 * 1024
}

fn default_tracks_dir() -> String {
    "tracks".to_string()
}

fn default_partial_dir() -> String {
    "partial".to_string()
}
