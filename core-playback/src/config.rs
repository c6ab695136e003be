//! # Playback Configuration
//!
//! Tuning for downloads and the playback engine. Cache tuning lives in
//! [`crate::cache::CacheConfig`].

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Download pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Bytes read from the network per chunk.
    ///
    /// Default: 64 KiB.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Smallest file accepted as playable audio.
    ///
    /// Default: 10 KiB.
    #[serde(default = "default_min_valid_bytes")]
    pub min_valid_bytes: u64,

    /// Upper bound on the pre-flight connectivity probe. A timeout counts as
    /// offline.
    ///
    /// Default: 3 seconds.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout: Duration,

    /// Transfers allowed to run at once; further tasks wait in `Pending`.
    ///
    /// Default: 3.
    #[serde(default = "default_max_concurrent_downloads")]
    pub max_concurrent_downloads: usize,

    /// Progress updates are coalesced to one per window.
    ///
    /// Default: 500 ms.
    #[serde(default = "default_notify_interval")]
    pub notify_interval: Duration,

    /// How long a `Completed` or `Cancelled` task stays observable.
    ///
    /// Default: 3 seconds.
    #[serde(default = "default_completed_grace")]
    pub completed_grace: Duration,

    /// How long a `Failed` task stays observable.
    ///
    /// Default: 5 seconds.
    #[serde(default = "default_failed_grace")]
    pub failed_grace: Duration,

    /// Stream manifests memoised by the resolver.
    ///
    /// Default: 32.
    #[serde(default = "default_manifest_cache_capacity")]
    pub manifest_cache_capacity: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            min_valid_bytes: default_min_valid_bytes(),
            probe_timeout: default_probe_timeout(),
            max_concurrent_downloads: default_max_concurrent_downloads(),
            notify_interval: default_notify_interval(),
            completed_grace: default_completed_grace(),
            failed_grace: default_failed_grace(),
            manifest_cache_capacity: default_manifest_cache_capacity(),
        }
    }
}

impl DownloadConfig {
    pub fn with_chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes;
        self
    }

    pub fn with_min_valid_bytes(mut self, bytes: u64) -> Self {
        self.min_valid_bytes = bytes;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_max_concurrent_downloads(mut self, count: usize) -> Self {
        self.max_concurrent_downloads = count;
        self
    }

    pub fn with_notify_interval(mut self, interval: Duration) -> Self {
        self.notify_interval = interval;
        self
    }

    pub fn with_grace_periods(mut self, completed: Duration, failed: Duration) -> Self {
        self.completed_grace = completed;
        self.failed_grace = failed;
        self
    }

    pub fn with_manifest_cache_capacity(mut self, capacity: usize) -> Self {
        self.manifest_cache_capacity = capacity;
        self
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_size == 0 {
            return Err("chunk_size must be > 0".to_string());
        }

        if self.max_concurrent_downloads == 0 {
            return Err("max_concurrent_downloads must be at least 1".to_string());
        }

        if self.probe_timeout.is_zero() {
            return Err("probe_timeout must be > 0".to_string());
        }

        if self.manifest_cache_capacity == 0 {
            return Err("manifest_cache_capacity must be at least 1".to_string());
        }

        Ok(())
    }
}

/// Playback engine and notification configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Fraction of the session volume applied while ducked.
    ///
    /// Default: 0.4.
    #[serde(default = "default_duck_volume_factor")]
    pub duck_volume_factor: f32,

    /// Jump applied by the notification's seek forward/backward buttons.
    ///
    /// Default: 10 seconds.
    #[serde(default = "default_seek_step")]
    pub seek_step: Duration,

    /// Position push interval for the media session while playing.
    ///
    /// Default: 1 second.
    #[serde(default = "default_position_interval")]
    pub position_interval: Duration,

    /// Volume a fresh session starts with.
    ///
    /// Default: 1.0.
    #[serde(default = "default_initial_volume")]
    pub initial_volume: f32,

    /// Download YouTube sources into the cache before playing. When off,
    /// the resolved stream URL is handed to the player directly.
    ///
    /// Default: true.
    #[serde(default = "default_play_through_cache")]
    pub play_through_cache: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            duck_volume_factor: default_duck_volume_factor(),
            seek_step: default_seek_step(),
            position_interval: default_position_interval(),
            initial_volume: default_initial_volume(),
            play_through_cache: default_play_through_cache(),
        }
    }
}

impl PlayerConfig {
    pub fn with_duck_volume_factor(mut self, factor: f32) -> Self {
        self.duck_volume_factor = factor;
        self
    }

    pub fn with_seek_step(mut self, step: Duration) -> Self {
        self.seek_step = step;
        self
    }

    pub fn with_position_interval(mut self, interval: Duration) -> Self {
        self.position_interval = interval;
        self
    }

    pub fn with_initial_volume(mut self, volume: f32) -> Self {
        self.initial_volume = volume;
        self
    }

    pub fn with_play_through_cache(mut self, enabled: bool) -> Self {
        self.play_through_cache = enabled;
        self
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.duck_volume_factor) {
            return Err("duck_volume_factor must be between 0.0 and 1.0".to_string());
        }

        if !(0.0..=1.0).contains(&self.initial_volume) {
            return Err("initial_volume must be between 0.0 and 1.0".to_string());
        }

        if self.position_interval.is_zero() {
            return Err("position_interval must be > 0".to_string());
        }

        Ok(())
    }
}

// ============================================================================
// Default Functions (for serde)
// ============================================================================

fn default_chunk_size() -> usize {
    64 * 1024
}

fn default_min_valid_bytes() -> u64 {
    10 * 1024
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(3)
}

fn default_max_concurrent_downloads() -> usize {
    3
}

fn default_notify_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_completed_grace() -> Duration {
    Duration::from_secs(3)
}

fn default_failed_grace() -> Duration {
    Duration::from_secs(5)
}

fn default_manifest_cache_capacity() -> usize {
    32
}

fn default_duck_volume_factor() -> f32 {
    0.4
}

fn default_seek_step() -> Duration {
    Duration::from_secs(10)
}

fn default_position_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_initial_volume() -> f32 {
    1.0
}

fn default_play_through_cache() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_defaults() {
        let config = DownloadConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunk_size, 65_536);
        assert_eq!(config.min_valid_bytes, 10_240);
        assert_eq!(config.notify_interval, Duration::from_millis(500));
        assert_eq!(config.failed_grace, Duration::from_secs(5));
    }

    #[test]
    fn test_download_validation() {
        assert!(DownloadConfig::default().with_chunk_size(0).validate().is_err());
        assert!(DownloadConfig::default()
            .with_max_concurrent_downloads(0)
            .validate()
            .is_err());
        assert!(DownloadConfig::default()
            .with_probe_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn test_player_validation() {
        assert!(PlayerConfig::default().validate().is_ok());
        assert!(PlayerConfig::default()
            .with_duck_volume_factor(1.5)
            .validate()
            .is_err());
        assert!(PlayerConfig::default()
            .with_initial_volume(-0.1)
            .validate()
            .is_err());
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: DownloadConfig =
            serde_json::from_str(r#"{"max_concurrent_downloads": 1}"#).unwrap();
        assert_eq!(config.max_concurrent_downloads, 1);
        assert_eq!(config.chunk_size, 65_536);

        let player: PlayerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(player, PlayerConfig::default());
    }
}
