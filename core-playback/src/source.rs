//! # Media Sources
//!
//! Classifies caller-supplied strings into local files, direct HTTP URLs or
//! YouTube videos.
//!
//! Classification is by substring, in this order:
//! 1. contains `youtube.com` or `youtu.be` → [`MediaSource::YouTube`]
//! 2. starts with `http://` or `https://` → [`MediaSource::DirectUrl`]
//! 3. anything else → [`MediaSource::Local`]
//!
//! ```
//! use core_playback::source::MediaSource;
//!
//! let source: MediaSource = "https://youtu.be/dQw4w9WgXcQ?t=42".parse().unwrap();
//! assert_eq!(source.key(), "dQw4w9WgXcQ");
//! ```

use crate::error::SourceError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

/// Length of every YouTube video id.
pub const VIDEO_ID_LEN: usize = 11;

/// Id patterns, tried in order. Each is anchored to exactly eleven
/// URL-safe characters followed by a non-id character or the end.
const VIDEO_ID_PATTERNS: &[&str] = &[
    r"v=([A-Za-z0-9_-]{11})(?:[^A-Za-z0-9_-]|$)",
    r"youtu\.be/([A-Za-z0-9_-]{11})(?:[^A-Za-z0-9_-]|$)",
    r"embed/([A-Za-z0-9_-]{11})(?:[^A-Za-z0-9_-]|$)",
    r"/v/([A-Za-z0-9_-]{11})(?:[^A-Za-z0-9_-]|$)",
];

fn video_id_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        VIDEO_ID_PATTERNS
            .iter()
            .filter_map(|pattern| Regex::new(pattern).ok())
            .collect()
    })
}

/// An 11-character YouTube video id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VideoId(String);

impl VideoId {
    /// Accepts a bare id.
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        let valid = id.len() == VIDEO_ID_LEN
            && id
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
        valid.then_some(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for VideoId {
    type Error = SourceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        VideoId::new(value.clone()).ok_or(SourceError::InvalidVideoUrl(value))
    }
}

impl From<VideoId> for String {
    fn from(id: VideoId) -> Self {
        id.0
    }
}

/// Extracts the video id from a YouTube URL using the first matching pattern.
///
/// ```
/// use core_playback::source::extract_video_id;
///
/// let id = extract_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ&list=RD").unwrap();
/// assert_eq!(id.as_str(), "dQw4w9WgXcQ");
/// assert!(extract_video_id("https://www.youtube.com/watch?v=short").is_none());
/// ```
pub fn extract_video_id(url: &str) -> Option<VideoId> {
    video_id_patterns().iter().find_map(|pattern| {
        pattern
            .captures(url)
            .and_then(|captures| captures.get(1))
            .and_then(|id| VideoId::new(id.as_str()))
    })
}

/// Where a track's audio comes from.
///
/// Immutable once parsed. Equality and hashing use [`MediaSource::key`], so
/// two different URLs for the same video compare equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MediaSource {
    Local(PathBuf),
    DirectUrl(String),
    YouTube(VideoId),
}

impl MediaSource {
    /// Classifies a caller-supplied string.
    ///
    /// # Errors
    ///
    /// - [`SourceError::Empty`] for empty or whitespace-only input
    /// - [`SourceError::InvalidVideoUrl`] for a YouTube link without a video id
    pub fn parse(input: &str) -> Result<Self, SourceError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(SourceError::Empty);
        }

        if input.contains("youtube.com") || input.contains("youtu.be") {
            return extract_video_id(input)
                .map(MediaSource::YouTube)
                .ok_or_else(|| SourceError::InvalidVideoUrl(input.to_string()));
        }

        if input.starts_with("http://") || input.starts_with("https://") {
            return Ok(MediaSource::DirectUrl(input.to_string()));
        }

        Ok(MediaSource::Local(PathBuf::from(input)))
    }

    /// Stable identity: the video id for YouTube, the raw string otherwise.
    pub fn key(&self) -> String {
        match self {
            MediaSource::Local(path) => path.to_string_lossy().into_owned(),
            MediaSource::DirectUrl(url) => url.clone(),
            MediaSource::YouTube(id) => id.to_string(),
        }
    }

    pub fn video_id(&self) -> Option<&VideoId> {
        match self {
            MediaSource::YouTube(id) => Some(id),
            _ => None,
        }
    }

    pub fn local_path(&self) -> Option<&Path> {
        match self {
            MediaSource::Local(path) => Some(path),
            _ => None,
        }
    }

    /// Only remote sources can be fetched into the cache.
    pub fn is_downloadable(&self) -> bool {
        !matches!(self, MediaSource::Local(_))
    }

    /// Short tag for logs and events.
    pub fn kind(&self) -> &'static str {
        match self {
            MediaSource::Local(_) => "local",
            MediaSource::DirectUrl(_) => "direct_url",
            MediaSource::YouTube(_) => "youtube",
        }
    }
}

impl FromStr for MediaSource {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MediaSource::parse(s)
    }
}

impl PartialEq for MediaSource {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for MediaSource {}

impl Hash for MediaSource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.key())
    }
}
