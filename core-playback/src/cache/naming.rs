//! Cache file naming.
//!
//! Cached files are named `{stem}_{title}.{ext}`. The stem is the key itself
//! when it is filename-safe (YouTube ids always are), otherwise a short
//! SHA-256 prefix of the key.

use sha2::{Digest, Sha256};

const MAX_TITLE_CHARS: usize = 80;
const MAX_STEM_CHARS: usize = 64;
const HASHED_STEM_HEX_CHARS: usize = 16;
const FALLBACK_TITLE: &str = "audio";

const FORBIDDEN: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Makes a title safe to embed in a file name.
///
/// ```
/// use core_playback::cache::naming::sanitize_title;
///
/// assert_eq!(sanitize_title("  AC/DC: Back in Black  "), "ACDC_Back_in_Black");
/// assert_eq!(sanitize_title("..."), "audio");
/// ```
pub fn sanitize_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut in_whitespace = false;

    for c in title.chars() {
        if c.is_whitespace() {
            in_whitespace = true;
            continue;
        }
        if FORBIDDEN.contains(&c) || c.is_control() {
            continue;
        }
        if in_whitespace && !out.is_empty() {
            out.push('_');
        }
        in_whitespace = false;
        out.push(c);
    }

    let trimmed = trim_separators(&out);
    let capped: String = trimmed.chars().take(MAX_TITLE_CHARS).collect();
    let result = trim_separators(&capped);

    if result.is_empty() {
        FALLBACK_TITLE.to_string()
    } else {
        result.to_string()
    }
}

fn trim_separators(s: &str) -> &str {
    s.trim_matches(|c| c == '_' || c == '.')
}

fn is_filename_safe(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= MAX_STEM_CHARS
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// File stem for a cache key.
pub fn file_stem(key: &str) -> String {
    if is_filename_safe(key) {
        return key.to_string();
    }

    let digest = Sha256::digest(key.as_bytes());
    let mut hex = String::with_capacity(HASHED_STEM_HEX_CHARS);
    for byte in digest.iter().take(HASHED_STEM_HEX_CHARS / 2) {
        hex.push_str(&format!("{:02x}", byte));
    }
    hex
}

/// Full file name for a cache entry.
///
/// ```
/// use core_playback::cache::naming::cache_file_name;
///
/// assert_eq!(
///     cache_file_name("dQw4w9WgXcQ", Some("Never Gonna Give You Up"), Some("m4a")),
///     "dQw4w9WgXcQ_Never_Gonna_Give_You_Up.m4a"
/// );
/// ```
pub fn cache_file_name(key: &str, title: Option<&str>, extension: Option<&str>) -> String {
    let stem = file_stem(key);
    let title = sanitize_title(title.unwrap_or_default());

    match extension.filter(|ext| !ext.is_empty()) {
        Some(ext) => format!("{}_{}.{}", stem, title, ext.to_ascii_lowercase()),
        None => format!("{}_{}", stem, title),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_forbidden_and_control() {
        assert_eq!(sanitize_title("a<b>c:d\"e|f?g*h\u{0007}"), "abcdefgh");
        assert_eq!(sanitize_title("tab\tand\nnewline"), "tab_and_newline");
    }

    #[test]
    fn test_sanitize_collapses_whitespace_runs() {
        assert_eq!(sanitize_title("one    two\t\tthree"), "one_two_three");
    }

    #[test]
    fn test_sanitize_trims_dots_and_underscores() {
        assert_eq!(sanitize_title("__.hidden track.__"), "hidden_track");
    }

    #[test]
    fn test_sanitize_caps_length() {
        let long = "x".repeat(200);
        assert_eq!(sanitize_title(&long).chars().count(), MAX_TITLE_CHARS);

        // trailing separator exposed by the cap is trimmed again
        let edge = format!("{}_tail", "y".repeat(MAX_TITLE_CHARS - 1));
        assert_eq!(sanitize_title(&edge), "y".repeat(MAX_TITLE_CHARS - 1));
    }

    #[test]
    fn test_sanitize_fallback() {
        assert_eq!(sanitize_title(""), "audio");
        assert_eq!(sanitize_title("???"), "audio");
    }

    #[test]
    fn test_stem_hashes_unsafe_keys() {
        assert_eq!(file_stem("dQw4w9WgXcQ"), "dQw4w9WgXcQ");

        let stem = file_stem("https://cdn.example.com/a.mp3?sig=1");
        assert_eq!(stem.len(), HASHED_STEM_HEX_CHARS);
        assert!(stem.bytes().all(|b| b.is_ascii_hexdigit()));
        assert_eq!(stem, file_stem("https://cdn.example.com/a.mp3?sig=1"));
    }

    #[test]
    fn test_file_name_without_extension() {
        assert_eq!(cache_file_name("abc", None, None), "abc_audio");
        assert_eq!(cache_file_name("abc", Some("Song"), Some("WEBM")), "abc_Song.webm");
    }
}
