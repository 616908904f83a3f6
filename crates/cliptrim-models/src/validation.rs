//! Input validation and sanitization.
//!
//! This module provides:
//! - Video URL validation with a host whitelist (SSRF protection)
//! - Time string checks for clip boundaries
//! - Filename sanitization for client-supplied download names

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::task::{ClipRequest, OutputFormat, TEMP_PREFIX};
use crate::timestamp::{compute_duration, is_valid_time_string, parse_time_to_seconds};

/// Maximum URL length to prevent DoS attacks.
const MAX_URL_LENGTH: usize = 2048;

/// Maximum length of a sanitized filename stem.
pub const MAX_FILENAME_STEM: usize = 100;

/// Stem used when the client supplies no usable filename.
pub const DEFAULT_FILENAME_STEM: &str = "clip";

/// Lowest and highest accepted quality hints (vertical pixels).
pub const MIN_QUALITY: u32 = 144;
pub const MAX_QUALITY: u32 = 4320;

/// Recognized video hosts.
static ALLOWED_DOMAINS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    HashSet::from([
        // YouTube
        "youtube.com",
        "youtu.be",
        "youtube-nocookie.com",
        // Vimeo
        "vimeo.com",
        // Dailymotion
        "dailymotion.com",
        "dai.ly",
        // TikTok
        "tiktok.com",
        // Twitter/X
        "twitter.com",
        "x.com",
        // Instagram
        "instagram.com",
        // Facebook
        "facebook.com",
        "fb.watch",
        // Twitch
        "twitch.tv",
        // Streamable
        "streamable.com",
    ])
});

/// Blocked URL patterns (internal endpoints).
static BLOCKED_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^https?://127\.",
        r"^https?://localhost",
        r"^https?://10\.",
        r"^https?://172\.(1[6-9]|2[0-9]|3[0-1])\.",
        r"^https?://192\.168\.",
        r"^https?://169\.254\.",
        r"^https?://\[::1\]",
        r"^https?://\[fd",
        r"^https?://\[fe80",
        r"^https?://metadata\.",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid blocked pattern"))
    .collect()
});

pub type ValidationResult<T> = Result<T, ValidationError>;

/// Rejections raised before any subprocess is launched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid video URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid {field} time '{value}'. Use HH:MM:SS, HH:MM:SS.mmm or MM:SS")]
    InvalidTime { field: &'static str, value: String },

    #[error("End time must be after start time (duration was {duration}s)")]
    NonPositiveDuration { duration: i64 },

    #[error("Quality must be between 144 and 4320, got {0}")]
    InvalidQuality(u32),
}

impl ValidationError {
    pub fn invalid_url(msg: impl Into<String>) -> Self {
        Self::InvalidUrl(msg.into())
    }
}

/// Validate a video URL for protocol, internal targets and the host whitelist.
///
/// Returns the trimmed URL on success.
pub fn validate_video_url(url: &str) -> ValidationResult<String> {
    if url.len() > MAX_URL_LENGTH {
        return Err(ValidationError::invalid_url(format!(
            "URL exceeds maximum length of {} characters",
            MAX_URL_LENGTH
        )));
    }

    let url = url.trim();
    if url.is_empty() {
        return Err(ValidationError::invalid_url("URL cannot be empty"));
    }

    let parsed = Url::parse(url)
        .map_err(|e| ValidationError::invalid_url(format!("Invalid URL format: {}", e)))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(ValidationError::invalid_url(format!(
                "Invalid protocol '{}'. Only HTTP and HTTPS are allowed.",
                scheme
            )))
        }
    }

    for pattern in BLOCKED_PATTERNS.iter() {
        if pattern.is_match(url) {
            warn!(url = %url, "Blocked URL pattern detected");
            return Err(ValidationError::invalid_url(
                "URL appears to target an internal or restricted endpoint",
            ));
        }
    }

    let domain = parsed
        .host_str()
        .map(str::to_lowercase)
        .ok_or_else(|| ValidationError::invalid_url("URL must have a valid domain"))?;

    if !is_domain_allowed(&domain) {
        return Err(ValidationError::invalid_url(format!(
            "Domain '{}' is not a supported video host",
            domain
        )));
    }

    Ok(url.to_string())
}

/// Check if a domain or its registrable parent is in the whitelist.
fn is_domain_allowed(domain: &str) -> bool {
    if ALLOWED_DOMAINS.contains(domain) {
        return true;
    }

    // e.g. "www.youtube.com", "m.youtube.com", "clips.twitch.tv"
    let parts: Vec<&str> = domain.split('.').collect();
    if parts.len() >= 2 {
        let parent = format!("{}.{}", parts[parts.len() - 2], parts[parts.len() - 1]);
        if ALLOWED_DOMAINS.contains(parent.as_str()) {
            return true;
        }
    }

    false
}

/// Turn a client-supplied filename into a safe stem (no extension).
///
/// Strips any extension, path separators and traversal sequences, and
/// replaces every character [`is_safe_filename`] would reject with `_`.
/// Falls back to [`DEFAULT_FILENAME_STEM`] when nothing usable remains.
/// A stem that would put the final `<stem>_<task id>` name in the
/// [`TEMP_PREFIX`] namespace is prefixed with the default stem.
pub fn sanitize_filename(input: Option<&str>) -> String {
    let Some(raw) = input else {
        return DEFAULT_FILENAME_STEM.to_string();
    };

    // Only the last path component counts.
    let name = raw.rsplit(&['/', '\\'][..]).next().unwrap_or("");
    let stem = match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    };

    let cleaned: String = stem
        .chars()
        .map(|c| if is_filename_char(c) { c } else { '_' })
        .collect::<String>()
        .replace("..", "_");

    let trimmed: String = cleaned
        .trim_matches(|c: char| c == '.' || c.is_whitespace())
        .chars()
        .take(MAX_FILENAME_STEM)
        .collect();
    let trimmed = trimmed.trim_end().to_string();

    if trimmed.is_empty() || trimmed.chars().all(|c| c == '_') {
        return DEFAULT_FILENAME_STEM.to_string();
    }

    if format!("{}_", trimmed).starts_with(TEMP_PREFIX) {
        return format!("{}_{}", DEFAULT_FILENAME_STEM, trimmed)
            .chars()
            .take(MAX_FILENAME_STEM)
            .collect();
    }

    trimmed
}

fn is_filename_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ' | '(' | ')')
}

/// Check that a name can be joined onto a directory without escaping it.
///
/// Valid format: alphanumeric, hyphens, underscores, dots, spaces. No path
/// traversal, no hidden files.
pub fn is_safe_filename(name: &str) -> bool {
    if name.is_empty() || name.chars().count() > 255 {
        return false;
    }
    if name.contains("..") || name.contains('/') || name.contains('\\') || name.starts_with('.') {
        return false;
    }
    name.chars().all(is_filename_char)
}

/// A clip request that passed every check; safe to hand to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedClip {
    pub url: String,
    pub start_secs: u64,
    pub end_secs: u64,
    /// Always > 0
    pub duration_secs: u64,
    pub file_stem: String,
    pub format: OutputFormat,
    /// Resolution cap for video; `None` for audio
    pub quality: Option<u32>,
}

impl ClipRequest {
    /// Run every pre-launch check and compute the clip duration.
    pub fn validate(&self, default_quality: u32) -> ValidationResult<ValidatedClip> {
        let url = validate_video_url(&self.url)?;

        if !is_valid_time_string(&self.start) {
            return Err(ValidationError::InvalidTime {
                field: "start",
                value: self.start.clone(),
            });
        }
        if !is_valid_time_string(&self.end) {
            return Err(ValidationError::InvalidTime {
                field: "end",
                value: self.end.clone(),
            });
        }

        let start_secs = parse_time_to_seconds(&self.start);
        let end_secs = parse_time_to_seconds(&self.end);
        let duration = compute_duration(&self.start, &self.end);
        if duration <= 0 {
            return Err(ValidationError::NonPositiveDuration { duration });
        }

        let quality = match self.format {
            OutputFormat::Audio => None,
            OutputFormat::Video => {
                let q = self.quality.unwrap_or(default_quality);
                if !(MIN_QUALITY..=MAX_QUALITY).contains(&q) {
                    return Err(ValidationError::InvalidQuality(q));
                }
                Some(q)
            }
        };

        Ok(ValidatedClip {
            url,
            start_secs,
            end_secs,
            duration_secs: duration as u64,
            file_stem: sanitize_filename(self.filename.as_deref()),
            format: self.format,
            quality,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(start: &str, end: &str) -> ClipRequest {
        ClipRequest {
            url: "https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_string(),
            start: start.to_string(),
            end: end.to_string(),
            filename: None,
            format: OutputFormat::Video,
            quality: None,
        }
    }

    #[test]
    fn test_valid_video_urls() {
        assert!(validate_video_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ").is_ok());
        assert!(validate_video_url("https://youtu.be/dQw4w9WgXcQ").is_ok());
        assert!(validate_video_url("https://vimeo.com/123456789").is_ok());
        assert!(validate_video_url("https://clips.twitch.tv/abc").is_ok());
    }

    #[test]
    fn test_rejected_urls() {
        assert!(validate_video_url("").is_err());
        assert!(validate_video_url("not a url").is_err());
        assert!(validate_video_url("ftp://youtube.com/video").is_err());
        assert!(validate_video_url("javascript:alert(1)").is_err());
        assert!(validate_video_url("https://malicious-site.com/video.mp4").is_err());
        assert!(validate_video_url("http://127.0.0.1/video.mp4").is_err());
        assert!(validate_video_url("http://localhost/video.mp4").is_err());
        assert!(validate_video_url("http://169.254.169.254/latest/meta-data/").is_err());
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename(None), "clip");
        assert_eq!(sanitize_filename(Some("")), "clip");
        assert_eq!(sanitize_filename(Some("my clip.mp4")), "my clip");
        assert_eq!(sanitize_filename(Some("../../etc/passwd")), "passwd");
        assert_eq!(sanitize_filename(Some("..\\..\\boot.ini")), "boot");
        assert_eq!(sanitize_filename(Some("a<b>c:d|e?f*g")), "a_b_c_d_e_f_g");
        assert_eq!(sanitize_filename(Some("...")), "clip");
        assert_eq!(sanitize_filename(Some("..hidden..name")), "_hidden");
    }

    #[test]
    fn test_sanitize_filename_stays_out_of_temp_namespace() {
        assert_eq!(sanitize_filename(Some("temp")), "clip_temp");
        assert_eq!(sanitize_filename(Some("temp.mp4")), "clip_temp");
        assert_eq!(
            sanitize_filename(Some("temp_0123456789abcdef0123456789abcdef")),
            "clip_temp_0123456789abcdef0123456789abcdef"
        );
        assert_eq!(sanitize_filename(Some("temp_claim_x_clip")), "clip_temp_claim_x_clip");
        assert_eq!(sanitize_filename(Some("temperature")), "temperature");
        assert_eq!(sanitize_filename(Some("TEMP")), "TEMP");

        let long = format!("temp_{}", "x".repeat(300));
        let stem = sanitize_filename(Some(&long));
        assert_eq!(stem.chars().count(), MAX_FILENAME_STEM);
        assert!(!format!("{}_", stem).starts_with(TEMP_PREFIX));
    }

    #[test]
    fn test_sanitize_filename_truncates() {
        let long = "x".repeat(300);
        assert_eq!(sanitize_filename(Some(&long)).len(), MAX_FILENAME_STEM);
    }

    #[test]
    fn test_is_safe_filename() {
        assert!(is_safe_filename("clip.mp4"));
        assert!(is_safe_filename("my clip_0123abcd.mp3"));
        assert!(!is_safe_filename("../etc/passwd"));
        assert!(!is_safe_filename("path/to/file.mp4"));
        assert!(!is_safe_filename(".env"));
        assert!(!is_safe_filename(""));
    }

    #[test]
    fn test_validate_computes_duration() {
        let clip = request("00:01:00", "00:01:30").validate(1080).unwrap();
        assert_eq!(clip.start_secs, 60);
        assert_eq!(clip.end_secs, 90);
        assert_eq!(clip.duration_secs, 30);
        assert_eq!(clip.quality, Some(1080));
        assert_eq!(clip.file_stem, "clip");
    }

    #[test]
    fn test_validate_rejects_reversed_range() {
        let err = request("00:04:00", "00:03:00").validate(1080).unwrap_err();
        assert_eq!(err, ValidationError::NonPositiveDuration { duration: -60 });

        let err = request("00:03:00", "00:03:00").validate(1080).unwrap_err();
        assert_eq!(err, ValidationError::NonPositiveDuration { duration: 0 });
    }

    #[test]
    fn test_validate_rejects_malformed_times() {
        assert!(matches!(
            request("", "00:03:00").validate(1080),
            Err(ValidationError::InvalidTime { field: "start", .. })
        ));
        assert!(matches!(
            request("00:01:00", "later").validate(1080),
            Err(ValidationError::InvalidTime { field: "end", .. })
        ));
    }

    #[test]
    fn test_validate_quality() {
        let mut req = request("00:00", "00:10");
        req.quality = Some(50);
        assert_eq!(req.validate(1080), Err(ValidationError::InvalidQuality(50)));

        req.format = OutputFormat::Audio;
        assert_eq!(req.validate(1080).unwrap().quality, None);
    }
}
