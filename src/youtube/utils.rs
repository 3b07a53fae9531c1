use regex::Regex;
use std::sync::LazyLock;

use crate::error::{MusicStreamError, Result};

pub const WEB_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
pub const ANDROID_USER_AGENT: &str =
    "com.google.android.youtube/20.10.38 (Linux; U; Android 11) gzip";

/// Watch, short-link, embed and `/v/` forms, with or without scheme
static YOUTUBE_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^((?:https?:)?//)?((?:www|m)\.)?((?:youtube(-nocookie)?\.com|youtu\.be))(/(?:[\w\-]+\?v=|embed/|v/)?)([\w\-]+)(\S+)?$",
    )
    .expect("youtube url pattern")
});

/// Check if URL is a YouTube video link
pub fn is_youtube_url(url: &str) -> bool {
    YOUTUBE_URL_RE.is_match(url.trim())
}

/// Parse video ID from YouTube URL or direct video ID string
pub fn parse_id(url: &str) -> Result<String> {
    let url = url.trim();
    if is_valid_video_id(url) {
        return Ok(url.to_string());
    }

    YOUTUBE_URL_RE
        .captures(url)
        .and_then(|c| c.get(6))
        .map(|m| m.as_str().to_string())
        .filter(|id| is_valid_video_id(id))
        .ok_or_else(|| {
            MusicStreamError::InvalidUrl(format!("Cannot extract video ID from: {}", url))
        })
}

/// Validate if a string is a valid YouTube video ID (11 characters, alphanumeric + - and _)
pub fn is_valid_video_id(id: &str) -> bool {
    id.len() == 11
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Construct YouTube watch URL from video ID
pub fn build_watch_url(base_url: &str, video_id: &str) -> String {
    format!("{}/watch?v={}", base_url.trim_end_matches('/'), video_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_youtube_url() {
        assert!(is_youtube_url("https://www.youtube.com/watch?v=wEGOxgfdRVc"));
        assert!(is_youtube_url("http://m.youtube.com/watch?v=wEGOxgfdRVc&t=10"));
        assert!(is_youtube_url("youtube.com/watch?v=wEGOxgfdRVc"));
        assert!(is_youtube_url("https://youtu.be/wEGOxgfdRVc"));
        assert!(is_youtube_url("//www.youtube-nocookie.com/embed/wEGOxgfdRVc"));
        assert!(is_youtube_url("https://www.youtube.com/v/wEGOxgfdRVc"));

        assert!(!is_youtube_url("https://example.com/site/podcast/episode1"));
        assert!(!is_youtube_url("https://notyoutube.com/watch?v=wEGOxgfdRVc"));
        assert!(!is_youtube_url("https://example.com/?ref=youtube.com"));
        assert!(!is_youtube_url(""));
    }

    #[test]
    fn test_parse_id() {
        for url in [
            "wEGOxgfdRVc",
            "https://www.youtube.com/watch?v=wEGOxgfdRVc",
            "https://www.youtube.com/watch?v=wEGOxgfdRVc&list=PL123",
            "https://youtu.be/wEGOxgfdRVc?si=abc",
            "https://www.youtube-nocookie.com/embed/wEGOxgfdRVc",
            "https://www.youtube.com/v/wEGOxgfdRVc",
        ] {
            assert_eq!(parse_id(url).unwrap(), "wEGOxgfdRVc", "{url}");
        }

        assert!(parse_id("https://example.com/watch?v=wEGOxgfdRVc").is_err());
        assert!(parse_id("https://www.youtube.com/watch?v=short").is_err());
    }

    #[test]
    fn test_build_watch_url() {
        assert_eq!(
            build_watch_url("https://www.youtube.com/", "wEGOxgfdRVc"),
            "https://www.youtube.com/watch?v=wEGOxgfdRVc"
        );
    }
}
