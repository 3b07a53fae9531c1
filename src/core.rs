use crate::download::HttpClient;
use crate::error::Result;
use crate::utils::{basename, strip_query};
use crate::youtube::is_youtube_url;
use serde::{Deserialize, Serialize};
pub use strum::IntoEnumIterator;
use strum_macros::EnumIter;

/// Extensions a discovered stream may carry to survive the extraction filter
pub const EXTRACTION_EXTENSIONS: &[&str] = &[
    ".wma", ".xspf", ".pls", ".m3u8", ".m3u", ".hls", ".mp3", ".aac", ".ogg", ".m4a", ".wav",
];

/// Extensions the generic download branch knows how to store verbatim
pub const DOWNLOAD_EXTENSIONS: &[&str] = &[".mp3", ".aac", ".ogg", ".m4a", ".wav", ".mpeg"];

/// Playlist manifest extensions (media-list handling in the backend)
pub const PLAYLIST_EXTENSIONS: &[&str] = &["pls", "m3u", "xspf"];

/// Category of an input reference
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// Any web resource that needs heuristic extraction
    Generic,
    /// A video hosting site with extractable audio-only renditions
    AudioPlatform,
}

/// Classify a reference. Total and side-effect free: anything that is not a
/// recognised platform link is generic.
pub fn classify(reference: &str) -> SourceKind {
    if is_youtube_url(reference) {
        SourceKind::AudioPlatform
    } else {
        SourceKind::Generic
    }
}

/// Whether the stream points at a playlist manifest (pls, m3u, xspf)
pub fn is_stream_playlist(url: &str) -> bool {
    let name = basename(url).to_ascii_lowercase();
    PLAYLIST_EXTENSIONS
        .iter()
        .any(|ext| name.ends_with(&format!(".{ext}")))
}

/// Whether the URL path (query and fragment ignored) ends in one of `extensions`
pub fn has_supported_extension(url: &str, extensions: &[&str]) -> bool {
    let path = strip_query(url).to_ascii_lowercase();
    extensions.iter().any(|ext| path.ends_with(ext))
}

// Audio format representation
#[derive(EnumIter, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AudioFormat {
    Mp3,
    M4A,
    Flac,
    Wav,
    AAC,
    Ogg,
    Wma,
    Mpeg,
    Mp4,
    Webm,
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => ".mp3",
            AudioFormat::M4A => ".m4a",
            AudioFormat::Flac => ".flac",
            AudioFormat::Wav => ".wav",
            AudioFormat::AAC => ".aac",
            AudioFormat::Ogg => ".ogg",
            AudioFormat::Wma => ".wma",
            AudioFormat::Mpeg => ".mpeg",
            AudioFormat::Mp4 => ".mp4",
            AudioFormat::Webm => ".webm",
        }
    }

    /// Infer the format from the URL suffix
    pub fn from_url(url: &str) -> Option<Self> {
        let path = strip_query(url).to_ascii_lowercase();
        AudioFormat::iter().find(|fmt| path.ends_with(fmt.extension()))
    }

    /// Infer the format from an advertised mime type such as `audio/webm; codecs="opus"`
    pub fn from_mime(mime: &str) -> Self {
        if mime.starts_with("audio/webm") {
            return Self::Webm;
        };
        Self::M4A
    }
}

/// One discovered URL that might be directly playable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamCandidate {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<AudioFormat>,
    /// Average bitrate in bits per second, when the platform reports it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u64>,
}

impl StreamCandidate {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let format = AudioFormat::from_url(&url);
        Self {
            url,
            format,
            bitrate: None,
        }
    }

    pub fn with_format(mut self, format: AudioFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_bitrate(mut self, bitrate: u64) -> Self {
        self.bitrate = Some(bitrate);
        self
    }

    pub fn is_playlist(&self) -> bool {
        is_stream_playlist(&self.url)
    }
}

/// Best-effort metadata gathered during extraction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub duration: Option<u64>,
}

/// Outcome of running an extractor on a reference
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub candidates: Vec<StreamCandidate>,
    pub metadata: Metadata,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Trait for extracting audio streams from different kinds of references
#[async_trait::async_trait]
pub trait Extractor: Send + Sync {
    /// Check if the reference is handled by this extractor
    fn matches(&self, url: &str) -> bool;

    /// Discover the candidate streams of a reference
    async fn extract(&self, http: &HttpClient, url: &str) -> Result<Extraction>;

    /// Category this extractor serves
    fn kind(&self) -> SourceKind;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(
            classify("https://example.com/site/podcast/episode1"),
            SourceKind::Generic
        );
        assert_eq!(
            classify("https://www.youtube.com/watch?v=wEGOxgfdRVc"),
            SourceKind::AudioPlatform
        );
        assert_eq!(classify("https://youtu.be/wEGOxgfdRVc"), SourceKind::AudioPlatform);
        assert_eq!(
            classify("https://www.youtube-nocookie.com/embed/wEGOxgfdRVc"),
            SourceKind::AudioPlatform
        );
        assert_eq!(classify(""), SourceKind::Generic);
        assert_eq!(classify("not a url at all"), SourceKind::Generic);
    }

    #[test]
    fn test_is_stream_playlist() {
        assert!(is_stream_playlist(
            "http://yp.shoutcast.com/sbin/tunein-station.xspf?id=1631097"
        ));
        assert!(is_stream_playlist(
            "http://yp.shoutcast.com/sbin/tunein-station.m3u?id=99497996"
        ));
        assert!(is_stream_playlist("https://playerservices.streamtheworld.com/pls/CKFMFMAAC.pls"));
        assert!(is_stream_playlist("http://host/list.PLS#frag"));
        assert!(!is_stream_playlist("http://host/live/CKFMFM_ADP.m3u8"));
        assert!(!is_stream_playlist("http://icecast.vrtcdn.be/mnm-high.mp3"));
        assert!(!is_stream_playlist("http://host/pls/stream"));
    }

    #[test]
    fn test_has_supported_extension() {
        assert!(has_supported_extension(
            "https://x/a.mp3?token=1",
            EXTRACTION_EXTENSIONS
        ));
        assert!(!has_supported_extension(
            "https://x/a.mp3.html",
            EXTRACTION_EXTENSIONS
        ));
        assert!(!has_supported_extension("https://x/cover.jpg", EXTRACTION_EXTENSIONS));
        assert!(!has_supported_extension("https://x/list.pls", DOWNLOAD_EXTENSIONS));
    }

    #[test]
    fn test_audio_format() {
        assert_eq!(AudioFormat::from_url("http://h/a.OGG?x"), Some(AudioFormat::Ogg));
        assert_eq!(AudioFormat::from_url("http://h/a.pls"), None);
        assert_eq!(
            AudioFormat::from_mime("audio/webm; codecs=\"opus\""),
            AudioFormat::Webm
        );
        assert_eq!(AudioFormat::from_mime("audio/mp4"), AudioFormat::M4A);
    }
}
