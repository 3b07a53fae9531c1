use crate::config::DEFAULT_YOUTUBE_BASE_URL;
use crate::core::{Extraction, Extractor, SourceKind};
use crate::download::HttpClient;
use crate::error::Result;
use async_trait::async_trait;

pub mod core;
pub mod types;
pub mod utils;

pub use self::core::{download_headers, extract_audio};
pub use utils::{build_watch_url, is_youtube_url, parse_id};

/// YouTube extractor implementing the Extractor trait
#[derive(Debug, Clone)]
pub struct YoutubeExtractor {
    base_url: String,
}

impl YoutubeExtractor {
    /// Point the extractor at another host serving the same endpoints
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl Default for YoutubeExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_YOUTUBE_BASE_URL)
    }
}

#[async_trait]
impl Extractor for YoutubeExtractor {
    fn matches(&self, url: &str) -> bool {
        is_youtube_url(url)
    }

    async fn extract(&self, http: &HttpClient, url: &str) -> Result<Extraction> {
        extract_audio(http, &self.base_url, url).await
    }

    fn kind(&self) -> SourceKind {
        SourceKind::AudioPlatform
    }
}
