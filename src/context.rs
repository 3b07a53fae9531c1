use std::sync::Arc;

use crate::backend::MediaBackend;
use crate::config::Config;
use crate::core::{Extractor, SourceKind, classify};
use crate::download::HttpClient;
use crate::error::Result;
use crate::generic::GenericExtractor;
use crate::youtube::YoutubeExtractor;

/// Everything a resolution, playback or download needs, passed explicitly
pub struct Context {
    config: Config,
    http: HttpClient,
    backend: Arc<dyn MediaBackend>,
    youtube: YoutubeExtractor,
}

impl Context {
    pub fn new(config: Config, backend: Arc<dyn MediaBackend>) -> Result<Self> {
        let http = HttpClient::new(&config.http)?;
        let youtube = YoutubeExtractor::new(config.youtube_base_url.clone());
        Ok(Self {
            config,
            http,
            backend,
            youtube,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    pub fn backend(&self) -> &Arc<dyn MediaBackend> {
        &self.backend
    }

    /// Extractor serving the reference's category
    pub fn extractor_for(&self, reference: &str) -> &dyn Extractor {
        match classify(reference) {
            SourceKind::AudioPlatform => &self.youtube,
            SourceKind::Generic => &GenericExtractor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::{Behaviour, FakeBackend};

    #[test]
    fn test_extractor_for() {
        let ctx = Context::new(Config::default(), Arc::new(FakeBackend::new(Behaviour::Plays)))
            .unwrap();
        assert_eq!(
            ctx.extractor_for("https://youtu.be/wEGOxgfdRVc").kind(),
            SourceKind::AudioPlatform
        );
        assert_eq!(
            ctx.extractor_for("https://example.com/site/podcast/episode1").kind(),
            SourceKind::Generic
        );
    }
}
