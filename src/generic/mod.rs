//! Heuristic stream discovery for arbitrary web resources

pub mod rules;

use reqwest::header::HeaderMap;
use scraper::{Html, Selector};
use tracing::{debug, info};
use url::Url;

use crate::core::{
    EXTRACTION_EXTENSIONS, Extraction, Extractor, Metadata, SourceKind, StreamCandidate,
    has_supported_extension,
};
use crate::download::HttpClient;
use crate::error::Result;
use crate::utils::{basename, collapse_whitespace};
use crate::youtube::is_youtube_url;
use rules::{RULES, apply_rules};

/// Extractor for pages, podcast hosts and raw radio streams
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericExtractor;

#[async_trait::async_trait]
impl Extractor for GenericExtractor {
    fn matches(&self, url: &str) -> bool {
        !is_youtube_url(url)
    }

    async fn extract(&self, http: &HttpClient, url: &str) -> Result<Extraction> {
        // A stream URL is its own candidate; live streams never end, so never read them.
        if has_supported_extension(url, EXTRACTION_EXTENSIONS) {
            debug!(url, "reference is a direct stream");
            return Ok(Extraction {
                candidates: vec![StreamCandidate::new(url)],
                metadata: Metadata {
                    title: direct_stream_title(url),
                    ..Default::default()
                },
            });
        }

        let html = http.download_text(url, HeaderMap::new()).await?;
        let candidates = match apply_rules(&RULES, &html) {
            Some((rule, found)) => {
                info!(url, rule = rule.name, count = found.len(), "streams found");
                found
                    .into_iter()
                    .map(|candidate| StreamCandidate::new(absolutize(url, &candidate)))
                    .collect()
            }
            None => {
                info!(url, "no stream found in page");
                Vec::new()
            }
        };

        Ok(Extraction {
            candidates,
            metadata: Metadata {
                title: page_title(&html),
                ..Default::default()
            },
        })
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Generic
    }
}

/// Text of the page's `<title>`, without pipes and with whitespace collapsed
pub fn page_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("title").ok()?;
    let raw: String = document.select(&selector).next()?.text().collect();
    let title = collapse_whitespace(&raw.replace('|', " "));
    (!title.is_empty()).then_some(title)
}

/// Resolve a candidate found in a page against the page URL
fn absolutize(page_url: &str, candidate: &str) -> String {
    match Url::parse(candidate) {
        Ok(_) => candidate.to_string(),
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(page_url)
            .and_then(|base| base.join(candidate))
            .map(|joined| joined.to_string())
            .unwrap_or_else(|_| candidate.to_string()),
        Err(_) => candidate.to_string(),
    }
}

fn direct_stream_title(url: &str) -> Option<String> {
    let name = basename(url);
    let stem = name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name);
    (!stem.is_empty()).then(|| stem.to_string())
}
