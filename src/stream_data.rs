//! Everything known about one resolved reference: its candidate streams,
//! the selected default and best-effort metadata.

use reqwest::header::HeaderMap;
use serde::Serialize;
use tracing::{info, warn};

use crate::context::Context;
use crate::core::{Metadata, SourceKind, StreamCandidate, classify};
use crate::downloader::download_stream;
use crate::error::{MusicStreamError, Result};
use crate::generic::page_title;
use crate::persistence::{LIKED_SONGS, NewTrack, TrackStore};
use crate::validator::{check_stream_validity, probe_duration};

pub const DEFAULT_STATION_TITLE: &str = "New Radio Station";
pub const UNKNOWN_ARTIST: &str = "Unknown";

/// What a registry was built from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SourceReference {
    Url(String),
    Overrides(Vec<String>),
}

#[derive(Debug, Clone, Serialize)]
pub struct StreamData {
    pub source_reference: SourceReference,
    pub kind: SourceKind,
    candidates: Vec<StreamCandidate>,
    default_index: usize,
    is_playlist: bool,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    /// Seconds; `None` for live streams, playlists and unprobed media
    pub duration: Option<u64>,
    /// Why resolution produced no candidates, when it failed
    pub resolution_error: Option<String>,
}

impl StreamData {
    fn new(source_reference: SourceReference, kind: SourceKind) -> Self {
        Self {
            source_reference,
            kind,
            candidates: Vec::new(),
            default_index: 0,
            is_playlist: false,
            title: None,
            artist: None,
            album: None,
            duration: None,
            resolution_error: None,
        }
    }

    /// Assemble a registry from already known streams and metadata
    pub fn from_parts(
        source_reference: SourceReference,
        kind: SourceKind,
        candidates: Vec<StreamCandidate>,
        metadata: Metadata,
    ) -> Self {
        let mut data = Self::new(source_reference, kind);
        data.candidates = candidates;
        data.select_default(0);
        data.title = metadata.title;
        data.artist = metadata.artist;
        data.album = metadata.album;
        data.duration = metadata.duration;
        data
    }

    /// Resolve a reference into its candidate streams.
    ///
    /// Never fails: fetch and extraction errors leave the registry empty and
    /// are kept in `resolution_error`.
    pub async fn resolve(ctx: &Context, reference: &str) -> Self {
        let kind = classify(reference);
        let mut data = Self::new(SourceReference::Url(reference.to_string()), kind);

        let extraction = match ctx.extractor_for(reference).extract(ctx.http(), reference).await {
            Ok(extraction) => extraction,
            Err(e) => {
                warn!(reference, error = %e, "resolution failed");
                data.resolution_error = Some(e.to_string());
                return data;
            }
        };

        data.candidates = extraction.candidates;
        data.select_default(0);
        let metadata = extraction.metadata;

        match kind {
            SourceKind::AudioPlatform => {
                data.title = metadata.title;
                data.artist = metadata.artist;
                data.album = metadata.album.or_else(|| data.title.clone());
                data.duration = metadata.duration;
            }
            SourceKind::Generic => {
                data.title = metadata.title;
                data.artist = Some(UNKNOWN_ARTIST.to_string());
                data.album = data.title.clone();
                if let Some(stream) = data.default_stream() {
                    let url = stream.url.clone();
                    data.duration = probe_duration(ctx, &url).await;
                }
            }
        }

        info!(
            reference,
            ?kind,
            candidates = data.candidates.len(),
            title = data.title.as_deref().unwrap_or(""),
            "reference resolved"
        );
        data
    }

    /// Build a registry from explicit stream URLs.
    ///
    /// The list is kept only when its first stream validates. The title comes
    /// from the station page the stream advertises, then `title_override`,
    /// then a generic station name.
    pub async fn from_streams(
        ctx: &Context,
        streams: Vec<String>,
        title_override: Option<&str>,
    ) -> Self {
        let mut data = Self::new(
            SourceReference::Overrides(streams.clone()),
            SourceKind::Generic,
        );

        if let Some(first) = streams.first()
            && check_stream_validity(ctx, first).await.valid
        {
            data.candidates = streams.into_iter().map(StreamCandidate::new).collect();
            data.select_default(0);
        } else {
            warn!("override streams rejected");
        }

        let recovered = match data.default_stream() {
            Some(stream) => {
                let url = stream.url.clone();
                station_title(ctx, &url).await
            }
            None => None,
        };
        data.title = recovered
            .or_else(|| title_override.map(str::to_string))
            .or_else(|| Some(DEFAULT_STATION_TITLE.to_string()));
        data
    }

    pub fn candidates(&self) -> &[StreamCandidate] {
        &self.candidates
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn default_index(&self) -> usize {
        self.default_index
    }

    pub fn is_playlist(&self) -> bool {
        self.is_playlist
    }

    pub fn default_stream(&self) -> Option<&StreamCandidate> {
        self.candidates.get(self.default_index)
    }

    fn select_default(&mut self, index: usize) {
        self.default_index = index;
        self.is_playlist = self
            .candidates
            .get(index)
            .is_some_and(StreamCandidate::is_playlist);
    }

    /// Select the stream used for playback and download.
    ///
    /// An out-of-range index is a caller error and changes nothing.
    pub fn set_default_stream(&mut self, index: usize) -> Result<()> {
        if index >= self.candidates.len() {
            return Err(MusicStreamError::StreamIndexOutOfRange {
                index,
                len: self.candidates.len(),
            });
        }
        self.select_default(index);
        Ok(())
    }

    /// Validate `url` and add it, first and selected when `make_default`,
    /// otherwise last. Returns the new index, or `None` when the stream was
    /// rejected.
    pub async fn add_stream_manual(
        &mut self,
        ctx: &Context,
        url: &str,
        make_default: bool,
    ) -> Option<usize> {
        if !check_stream_validity(ctx, url).await.valid {
            warn!(url, "could not add stream");
            return None;
        }

        if make_default {
            self.candidates.insert(0, StreamCandidate::new(url));
            self.select_default(0);
            Some(0)
        } else {
            self.candidates.push(StreamCandidate::new(url));
            if self.candidates.len() == 1 {
                self.select_default(0);
            }
            Some(self.candidates.len() - 1)
        }
    }

    /// Average bitrate of each rendition, in candidate order (platform sources only)
    pub fn stream_bitrates(&self) -> Option<Vec<u64>> {
        if self.kind != SourceKind::AudioPlatform || self.candidates.is_empty() {
            return None;
        }
        Some(
            self.candidates
                .iter()
                .map(|c| c.bitrate.unwrap_or_default())
                .collect(),
        )
    }

    /// Reference to persist for this track. Platform rendition URLs expire,
    /// so those sources store the page URL.
    pub fn stream_reference(&self) -> Option<String> {
        match (&self.kind, &self.source_reference) {
            (SourceKind::AudioPlatform, SourceReference::Url(url)) => Some(url.clone()),
            _ => self.default_stream().map(|s| s.url.clone()),
        }
    }

    /// Create a track for this registry in `playlist_name`, downloading it
    /// when the playlist is kept on disk. Returns the track id.
    pub async fn add_to_playlist(
        &self,
        ctx: &Context,
        store: &mut dyn TrackStore,
        playlist_name: &str,
    ) -> Result<u64> {
        let stream_url = self
            .stream_reference()
            .ok_or(MusicStreamError::AudioNotFound)?;
        let playlist = store.get_or_create_playlist(playlist_name)?;

        let title = self
            .title
            .clone()
            .unwrap_or_else(|| DEFAULT_STATION_TITLE.to_string());
        let track = NewTrack {
            album: self.album.clone().unwrap_or_else(|| title.clone()),
            artist: self
                .artist
                .clone()
                .unwrap_or_else(|| UNKNOWN_ARTIST.to_string()),
            title,
            duration: self.duration,
            stream_url,
        };
        let track_id = store.create_and_add_track(track, playlist.id)?;
        info!(playlist = playlist_name, track_id, "track added");

        if playlist.downloaded {
            match download_stream(ctx, self, None, false).await {
                Ok(Some(path)) => store.set_track_path(track_id, &path)?,
                Ok(None) => warn!(track_id, "track could not be downloaded"),
                Err(e) => warn!(track_id, error = %e, "track download failed"),
            }
        }
        Ok(track_id)
    }

    pub async fn add_to_liked_songs(&self, ctx: &Context, store: &mut dyn TrackStore) -> Result<u64> {
        self.add_to_playlist(ctx, store, LIKED_SONGS).await
    }
}

/// Title of the page a raw stream advertises through its `icy-url` header
async fn station_title(ctx: &Context, stream_url: &str) -> Option<String> {
    let origin = match ctx.http().origin_url(stream_url).await {
        Ok(Some(origin)) => origin,
        Ok(None) => return None,
        Err(e) => {
            warn!(stream_url, error = %e, "origin lookup failed");
            return None;
        }
    };
    match ctx.http().download_text(&origin, HeaderMap::new()).await {
        Ok(html) => page_title(&html),
        Err(e) => {
            warn!(origin, error = %e, "station page fetch failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::{Behaviour, FakeBackend};
    use crate::config::Config;
    use crate::persistence::MemoryStore;
    use crate::wait::BoundedWait;
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn context(behaviour: Behaviour) -> Context {
        let config = Config {
            wait: BoundedWait::new(Duration::from_millis(50), 5),
            ..Default::default()
        };
        Context::new(config, Arc::new(FakeBackend::new(behaviour))).unwrap()
    }

    fn with_streams(urls: &[&str]) -> StreamData {
        let mut data = StreamData::new(
            SourceReference::Url("https://example.com/station".to_string()),
            SourceKind::Generic,
        );
        data.candidates = urls.iter().map(|u| StreamCandidate::new(*u)).collect();
        data.select_default(0);
        data
    }

    #[tokio::test]
    async fn test_resolve_page_with_stream_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/site/podcast/episode1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><title>Episode | Pod</title><script>{"streamURL":"https://x/a.mp3"}</script></html>"#,
            ))
            .mount(&server)
            .await;

        let ctx = context(Behaviour::Plays);
        let data =
            StreamData::resolve(&ctx, &format!("{}/site/podcast/episode1", server.uri())).await;

        let urls: Vec<_> = data.candidates().iter().map(|c| c.url.as_str()).collect();
        assert_eq!(urls, ["https://x/a.mp3"]);
        assert!(!data.is_playlist());
        assert_eq!(data.kind, SourceKind::Generic);
        assert_eq!(data.title.as_deref(), Some("Episode Pod"));
        assert_eq!(data.album, data.title);
        assert_eq!(data.artist.as_deref(), Some(UNKNOWN_ARTIST));
        assert_eq!(data.duration, Some(180));
        assert_eq!(data.stream_bitrates(), None);
    }

    #[tokio::test]
    async fn test_resolve_failure_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let data = StreamData::resolve(&context(Behaviour::Plays), &server.uri()).await;
        assert!(data.is_empty());
        assert!(data.default_stream().is_none());
        assert!(data.resolution_error.is_some());
        assert_eq!(data.stream_reference(), None);
    }

    #[test]
    fn test_set_default_stream() {
        let mut data = with_streams(&["https://x/a.mp3", "https://x/b.pls", "https://x/c.aac"]);
        data.set_default_stream(1).unwrap();
        assert_eq!(data.default_index(), 1);
        assert!(data.is_playlist());

        let before: Vec<_> = data.candidates().to_vec();
        let err = data.set_default_stream(3).unwrap_err();
        assert!(matches!(
            err,
            MusicStreamError::StreamIndexOutOfRange { index: 3, len: 3 }
        ));
        assert_eq!(data.candidates(), before.as_slice());
        assert_eq!(data.default_index(), 1);
        assert!(data.is_playlist());
    }

    #[tokio::test]
    async fn test_add_stream_manual() {
        let ctx = context(Behaviour::Plays);
        let mut data = with_streams(&["file:///s/a.mp3"]);

        assert_eq!(
            data.add_stream_manual(&ctx, "file:///s/b.m3u", true).await,
            Some(0)
        );
        assert_eq!(data.default_stream().unwrap().url, "file:///s/b.m3u");
        assert!(data.is_playlist());

        assert_eq!(
            data.add_stream_manual(&ctx, "file:///s/a.mp3", false).await,
            Some(2)
        );
        assert_eq!(data.candidates().len(), 3);
        assert_eq!(data.default_index(), 0);
    }

    #[tokio::test]
    async fn test_add_invalid_stream_is_noop() {
        let ctx = context(Behaviour::Fails);
        let mut data = with_streams(&["file:///s/a.mp3"]);

        assert_eq!(data.add_stream_manual(&ctx, "file:///s/bad.mp3", true).await, None);
        assert_eq!(data.candidates().len(), 1);
        assert_eq!(data.default_stream().unwrap().url, "file:///s/a.mp3");
    }

    #[tokio::test]
    async fn test_from_streams_recovers_station_title() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/live.mp3"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("icy-url", format!("{}/home", server.uri()).as_str())
                    .set_body_bytes(vec![0u8; 64]),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/home"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("<title>  Radio   One </title>"),
            )
            .mount(&server)
            .await;

        let live = format!("{}/live.mp3", server.uri());
        let data = StreamData::from_streams(
            &context(Behaviour::Plays),
            vec![live.clone(), "https://x/backup.aac".to_string()],
            Some("Ignored"),
        )
        .await;

        assert_eq!(data.candidates().len(), 2);
        assert_eq!(data.default_stream().unwrap().url, live);
        assert_eq!(data.title.as_deref(), Some("Radio One"));
    }

    #[tokio::test]
    async fn test_from_streams_rejected_falls_back_to_titles() {
        let ctx = context(Behaviour::Fails);
        let streams = vec!["file:///s/dead.mp3".to_string()];

        let named = StreamData::from_streams(&ctx, streams.clone(), Some("My Station")).await;
        assert!(named.is_empty());
        assert_eq!(named.title.as_deref(), Some("My Station"));

        let unnamed = StreamData::from_streams(&ctx, streams, None).await;
        assert_eq!(unnamed.title.as_deref(), Some(DEFAULT_STATION_TITLE));
    }

    #[tokio::test]
    async fn test_add_to_playlist() {
        let ctx = context(Behaviour::Plays);
        let mut store = MemoryStore::new();
        let mut data = with_streams(&["https://x/a.mp3"]);
        data.title = Some("Morning".to_string());

        let id = data.add_to_liked_songs(&ctx, &mut store).await.unwrap();
        let record = store.track(id).unwrap();
        assert_eq!(record.track.title, "Morning");
        assert_eq!(record.track.album, "Morning");
        assert_eq!(record.track.artist, UNKNOWN_ARTIST);
        assert_eq!(record.track.stream_url, "https://x/a.mp3");
        assert_eq!(record.path, None);
        assert!(store.playlist(LIKED_SONGS).is_some());
    }

    #[tokio::test]
    async fn test_downloaded_playlist_records_track_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ep1.mp3"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 256]))
            .expect(1)
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            download_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let ctx = Context::new(config, Arc::new(FakeBackend::new(Behaviour::Plays))).unwrap();
        let mut store = MemoryStore::new();
        store.set_downloaded("Offline", true).unwrap();

        let url = format!("{}/ep1.mp3", server.uri());
        let mut data = with_streams(&[url.as_str()]);
        data.title = Some("Episode 1".to_string());

        let id = data.add_to_playlist(&ctx, &mut store, "Offline").await.unwrap();
        let record = store.track(id).unwrap();
        let expected = dir.path().join("Episode 1.mp3");
        assert_eq!(record.path.as_deref(), Some(expected.as_path()));
        assert_eq!(std::fs::read(&expected).unwrap(), vec![7u8; 256]);
        let playlist_id = store.playlist("Offline").unwrap().id;
        assert_eq!(store.tracks_in(playlist_id).count(), 1);
    }

    #[tokio::test]
    async fn test_undownloadable_track_is_kept_without_path() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            download_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let ctx = Context::new(config, Arc::new(FakeBackend::new(Behaviour::Plays))).unwrap();
        let mut store = MemoryStore::new();
        store.set_downloaded("Offline", true).unwrap();

        let mut data = with_streams(&["https://x/station.pls"]);
        data.title = Some("Radio".to_string());

        let id = data.add_to_playlist(&ctx, &mut store, "Offline").await.unwrap();
        let record = store.track(id).unwrap();
        assert_eq!(record.track.stream_url, "https://x/station.pls");
        assert_eq!(record.path, None);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_platform_stream_reference_is_page() {
        let mut data = with_streams(&["https://r/251", "https://r/140"]);
        data.kind = SourceKind::AudioPlatform;
        data.source_reference =
            SourceReference::Url("https://www.youtube.com/watch?v=wEGOxgfdRVc".to_string());
        data.candidates = vec![
            StreamCandidate::new("https://r/251").with_bitrate(160_000),
            StreamCandidate::new("https://r/140").with_bitrate(130_000),
        ];

        assert_eq!(
            data.stream_reference().as_deref(),
            Some("https://www.youtube.com/watch?v=wEGOxgfdRVc")
        );
        assert_eq!(data.stream_bitrates(), Some(vec![160_000, 130_000]));
    }
}
