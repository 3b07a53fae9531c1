use regex::Regex;
use reqwest::header::{CONTENT_TYPE, COOKIE, HeaderMap, HeaderValue, ORIGIN, RANGE, USER_AGENT};
use std::sync::LazyLock;
use tracing::{debug, info};

use crate::core::{AudioFormat, Extraction, Metadata, StreamCandidate};
use crate::download::HttpClient;
use crate::error::{MusicStreamError, Result};

use super::types::{
    ClientInfo, ContentPlaybackContext, Format, InnertubeContext, InnertubeRequest,
    PlaybackContext, PlayerResponse, YtConfig,
};
use super::utils::{ANDROID_USER_AGENT, WEB_USER_AGENT, build_watch_url, parse_id};

const INNERTUBE_CLIENT_NAME: &str = "ANDROID";
const INNERTUBE_CLIENT_VERSION: &str = "20.10.38";

static API_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""INNERTUBE_API_KEY"\s*:\s*"([^"]+)""#).expect("api key pattern")
});
static VISITOR_DATA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""VISITOR_DATA"\s*:\s*"([^"]+)""#).expect("visitor data pattern")
});

/// Fetch video page HTML
pub async fn fetch_video_page(http: &HttpClient, base_url: &str, video_id: &str) -> Result<String> {
    let url = build_watch_url(base_url, video_id);

    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(WEB_USER_AGENT));
    headers.insert(COOKIE, HeaderValue::from_static("CONSENT=YES+cb; SOCS=CAI"));

    http.download_text(&url, headers).await
}

/// Extract ytcfg configuration from HTML
pub fn extract_ytcfg_from_html(html: &str) -> Result<YtConfig> {
    let api_key = API_KEY_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| MusicStreamError::ParseError("Cannot find INNERTUBE_API_KEY".to_string()))?;

    let visitor_data = VISITOR_DATA_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());

    Ok(YtConfig {
        api_key,
        visitor_data,
    })
}

/// Fetch player response from the Android innertube client, which hands out
/// direct rendition URLs
pub async fn fetch_player_response(
    http: &HttpClient,
    base_url: &str,
    video_id: &str,
    ytcfg: &YtConfig,
) -> Result<PlayerResponse> {
    let base_url = base_url.trim_end_matches('/');
    let api_url = format!(
        "{}/youtubei/v1/player?key={}&prettyPrint=false",
        base_url, ytcfg.api_key
    );

    let request_body = InnertubeRequest {
        video_id: video_id.to_string(),
        context: InnertubeContext {
            client: ClientInfo {
                client_name: INNERTUBE_CLIENT_NAME.to_string(),
                client_version: INNERTUBE_CLIENT_VERSION.to_string(),
                user_agent: ANDROID_USER_AGENT.to_string(),
                os_name: "Android".to_string(),
                os_version: "11".to_string(),
                hl: "en".to_string(),
                time_zone: "UTC".to_string(),
                utc_offset_minutes: 0,
            },
        },
        playback_context: PlaybackContext {
            content_playback_context: ContentPlaybackContext {
                html5_preference: "HTML5_PREF_WANTS".to_string(),
            },
        },
        content_check_ok: true,
        racy_check_ok: true,
    };

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(USER_AGENT, HeaderValue::from_static(ANDROID_USER_AGENT));
    headers.insert("X-YouTube-Client-Name", HeaderValue::from_static("3"));
    headers.insert(
        "X-YouTube-Client-Version",
        HeaderValue::from_static(INNERTUBE_CLIENT_VERSION),
    );
    headers.insert(ORIGIN, HeaderValue::from_str(base_url)?);

    if let Some(vd) = ytcfg.visitor_data.as_deref()
        && let Ok(val) = HeaderValue::from_str(vd)
    {
        headers.insert("X-Goog-Visitor-Id", val);
    }

    let player_response: PlayerResponse = http.post_json(&api_url, &request_body, headers).await?;

    if let Some(status) = &player_response.playability_status
        && status.status != "OK"
    {
        let reason = status.reason.as_deref().unwrap_or("Unknown error");
        return Err(MusicStreamError::VideoUnavailable(format!(
            "{}: {}",
            video_id, reason
        )));
    }

    Ok(player_response)
}

/// Audio-only renditions with a direct URL, best bitrate first
pub fn extract_audio_formats(player_response: &PlayerResponse) -> Result<Vec<&Format>> {
    let streaming_data = player_response
        .streaming_data
        .as_ref()
        .ok_or(MusicStreamError::AudioNotFound)?;

    let mut formats: Vec<&Format> = streaming_data
        .adaptive_formats
        .iter()
        .filter(|f| f.is_audio() && f.url.is_some())
        .collect();

    if formats.is_empty() {
        return Err(MusicStreamError::AudioNotFound);
    }

    // Stable sort: equal bitrates keep the platform's order.
    formats.sort_by(|a, b| b.bitrate.cmp(&a.bitrate));
    Ok(formats)
}

/// Title, author and length as reported by the platform
pub fn extract_metadata(player_response: &PlayerResponse) -> Metadata {
    let Some(details) = &player_response.video_details else {
        return Metadata::default();
    };
    let title = details.title.clone();
    Metadata {
        album: title.clone(),
        title,
        artist: details.author.clone(),
        duration: details
            .length_seconds
            .as_deref()
            .and_then(|s| s.trim().parse().ok()),
    }
}

/// Resolve a video reference into its audio renditions
pub async fn extract_audio(http: &HttpClient, base_url: &str, url: &str) -> Result<Extraction> {
    let video_id = parse_id(url)?;
    let html = fetch_video_page(http, base_url, &video_id).await?;
    let ytcfg = extract_ytcfg_from_html(&html)?;
    debug!(video_id, has_visitor_data = ytcfg.visitor_data.is_some(), "ytcfg parsed");

    let player_response = fetch_player_response(http, base_url, &video_id, &ytcfg).await?;
    let formats = extract_audio_formats(&player_response)?;

    let candidates: Vec<StreamCandidate> = formats
        .into_iter()
        .filter_map(|f| {
            let url = f.url.as_deref()?;
            let mut candidate =
                StreamCandidate::new(url).with_format(AudioFormat::from_mime(&f.mime_type));
            if let Some(bitrate) = f.bitrate {
                candidate = candidate.with_bitrate(bitrate);
            }
            Some(candidate)
        })
        .collect();

    info!(video_id, renditions = candidates.len(), "audio renditions found");
    Ok(Extraction {
        candidates,
        metadata: extract_metadata(&player_response),
    })
}

/// Headers rendition URLs must be fetched with
pub fn download_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(ANDROID_USER_AGENT));
    headers.insert(RANGE, HeaderValue::from_static("bytes=0-"));
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAYER_RESPONSE: &str = r#"{
        "playabilityStatus": {"status": "OK"},
        "videoDetails": {"videoId": "wEGOxgfdRVc", "title": "Song", "author": "Band", "lengthSeconds": "215"},
        "streamingData": {
            "formats": [{"itag": 18, "mimeType": "video/mp4", "url": "https://r/18"}],
            "adaptiveFormats": [
                {"itag": 137, "mimeType": "video/mp4", "bitrate": 4000000, "url": "https://r/137"},
                {"itag": 139, "mimeType": "audio/mp4; codecs=\"mp4a.40.5\"", "bitrate": 48000, "url": "https://r/139"},
                {"itag": 251, "mimeType": "audio/webm; codecs=\"opus\"", "bitrate": 160000, "url": "https://r/251"},
                {"itag": 140, "mimeType": "audio/mp4; codecs=\"mp4a.40.2\"", "bitrate": 130000, "url": "https://r/140"},
                {"itag": 250, "mimeType": "audio/webm; codecs=\"opus\"", "bitrate": 70000, "signatureCipher": "s=x"}
            ]
        }
    }"#;

    #[test]
    fn test_extract_ytcfg() {
        let html = r#"<script>ytcfg.set({"INNERTUBE_API_KEY": "AIzaKey","VISITOR_DATA":"CgtWaXM%3D"});</script>"#;
        let cfg = extract_ytcfg_from_html(html).unwrap();
        assert_eq!(cfg.api_key, "AIzaKey");
        assert_eq!(cfg.visitor_data.as_deref(), Some("CgtWaXM%3D"));

        assert!(extract_ytcfg_from_html("<html></html>").is_err());
    }

    #[test]
    fn test_audio_formats_sorted_by_bitrate() {
        let response: PlayerResponse = serde_json::from_str(PLAYER_RESPONSE).unwrap();
        let itags: Vec<u64> = extract_audio_formats(&response)
            .unwrap()
            .iter()
            .map(|f| f.itag)
            .collect();
        assert_eq!(itags, [251, 140, 139]);
    }

    #[test]
    fn test_no_audio_formats() {
        let response: PlayerResponse =
            serde_json::from_str(r#"{"streamingData": {"adaptiveFormats": []}}"#).unwrap();
        assert!(matches!(
            extract_audio_formats(&response),
            Err(MusicStreamError::AudioNotFound)
        ));
        assert!(extract_audio_formats(&PlayerResponse::default()).is_err());
    }

    #[test]
    fn test_metadata() {
        let response: PlayerResponse = serde_json::from_str(PLAYER_RESPONSE).unwrap();
        let metadata = extract_metadata(&response);
        assert_eq!(metadata.title.as_deref(), Some("Song"));
        assert_eq!(metadata.artist.as_deref(), Some("Band"));
        assert_eq!(metadata.album.as_deref(), Some("Song"));
        assert_eq!(metadata.duration, Some(215));
    }
}
