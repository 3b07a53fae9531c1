use serde::{Deserialize, Serialize};

/// Subset of the innertube `player` response the extractor reads
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerResponse {
    pub playability_status: Option<PlayabilityStatus>,
    pub streaming_data: Option<StreamingData>,
    pub video_details: Option<VideoDetails>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayabilityStatus {
    pub status: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoDetails {
    pub video_id: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    /// Reported as a decimal string
    pub length_seconds: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingData {
    #[serde(default)]
    pub formats: Vec<Format>,
    #[serde(default)]
    pub adaptive_formats: Vec<Format>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Format {
    pub itag: u64,
    pub mime_type: String,
    pub bitrate: Option<u64>,
    pub content_length: Option<String>,
    pub audio_quality: Option<String>,
    /// Absent for ciphered formats
    pub url: Option<String>,
}

impl Format {
    pub fn is_audio(&self) -> bool {
        self.mime_type.starts_with("audio/")
    }
}

/// Values scraped from the watch page's `ytcfg.set(...)` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YtConfig {
    pub api_key: String,
    pub visitor_data: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InnertubeRequest {
    pub video_id: String,
    pub context: InnertubeContext,
    pub playback_context: PlaybackContext,
    pub content_check_ok: bool,
    pub racy_check_ok: bool,
}

#[derive(Debug, Serialize)]
pub struct InnertubeContext {
    pub client: ClientInfo,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub client_name: String,
    pub client_version: String,
    pub user_agent: String,
    pub os_name: String,
    pub os_version: String,
    pub hl: String,
    pub time_zone: String,
    pub utc_offset_minutes: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackContext {
    pub content_playback_context: ContentPlaybackContext,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentPlaybackContext {
    pub html5_preference: String,
}
