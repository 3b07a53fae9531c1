use thiserror::Error;

use crate::backend::PlayerState;

#[derive(Error, Debug)]
pub enum MusicStreamError {
    #[error("Network request failed: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Request timeout for URL: {0}")]
    RequestTimeout(String),

    #[error("HTTP error {status} for URL: {url}")]
    HttpError { status: u16, url: String },

    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Audio stream not found")]
    AudioNotFound,

    #[error("Video not found or unavailable: {0}")]
    VideoUnavailable(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("External command failed: {0}")]
    CommandError(String),

    #[error("Invalid header value: {0}")]
    HeaderError(#[from] reqwest::header::InvalidHeaderValue),

    #[error("Config parse error: {0}")]
    ConfigParseError(String),

    #[error("Media backend failed: {0}")]
    BackendError(String),

    #[error("Playback did not start (backend state: {0:?})")]
    PlaybackNotStarted(PlayerState),

    #[error("Stream index {index} is out of range ({len} streams)")]
    StreamIndexOutOfRange { index: usize, len: usize },

    #[error("Unsupported local file: {0}")]
    UnsupportedFile(String),
}

pub type Result<T> = std::result::Result<T, MusicStreamError>;
