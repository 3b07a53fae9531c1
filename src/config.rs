use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{MusicStreamError, Result};
use crate::wait::BoundedWait;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/143.0.0.0 Safari/537.36";
pub const DEFAULT_YOUTUBE_BASE_URL: &str = "https://www.youtube.com";

/// HTTP client settings shared by extraction, origin lookup and downloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub user_agent: String,
    /// Skip TLS certificate validation (many radio hosts serve broken chains)
    pub accept_invalid_certs: bool,
    pub max_redirects: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 600,
            connect_timeout_secs: 30,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_invalid_certs: false,
            max_redirects: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub http: HttpConfig,
    pub wait: BoundedWait,
    pub download_dir: PathBuf,
    pub ffmpeg_path: String,
    pub mpv_path: String,
    pub youtube_base_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            wait: BoundedWait::default(),
            download_dir: Path::new("data").join("tracks"),
            ffmpeg_path: "ffmpeg".to_string(),
            mpv_path: "mpv".to_string(),
            youtube_base_url: DEFAULT_YOUTUBE_BASE_URL.to_string(),
        }
    }
}

impl Config {
    /// Load a JSON config file; missing keys keep their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| {
            MusicStreamError::ConfigParseError(format!("{}: {}", path.display(), e))
        })
    }
}
