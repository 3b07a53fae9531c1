//! Media backend boundary
//!
//! The crate never decodes audio itself. A [`MediaBackend`] constructs
//! [`MediaPlayer`] instances; construction-time options (mute, loop) are
//! fixed for the life of a player, everything else is a runtime control.

use serde::{Deserialize, Serialize};

use crate::core::is_stream_playlist;
use crate::error::{MusicStreamError, Result};

#[cfg(all(feature = "mpv", unix))]
pub mod mpv;

#[cfg(test)]
pub(crate) mod testing;

/// Coarse player state as reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerState {
    Idle,
    Opening,
    Playing,
    Paused,
    Stopped,
    Ended,
    Error,
}

impl PlayerState {
    /// States after which the media will not start playing on its own
    pub fn is_failed(&self) -> bool {
        matches!(self, PlayerState::Error | PlayerState::Ended)
    }
}

/// What a player is bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    /// A single media resource
    Single(String),
    /// A media list; playlist manifests are opened this way
    List(Vec<String>),
}

impl MediaSource {
    /// Bind a stream URL, choosing list handling for playlist manifests
    pub fn for_stream(url: &str) -> Self {
        if is_stream_playlist(url) {
            MediaSource::List(vec![url.to_string()])
        } else {
            MediaSource::Single(url.to_string())
        }
    }
}

/// Construction-time player options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayerOptions {
    pub muted: bool,
    /// Repeat the media indefinitely
    pub looping: bool,
}

/// Payload of a time-changed event
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeChanged {
    pub time_ms: i64,
    /// Playback position as a fraction of the media length (0..1)
    pub position: f64,
}

/// Invoked on the backend's own event thread
pub type TimeChangedCallback = Box<dyn Fn(TimeChanged) + Send + Sync>;

/// Factory for player instances
pub trait MediaBackend: Send + Sync {
    fn create_player(&self, options: PlayerOptions) -> Result<Box<dyn MediaPlayer>>;
}

/// Backend for builds without a media player; every player request fails
#[derive(Debug, Clone, Copy, Default)]
pub struct Unavailable;

impl MediaBackend for Unavailable {
    fn create_player(&self, _options: PlayerOptions) -> Result<Box<dyn MediaPlayer>> {
        Err(MusicStreamError::BackendError(
            "no media backend in this build".to_string(),
        ))
    }
}

/// One live player instance. Dropping it releases the backend resources.
pub trait MediaPlayer: Send + Sync {
    fn set_media(&self, source: &MediaSource) -> Result<()>;

    fn play(&self) -> Result<()>;

    fn pause(&self) -> Result<()>;

    fn stop(&self) -> Result<()>;

    fn is_playing(&self) -> bool;

    fn state(&self) -> PlayerState;

    /// Current playback time in milliseconds
    fn time_ms(&self) -> i64;

    /// Seek to an absolute time; the backend clamps out-of-range values
    fn set_time_ms(&self, time_ms: i64) -> Result<()>;

    /// Media length in milliseconds, `None` for live or unknown media
    fn length_ms(&self) -> Option<i64>;

    /// Playback position as a fraction (0..1)
    fn position(&self) -> f64;

    fn rate(&self) -> f64;

    fn set_rate(&self, rate: f64) -> Result<()>;

    /// Volume in percent (0..=100)
    fn volume(&self) -> u8;

    fn set_volume(&self, volume: u8) -> Result<()>;

    fn is_muted(&self) -> bool;

    fn set_muted(&self, muted: bool) -> Result<()>;

    /// Clear or set the repeat directive on a live player
    fn set_repeat(&self, looping: bool) -> Result<()>;

    fn on_time_changed(&self, callback: TimeChangedCallback);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_source_for_stream() {
        assert_eq!(
            MediaSource::for_stream("http://h/tunein-station.m3u?id=1"),
            MediaSource::List(vec!["http://h/tunein-station.m3u?id=1".to_string()])
        );
        assert_eq!(
            MediaSource::for_stream("http://h/live.aac"),
            MediaSource::Single("http://h/live.aac".to_string())
        );
    }

    #[test]
    fn test_unavailable_backend() {
        assert!(matches!(
            Unavailable.create_player(PlayerOptions::default()),
            Err(MusicStreamError::BackendError(_))
        ));
    }

    #[test]
    fn test_failed_states() {
        assert!(PlayerState::Error.is_failed());
        assert!(PlayerState::Ended.is_failed());
        assert!(!PlayerState::Opening.is_failed());
    }
}
