//! Playback sessions over the media backend

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::backend::{
    MediaBackend, MediaPlayer, MediaSource, PlayerOptions, TimeChanged, TimeChangedCallback,
};
use crate::context::Context;
use crate::error::{MusicStreamError, Result};
use crate::stream_data::StreamData;
use crate::wait::BoundedWait;

/// Extensions [`LocalAudio`] accepts
pub const LOCAL_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg"];

/// Receives `(current_time_seconds, position_fraction)` on every backend
/// time tick. Runs on the backend's event thread.
pub type ElapsedCallback = Arc<dyn Fn(f64, f64) + Send + Sync>;

/// Controls shared by every playable item
#[async_trait::async_trait]
pub trait Audio: Send {
    /// Start playback, seeking to `start_secs` when it is positive
    async fn play(&mut self, start_secs: f64) -> Result<()>;

    fn pause(&mut self);

    fn unpause(&mut self);

    fn stop(&mut self);

    fn skip_forward(&mut self, seconds: f64);

    fn skip_backward(&mut self, seconds: f64);

    fn set_rate(&mut self, rate: f64);

    async fn set_loop(&mut self, enabled: bool) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Playing,
    Paused,
    Stopped,
}

/// Position of the session, written from the backend's event thread
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Timeline {
    pub position_secs: f64,
    pub fraction: f64,
    pub duration_secs: Option<f64>,
}

/// One playback session. Owns at most one live backend player.
pub struct PlaybackController {
    backend: Arc<dyn MediaBackend>,
    wait: BoundedWait,
    url: String,
    handle: Option<Box<dyn MediaPlayer>>,
    state: PlaybackState,
    looping: bool,
    rate: f64,
    volume: u8,
    muted: bool,
    timeline: Arc<Mutex<Timeline>>,
    on_elapsed: Option<ElapsedCallback>,
}

impl PlaybackController {
    pub fn new(ctx: &Context, url: impl Into<String>) -> Self {
        Self {
            backend: ctx.backend().clone(),
            wait: ctx.config().wait,
            url: url.into(),
            handle: None,
            state: PlaybackState::Idle,
            looping: false,
            rate: 1.0,
            volume: 100,
            muted: false,
            timeline: Arc::new(Mutex::new(Timeline::default())),
            on_elapsed: None,
        }
    }

    /// Session on the registry's default stream, with its known duration
    pub fn for_stream_data(ctx: &Context, data: &StreamData) -> Option<Self> {
        let stream = data.default_stream()?;
        let controller = Self::new(ctx, stream.url.clone());
        if let Some(duration) = data.duration {
            controller.update_timeline(|t| t.duration_secs = Some(duration as f64));
        }
        Some(controller)
    }

    pub fn with_elapsed_callback(mut self, callback: ElapsedCallback) -> Self {
        self.on_elapsed = Some(callback);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn has_handle(&self) -> bool {
        self.handle.is_some()
    }

    pub fn timeline(&self) -> Timeline {
        self.timeline.lock().map(|t| *t).unwrap_or_default()
    }

    /// Current backend time in seconds
    pub fn current_time(&self) -> Option<f64> {
        self.handle.as_ref().map(|h| h.time_ms() as f64 / 1000.0)
    }

    /// Whether the backend is still playing the media
    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| h.is_playing())
    }

    fn update_timeline(&self, f: impl FnOnce(&mut Timeline)) {
        if let Ok(mut timeline) = self.timeline.lock() {
            f(&mut timeline);
        }
    }

    /// Stop and drop the live player, if any
    fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.stop() {
                debug!(url = %self.url, error = %e, "stop on release failed");
            }
            drop(handle);
            debug!(url = %self.url, "player released");
        }
    }

    fn time_changed_callback(&self) -> TimeChangedCallback {
        let timeline = self.timeline.clone();
        let on_elapsed = self.on_elapsed.clone();
        Box::new(move |event: TimeChanged| {
            let seconds = event.time_ms as f64 / 1000.0;
            if let Ok(mut t) = timeline.lock() {
                t.position_secs = seconds;
                t.fraction = event.position;
            }
            if let Some(callback) = &on_elapsed {
                callback(seconds, event.position);
            }
        })
    }

    /// Switch the session to another stream and play it
    pub async fn play_stream(&mut self, url: impl Into<String>, start_secs: f64) -> Result<()> {
        self.release();
        self.url = url.into();
        self.update_timeline(|t| *t = Timeline::default());
        self.start(start_secs).await
    }

    async fn start(&mut self, start_secs: f64) -> Result<()> {
        // Never two live players: the old one goes before the new one exists.
        self.release();

        match self.open(start_secs).await {
            Ok(player) => {
                self.handle = Some(player);
                self.state = PlaybackState::Playing;
                info!(url = %self.url, start_secs, looping = self.looping, "playback started");
                Ok(())
            }
            Err(e) => {
                self.state = PlaybackState::Idle;
                Err(e)
            }
        }
    }

    /// A started and configured player for the current url. A player that
    /// fails any step is stopped before the error is returned.
    async fn open(&mut self, start_secs: f64) -> Result<Box<dyn MediaPlayer>> {
        let player = self.backend.create_player(PlayerOptions {
            muted: self.muted,
            looping: self.looping,
        })?;
        if let Err(e) = self.configure(player.as_ref(), start_secs).await {
            if let Err(stop_err) = player.stop() {
                debug!(url = %self.url, error = %stop_err, "stop after failed start failed");
            }
            return Err(e);
        }
        Ok(player)
    }

    async fn configure(&mut self, player: &dyn MediaPlayer, start_secs: f64) -> Result<()> {
        let source = MediaSource::for_stream(&self.url);
        player.set_media(&source)?;
        player.on_time_changed(self.time_changed_callback());
        player.play()?;

        let started = self.wait.wait_while(|| !player.is_playing()).await;
        let backend_state = player.state();
        if !started || backend_state.is_failed() {
            warn!(url = %self.url, ?backend_state, "playback did not start");
            return Err(MusicStreamError::PlaybackNotStarted(backend_state));
        }

        if start_secs > 0.0 {
            player.set_time_ms((start_secs * 1000.0) as i64)?;
        }
        if self.rate != 1.0 {
            player.set_rate(self.rate)?;
        }
        if self.volume != 100 {
            player.set_volume(self.volume)?;
        }

        if !matches!(source, MediaSource::List(_))
            && let Some(length_ms) = player.length_ms().filter(|ms| *ms > 0)
        {
            self.update_timeline(|t| t.duration_secs = Some(length_ms as f64 / 1000.0));
        }
        Ok(())
    }

    pub fn set_volume(&mut self, volume: u8) {
        self.volume = volume.min(100);
        if let Some(handle) = &self.handle
            && let Err(e) = handle.set_volume(self.volume)
        {
            warn!(error = %e, "set volume failed");
        }
    }

    pub fn toggle_mute(&mut self) {
        self.muted = !self.muted;
        if let Some(handle) = &self.handle
            && let Err(e) = handle.set_muted(self.muted)
        {
            warn!(error = %e, "set mute failed");
        }
    }

    fn seek_by(&mut self, delta_ms: i64) {
        let Some(handle) = &self.handle else {
            return;
        };
        let target = handle.time_ms() + delta_ms;
        // Out of range targets are clamped by the backend.
        if let Err(e) = handle.set_time_ms(target) {
            warn!(target, error = %e, "seek failed");
        }
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.release();
    }
}

#[async_trait::async_trait]
impl Audio for PlaybackController {
    async fn play(&mut self, start_secs: f64) -> Result<()> {
        self.start(start_secs).await
    }

    fn pause(&mut self) {
        let Some(handle) = &self.handle else {
            return;
        };
        match handle.pause() {
            Ok(()) => self.state = PlaybackState::Paused,
            Err(e) => warn!(error = %e, "pause failed"),
        }
    }

    fn unpause(&mut self) {
        let Some(handle) = &self.handle else {
            return;
        };
        match handle.play() {
            Ok(()) => self.state = PlaybackState::Playing,
            Err(e) => warn!(error = %e, "unpause failed"),
        }
    }

    fn stop(&mut self) {
        if self.handle.is_none() {
            return;
        }
        self.release();
        self.state = PlaybackState::Stopped;
    }

    fn skip_forward(&mut self, seconds: f64) {
        self.seek_by((seconds * 1000.0) as i64);
    }

    fn skip_backward(&mut self, seconds: f64) {
        self.seek_by(-((seconds * 1000.0) as i64));
    }

    fn set_rate(&mut self, rate: f64) {
        self.rate = rate;
        if let Some(handle) = &self.handle
            && let Err(e) = handle.set_rate(rate)
        {
            warn!(rate, error = %e, "set rate failed");
        }
    }

    /// Looping is fixed when a player is created, so enabling it rebuilds the
    /// player at the current position. Disabling clears the directive on the
    /// live player.
    async fn set_loop(&mut self, enabled: bool) -> Result<()> {
        if enabled == self.looping {
            return Ok(());
        }
        self.looping = enabled;

        let Some(handle) = &self.handle else {
            return Ok(());
        };
        if !enabled {
            return handle.set_repeat(false);
        }

        let resume_at = handle.time_ms() as f64 / 1000.0;
        debug!(url = %self.url, resume_at, "rebuilding player with loop");
        self.start(resume_at).await
    }
}

/// A track stored on disk, played through the same backend
pub struct LocalAudio {
    pub path: PathBuf,
    pub title: String,
    controller: PlaybackController,
}

impl LocalAudio {
    pub fn new(ctx: &Context, path: impl AsRef<Path>, title: Option<String>) -> Result<Self> {
        let path = path.as_ref();
        let supported = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| LOCAL_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
        if !supported || !path.is_file() {
            return Err(MusicStreamError::UnsupportedFile(path.display().to_string()));
        }

        let title = title.unwrap_or_else(|| {
            path.file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default()
        });
        Ok(Self {
            path: path.to_path_buf(),
            title,
            controller: PlaybackController::new(ctx, path.to_string_lossy().into_owned()),
        })
    }

    pub fn controller(&self) -> &PlaybackController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut PlaybackController {
        &mut self.controller
    }
}

#[async_trait::async_trait]
impl Audio for LocalAudio {
    async fn play(&mut self, start_secs: f64) -> Result<()> {
        self.controller.play(start_secs).await
    }

    fn pause(&mut self) {
        self.controller.pause();
    }

    fn unpause(&mut self) {
        self.controller.unpause();
    }

    fn stop(&mut self) {
        self.controller.stop();
    }

    fn skip_forward(&mut self, seconds: f64) {
        self.controller.skip_forward(seconds);
    }

    fn skip_backward(&mut self, seconds: f64) {
        self.controller.skip_backward(seconds);
    }

    fn set_rate(&mut self, rate: f64) {
        self.controller.set_rate(rate);
    }

    async fn set_loop(&mut self, enabled: bool) -> Result<()> {
        self.controller.set_loop(enabled).await
    }
}

/// Next queue index, wrapping to the start after the last item
pub fn next_index(index: usize, len: usize) -> usize {
    if index + 1 >= len { 0 } else { index + 1 }
}

/// Previous queue index, staying at the first item
pub fn previous_index(index: usize) -> usize {
    index.saturating_sub(1)
}
