use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use super::{
    MediaBackend, MediaPlayer, MediaSource, PlayerOptions, PlayerState, TimeChanged,
    TimeChangedCallback,
};
use crate::error::{MusicStreamError, Result};

/// How fake players react to `play()`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    /// Start playing immediately
    Plays,
    /// Stay in `Opening` forever
    Hangs,
    /// Report `Error` right away
    Fails,
}

/// Recorded state of one fake player, shared with the test
pub struct FakeHandle {
    pub options: PlayerOptions,
    pub media: Mutex<Option<MediaSource>>,
    pub playing: AtomicBool,
    pub paused: AtomicBool,
    pub stopped: AtomicBool,
    pub released: AtomicBool,
    pub repeat: AtomicBool,
    pub muted: AtomicBool,
    pub time_ms: AtomicI64,
    pub volume: AtomicU8,
    pub rate: Mutex<f64>,
    pub state: Mutex<PlayerState>,
    callback: Mutex<Option<TimeChangedCallback>>,
    length_ms: Option<i64>,
    behaviour: Behaviour,
}

impl FakeHandle {
    /// Fire a time-changed event as the backend thread would
    pub fn tick(&self, time_ms: i64) {
        self.time_ms.store(time_ms, Ordering::SeqCst);
        let position = self
            .length_ms
            .map(|len| time_ms as f64 / len as f64)
            .unwrap_or(0.0);
        if let Some(callback) = self.callback.lock().unwrap().as_ref() {
            callback(TimeChanged { time_ms, position });
        }
    }

    pub fn is_live(&self) -> bool {
        !self.released.load(Ordering::SeqCst)
    }
}

/// Backend double recording every player it creates
pub struct FakeBackend {
    behaviour: Behaviour,
    length_ms: Option<i64>,
    player_limit: Option<usize>,
    created: Mutex<Vec<Arc<FakeHandle>>>,
}

impl FakeBackend {
    pub fn new(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            length_ms: Some(180_000),
            player_limit: None,
            created: Mutex::new(Vec::new()),
        }
    }

    pub fn with_length(mut self, length_ms: Option<i64>) -> Self {
        self.length_ms = length_ms;
        self
    }

    /// Refuse to create more than `limit` players
    pub fn with_player_limit(mut self, limit: usize) -> Self {
        self.player_limit = Some(limit);
        self
    }

    pub fn players(&self) -> Vec<Arc<FakeHandle>> {
        self.created.lock().unwrap().clone()
    }

    pub fn live_players(&self) -> usize {
        self.players().iter().filter(|p| p.is_live()).count()
    }
}

impl MediaBackend for FakeBackend {
    fn create_player(&self, options: PlayerOptions) -> Result<Box<dyn MediaPlayer>> {
        if let Some(limit) = self.player_limit
            && self.created.lock().unwrap().len() >= limit
        {
            return Err(MusicStreamError::BackendError(
                "player limit reached".to_string(),
            ));
        }
        let handle = Arc::new(FakeHandle {
            options,
            media: Mutex::new(None),
            playing: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            released: AtomicBool::new(false),
            repeat: AtomicBool::new(options.looping),
            muted: AtomicBool::new(options.muted),
            time_ms: AtomicI64::new(0),
            volume: AtomicU8::new(100),
            rate: Mutex::new(1.0),
            state: Mutex::new(PlayerState::Idle),
            callback: Mutex::new(None),
            length_ms: self.length_ms,
            behaviour: self.behaviour,
        });
        self.created.lock().unwrap().push(handle.clone());
        Ok(Box::new(FakePlayer(handle)))
    }
}

struct FakePlayer(Arc<FakeHandle>);

impl Drop for FakePlayer {
    fn drop(&mut self) {
        self.0.released.store(true, Ordering::SeqCst);
    }
}

impl MediaPlayer for FakePlayer {
    fn set_media(&self, source: &MediaSource) -> Result<()> {
        *self.0.media.lock().unwrap() = Some(source.clone());
        Ok(())
    }

    fn play(&self) -> Result<()> {
        let state = match self.0.behaviour {
            Behaviour::Plays => {
                self.0.playing.store(true, Ordering::SeqCst);
                self.0.paused.store(false, Ordering::SeqCst);
                PlayerState::Playing
            }
            Behaviour::Hangs => PlayerState::Opening,
            Behaviour::Fails => PlayerState::Error,
        };
        *self.0.state.lock().unwrap() = state;
        Ok(())
    }

    fn pause(&self) -> Result<()> {
        self.0.playing.store(false, Ordering::SeqCst);
        self.0.paused.store(true, Ordering::SeqCst);
        *self.0.state.lock().unwrap() = PlayerState::Paused;
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.0.playing.store(false, Ordering::SeqCst);
        self.0.stopped.store(true, Ordering::SeqCst);
        *self.0.state.lock().unwrap() = PlayerState::Stopped;
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.0.playing.load(Ordering::SeqCst)
    }

    fn state(&self) -> PlayerState {
        *self.0.state.lock().unwrap()
    }

    fn time_ms(&self) -> i64 {
        self.0.time_ms.load(Ordering::SeqCst)
    }

    fn set_time_ms(&self, time_ms: i64) -> Result<()> {
        let upper = self.0.length_ms.unwrap_or(i64::MAX);
        self.0.time_ms.store(time_ms.clamp(0, upper), Ordering::SeqCst);
        Ok(())
    }

    fn length_ms(&self) -> Option<i64> {
        self.0.length_ms
    }

    fn position(&self) -> f64 {
        self.0
            .length_ms
            .map(|len| self.time_ms() as f64 / len as f64)
            .unwrap_or(0.0)
    }

    fn rate(&self) -> f64 {
        *self.0.rate.lock().unwrap()
    }

    fn set_rate(&self, rate: f64) -> Result<()> {
        *self.0.rate.lock().unwrap() = rate;
        Ok(())
    }

    fn volume(&self) -> u8 {
        self.0.volume.load(Ordering::SeqCst)
    }

    fn set_volume(&self, volume: u8) -> Result<()> {
        self.0.volume.store(volume, Ordering::SeqCst);
        Ok(())
    }

    fn is_muted(&self) -> bool {
        self.0.muted.load(Ordering::SeqCst)
    }

    fn set_muted(&self, muted: bool) -> Result<()> {
        self.0.muted.store(muted, Ordering::SeqCst);
        Ok(())
    }

    fn set_repeat(&self, looping: bool) -> Result<()> {
        self.0.repeat.store(looping, Ordering::SeqCst);
        Ok(())
    }

    fn on_time_changed(&self, callback: TimeChangedCallback) {
        *self.0.callback.lock().unwrap() = Some(callback);
    }
}
