//! mpv backend driven over its JSON IPC socket.
//!
//! Every player is its own `mpv --idle` process. Property observation keeps a
//! local cache of time, position, duration and pause state up to date; the
//! reader thread also fires the time-changed callback.

use crossbeam_channel::{Receiver, Sender};
use serde_json::{Value, json};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::{
    MediaBackend, MediaPlayer, MediaSource, PlayerOptions, PlayerState, TimeChanged,
    TimeChangedCallback,
};
use crate::error::{MusicStreamError, Result};
use crate::wait::BoundedWait;

const REPLY_TIMEOUT: Duration = Duration::from_secs(2);

const OBS_TIME_POS: u64 = 1;
const OBS_PERCENT_POS: u64 = 2;
const OBS_DURATION: u64 = 3;
const OBS_PAUSE: u64 = 4;
const OBS_CORE_IDLE: u64 = 5;

static NEXT_SOCKET_ID: AtomicU64 = AtomicU64::new(0);

/// Spawns one mpv process per player
#[derive(Debug, Clone)]
pub struct MpvBackend {
    binary: String,
    socket_dir: PathBuf,
    startup: BoundedWait,
}

impl MpvBackend {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            socket_dir: std::env::temp_dir(),
            startup: BoundedWait::new(Duration::from_secs(5), 100),
        }
    }
}

impl MediaBackend for MpvBackend {
    fn create_player(&self, options: PlayerOptions) -> Result<Box<dyn MediaPlayer>> {
        Ok(Box::new(MpvPlayer::spawn(self, options)?))
    }
}

/// Values pushed by mpv property observation
#[derive(Default)]
struct Observed {
    time_ms: AtomicI64,
    position: Mutex<f64>,
    duration: Mutex<Option<f64>>,
    paused: AtomicBool,
    core_idle: AtomicBool,
    loaded: AtomicBool,
    ended: AtomicBool,
    failed: AtomicBool,
    callback: Mutex<Option<TimeChangedCallback>>,
}

impl Observed {
    fn handle_event(&self, msg: &Value) {
        match msg["event"].as_str() {
            Some("property-change") => self.property_changed(msg["id"].as_u64(), &msg["data"]),
            Some("start-file") => {
                self.loaded.store(false, Ordering::SeqCst);
                self.ended.store(false, Ordering::SeqCst);
                self.failed.store(false, Ordering::SeqCst);
            }
            Some("file-loaded") => self.loaded.store(true, Ordering::SeqCst),
            Some("end-file") => {
                let reason = msg["reason"].as_str().unwrap_or("unknown");
                debug!(reason, "mpv: end-file");
                self.loaded.store(false, Ordering::SeqCst);
                match reason {
                    "eof" => self.ended.store(true, Ordering::SeqCst),
                    "error" => self.failed.store(true, Ordering::SeqCst),
                    _ => {}
                }
            }
            _ => {}
        }
    }

    fn property_changed(&self, id: Option<u64>, data: &Value) {
        match id {
            Some(OBS_TIME_POS) => {
                let Some(seconds) = data.as_f64() else { return };
                let time_ms = (seconds * 1000.0) as i64;
                self.time_ms.store(time_ms, Ordering::SeqCst);
                let position = self.position.lock().map(|p| *p).unwrap_or(0.0);
                if let Ok(callback) = self.callback.lock()
                    && let Some(callback) = callback.as_ref()
                {
                    callback(TimeChanged { time_ms, position });
                }
            }
            Some(OBS_PERCENT_POS) => {
                if let (Some(percent), Ok(mut position)) = (data.as_f64(), self.position.lock()) {
                    *position = percent / 100.0;
                }
            }
            Some(OBS_DURATION) => {
                if let Ok(mut duration) = self.duration.lock() {
                    *duration = data.as_f64();
                }
            }
            Some(OBS_PAUSE) => self
                .paused
                .store(data.as_bool().unwrap_or(false), Ordering::SeqCst),
            Some(OBS_CORE_IDLE) => self
                .core_idle
                .store(data.as_bool().unwrap_or(true), Ordering::SeqCst),
            _ => {}
        }
    }
}

pub struct MpvPlayer {
    child: Mutex<Child>,
    socket: PathBuf,
    writer: Mutex<UnixStream>,
    replies: Receiver<Value>,
    next_request: AtomicU64,
    observed: Arc<Observed>,
    media_set: AtomicBool,
    stopped: AtomicBool,
}

impl MpvPlayer {
    fn spawn(backend: &MpvBackend, options: PlayerOptions) -> Result<Self> {
        let socket = backend.socket_dir.join(format!(
            "musicstream-mpv-{}-{}.sock",
            std::process::id(),
            NEXT_SOCKET_ID.fetch_add(1, Ordering::SeqCst)
        ));

        let mut command = Command::new(&backend.binary);
        command
            .args(["--idle=yes", "--no-video", "--no-terminal", "--force-window=no"])
            .arg(format!("--input-ipc-server={}", socket.display()))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if options.muted {
            command.arg("--mute=yes");
        }
        if options.looping {
            command.args(["--loop-file=inf", "--loop-playlist=inf"]);
        }

        let mut child = command.spawn().map_err(|e| {
            MusicStreamError::CommandError(format!("failed to start {}: {}", backend.binary, e))
        })?;

        let mut connection = None;
        backend.startup.block_while(|| match UnixStream::connect(&socket) {
            Ok(stream) => {
                connection = Some(stream);
                false
            }
            Err(_) => true,
        });
        let Some(stream) = connection else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(MusicStreamError::BackendError(format!(
                "mpv IPC socket {} never appeared",
                socket.display()
            )));
        };

        let (reply_tx, reply_rx) = crossbeam_channel::unbounded();
        let observed = Arc::new(Observed {
            core_idle: AtomicBool::new(true),
            ..Default::default()
        });
        let reader = stream.try_clone()?;
        let reader_state = observed.clone();
        std::thread::Builder::new()
            .name("mpv-events".to_string())
            .spawn(move || read_messages(reader, reader_state, reply_tx))?;

        let player = Self {
            child: Mutex::new(child),
            socket,
            writer: Mutex::new(stream),
            replies: reply_rx,
            next_request: AtomicU64::new(1),
            observed,
            media_set: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        };

        for (id, name) in [
            (OBS_TIME_POS, "time-pos"),
            (OBS_PERCENT_POS, "percent-pos"),
            (OBS_DURATION, "duration"),
            (OBS_PAUSE, "pause"),
            (OBS_CORE_IDLE, "core-idle"),
        ] {
            player.command(json!(["observe_property", id, name]))?;
        }

        debug!(socket = %player.socket.display(), ?options, "mpv player ready");
        Ok(player)
    }

    fn command(&self, args: Value) -> Result<Value> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| MusicStreamError::BackendError("mpv connection poisoned".to_string()))?;
        let request_id = self.next_request.fetch_add(1, Ordering::SeqCst);
        let line = json!({ "command": args, "request_id": request_id }).to_string();
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;

        // Replies of earlier timed-out requests may still be queued
        let deadline = Instant::now() + REPLY_TIMEOUT;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let reply = self.replies.recv_timeout(remaining).map_err(|_| {
                MusicStreamError::BackendError(format!("mpv did not answer: {}", args))
            })?;
            if reply["request_id"].as_u64() != Some(request_id) {
                continue;
            }
            return match reply["error"].as_str() {
                None | Some("success") => Ok(reply["data"].clone()),
                Some(error) => Err(MusicStreamError::BackendError(format!(
                    "mpv rejected {}: {}",
                    args, error
                ))),
            };
        }
    }

    fn get_property(&self, name: &str) -> Option<Value> {
        match self.command(json!(["get_property", name])) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(name, error = %e, "mpv get_property failed");
                None
            }
        }
    }

    fn set_property(&self, name: &str, value: Value) -> Result<()> {
        self.command(json!(["set_property", name, value])).map(|_| ())
    }
}

fn read_messages(stream: UnixStream, observed: Arc<Observed>, replies: Sender<Value>) {
    for line in BufReader::new(stream).lines() {
        let Ok(line) = line else { break };
        let Ok(msg) = serde_json::from_str::<Value>(&line) else {
            continue;
        };
        if msg.get("event").is_some() {
            observed.handle_event(&msg);
        } else if msg.get("request_id").is_some() && replies.send(msg).is_err() {
            break;
        }
    }
    debug!("mpv event reader finished");
}

impl MediaPlayer for MpvPlayer {
    fn set_media(&self, source: &MediaSource) -> Result<()> {
        match source {
            MediaSource::Single(url) => {
                self.command(json!(["loadfile", url, "replace"]))?;
            }
            MediaSource::List(urls) => {
                for (i, url) in urls.iter().enumerate() {
                    let mode = if i == 0 { "replace" } else { "append" };
                    self.command(json!(["loadlist", url, mode]))?;
                }
            }
        }
        self.media_set.store(true, Ordering::SeqCst);
        self.stopped.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn play(&self) -> Result<()> {
        self.stopped.store(false, Ordering::SeqCst);
        self.set_property("pause", json!(false))
    }

    fn pause(&self) -> Result<()> {
        self.set_property("pause", json!(true))
    }

    fn stop(&self) -> Result<()> {
        self.stopped.store(true, Ordering::SeqCst);
        self.command(json!(["stop"])).map(|_| ())
    }

    fn is_playing(&self) -> bool {
        let observed = &self.observed;
        observed.loaded.load(Ordering::SeqCst)
            && !observed.paused.load(Ordering::SeqCst)
            && !observed.core_idle.load(Ordering::SeqCst)
    }

    fn state(&self) -> PlayerState {
        let observed = &self.observed;
        if observed.failed.load(Ordering::SeqCst) {
            PlayerState::Error
        } else if observed.ended.load(Ordering::SeqCst) {
            PlayerState::Ended
        } else if self.stopped.load(Ordering::SeqCst) {
            PlayerState::Stopped
        } else if !observed.loaded.load(Ordering::SeqCst) {
            if self.media_set.load(Ordering::SeqCst) {
                PlayerState::Opening
            } else {
                PlayerState::Idle
            }
        } else if observed.paused.load(Ordering::SeqCst) {
            PlayerState::Paused
        } else if observed.core_idle.load(Ordering::SeqCst) {
            PlayerState::Opening
        } else {
            PlayerState::Playing
        }
    }

    fn time_ms(&self) -> i64 {
        self.observed.time_ms.load(Ordering::SeqCst)
    }

    fn set_time_ms(&self, time_ms: i64) -> Result<()> {
        let time_ms = time_ms.max(0);
        self.set_property("time-pos", json!(time_ms as f64 / 1000.0))?;
        self.observed.time_ms.store(time_ms, Ordering::SeqCst);
        Ok(())
    }

    fn length_ms(&self) -> Option<i64> {
        let duration = self.observed.duration.lock().ok().and_then(|d| *d);
        duration
            .filter(|d| *d > 0.0)
            .map(|d| (d * 1000.0) as i64)
    }

    fn position(&self) -> f64 {
        self.observed.position.lock().map(|p| *p).unwrap_or(0.0)
    }

    fn rate(&self) -> f64 {
        self.get_property("speed")
            .and_then(|v| v.as_f64())
            .unwrap_or(1.0)
    }

    fn set_rate(&self, rate: f64) -> Result<()> {
        self.set_property("speed", json!(rate))
    }

    fn volume(&self) -> u8 {
        self.get_property("volume")
            .and_then(|v| v.as_f64())
            .map(|v| v.clamp(0.0, 100.0) as u8)
            .unwrap_or(100)
    }

    fn set_volume(&self, volume: u8) -> Result<()> {
        self.set_property("volume", json!(volume.min(100)))
    }

    fn is_muted(&self) -> bool {
        self.get_property("mute")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    fn set_muted(&self, muted: bool) -> Result<()> {
        self.set_property("mute", json!(muted))
    }

    fn set_repeat(&self, looping: bool) -> Result<()> {
        let value = if looping { "inf" } else { "no" };
        self.set_property("loop-file", json!(value))?;
        self.set_property("loop-playlist", json!(value))
    }

    fn on_time_changed(&self, callback: TimeChangedCallback) {
        if let Ok(mut slot) = self.observed.callback.lock() {
            *slot = Some(callback);
        }
    }
}

impl Drop for MpvPlayer {
    fn drop(&mut self) {
        if let Err(e) = self.command(json!(["quit"])) {
            debug!(error = %e, "mpv quit not acknowledged");
        }
        if let Ok(mut child) = self.child.lock() {
            let exited = BoundedWait::new(Duration::from_millis(500), 10)
                .block_while(|| matches!(child.try_wait(), Ok(None)));
            if !exited {
                warn!("mpv did not exit, killing it");
                let _ = child.kill();
                let _ = child.wait();
            }
        }
        let _ = std::fs::remove_file(&self.socket);
    }
}
