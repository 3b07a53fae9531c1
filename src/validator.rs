//! Stream validation and duration probing through the media backend

use reqwest::header::HeaderMap;
use tracing::{debug, info, warn};

use crate::backend::{MediaPlayer, MediaSource, PlayerOptions, PlayerState};
use crate::context::Context;
use crate::core::is_stream_playlist;
use crate::error::Result;

/// Outcome of a validity probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validity {
    pub valid: bool,
    /// Backend state when the probe finished, `None` when the backend was never reached
    pub state: Option<PlayerState>,
}

impl Validity {
    fn invalid(state: Option<PlayerState>) -> Self {
        Self {
            valid: false,
            state,
        }
    }
}

/// Start a muted probe player on `url` and wait for playback to begin
async fn start_probe(ctx: &Context, url: &str) -> Result<(Box<dyn MediaPlayer>, bool)> {
    let player = ctx.backend().create_player(PlayerOptions {
        muted: true,
        looping: false,
    })?;
    player.set_media(&MediaSource::for_stream(url))?;
    player.play()?;
    let started = ctx.config().wait.wait_while(|| !player.is_playing()).await;
    Ok((player, started))
}

/// Check that `url` answers over HTTP and that the backend actually starts playing it.
///
/// A probe that has not started playing when the bounded wait runs out is
/// invalid, whatever state the backend reports.
pub async fn check_stream_validity(ctx: &Context, url: &str) -> Validity {
    if url.starts_with("http://") || url.starts_with("https://") {
        // Only the status line and headers are read; live bodies never end.
        if let Err(e) = ctx.http().get_response(url, HeaderMap::new()).await {
            warn!(url, error = %e, "stream is not reachable");
            return Validity::invalid(None);
        }
    }

    let (player, started) = match start_probe(ctx, url).await {
        Ok(probe) => probe,
        Err(e) => {
            warn!(url, error = %e, "probe player failed");
            return Validity::invalid(None);
        }
    };

    let state = player.state();
    let valid = started && !state.is_failed();
    if let Err(e) = player.stop() {
        debug!(url, error = %e, "failed to stop probe player");
    }

    if valid {
        info!(url, ?state, "stream is valid");
    } else {
        info!(url, ?state, started, "stream is not valid");
    }
    Validity {
        valid,
        state: Some(state),
    }
}

/// Length of the stream in whole seconds. Playlist manifests and live
/// streams have no duration.
pub async fn probe_duration(ctx: &Context, url: &str) -> Option<u64> {
    if is_stream_playlist(url) {
        return None;
    }

    let (player, started) = match start_probe(ctx, url).await {
        Ok(probe) => probe,
        Err(e) => {
            warn!(url, error = %e, "duration probe failed");
            return None;
        }
    };

    let duration = if started {
        player
            .length_ms()
            .filter(|ms| *ms > 0)
            .map(|ms| (ms / 1000) as u64)
    } else {
        None
    };
    if let Err(e) = player.stop() {
        debug!(url, error = %e, "stopping duration probe failed");
    }
    debug!(url, ?duration, "duration probed");
    duration
}
