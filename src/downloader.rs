//! Fetch a registry's stream to the download directory

use reqwest::header::HeaderMap;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::context::Context;
use crate::core::{AudioFormat, DOWNLOAD_EXTENSIONS, SourceKind, has_supported_extension};
use crate::error::{MusicStreamError, Result};
use crate::stream_data::StreamData;
use crate::utils::{basename, get_md5};
use crate::youtube;

/// Container platform renditions are converted to
const TARGET_EXTENSION: &str = ".mp3";

/// Download the registry's stream and return the local path.
///
/// Returns `Ok(None)` when there is nothing downloadable, and `Err` when the
/// transfer or the conversion fails. An existing target file is returned as
/// is, without touching the network.
pub async fn download_stream(
    ctx: &Context,
    data: &StreamData,
    file_name: Option<&str>,
    download_only_default: bool,
) -> Result<Option<PathBuf>> {
    if data.default_stream().is_none() {
        info!("nothing to download: no default stream");
        return Ok(None);
    }

    let dir = &ctx.config().download_dir;
    match data.kind {
        SourceKind::AudioPlatform => download_platform(ctx, data, dir).await.map(Some),
        SourceKind::Generic => download_generic(ctx, data, dir, file_name, download_only_default).await,
    }
}

/// Best rendition, converted to mp3 with title and artist tags
async fn download_platform(ctx: &Context, data: &StreamData, dir: &Path) -> Result<PathBuf> {
    let best = data
        .candidates()
        .first()
        .ok_or(MusicStreamError::AudioNotFound)?;
    let title = data.title.as_deref().unwrap_or("audio");
    let target = dir.join(format!("{}{}", sanitize(title), TARGET_EXTENSION));
    if target.exists() {
        info!(path = %target.display(), "already downloaded");
        return Ok(target);
    }

    tokio::fs::create_dir_all(dir).await?;
    let extension = best.format.unwrap_or(AudioFormat::M4A).extension();
    let working = dir.join(format!("{}{}", get_md5(&best.url), extension));

    ctx.http()
        .download_to_file(&best.url, youtube::download_headers(), &working)
        .await?;

    let converted = transcode(
        &ctx.config().ffmpeg_path,
        &working,
        &target,
        title,
        data.artist.as_deref(),
    )
    .await;
    if let Err(e) = tokio::fs::remove_file(&working).await {
        debug!(path = %working.display(), error = %e, "could not remove intermediate file");
    }
    if let Err(e) = converted {
        // ffmpeg may leave a partial file, which would pass for a finished download.
        if let Err(rm) = tokio::fs::remove_file(&target).await
            && rm.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %target.display(), error = %rm, "could not remove partial output");
        }
        return Err(e);
    }

    info!(path = %target.display(), "download converted");
    Ok(target)
}

/// Default stream, or the first downloadable alternative, stored verbatim
async fn download_generic(
    ctx: &Context,
    data: &StreamData,
    dir: &Path,
    file_name: Option<&str>,
    download_only_default: bool,
) -> Result<Option<PathBuf>> {
    let Some(default) = data.default_stream() else {
        return Ok(None);
    };

    let chosen = if has_supported_extension(&default.url, DOWNLOAD_EXTENSIONS) {
        default
    } else if download_only_default {
        warn!(url = %default.url, "default stream cannot be downloaded");
        return Ok(None);
    } else {
        match data
            .candidates()
            .iter()
            .find(|c| c.url != default.url && has_supported_extension(&c.url, DOWNLOAD_EXTENSIONS))
        {
            Some(candidate) => candidate,
            None => {
                warn!("no downloadable stream");
                return Ok(None);
            }
        }
    };

    let name = file_name
        .map(str::to_string)
        .or_else(|| data.title.clone())
        .unwrap_or_else(|| basename(&chosen.url).to_string());
    let extension = AudioFormat::from_url(&chosen.url)
        .map(|f| f.extension())
        .unwrap_or(TARGET_EXTENSION);
    let stem = sanitize(&name);
    let stem = stem.strip_suffix(extension).unwrap_or(&stem);
    let target = dir.join(format!("{}{}", stem, extension));
    if target.exists() {
        info!(path = %target.display(), "already downloaded");
        return Ok(Some(target));
    }

    tokio::fs::create_dir_all(dir).await?;
    let written = ctx
        .http()
        .download_to_file(&chosen.url, HeaderMap::new(), &target)
        .await?;
    info!(url = %chosen.url, path = %target.display(), written, "stream downloaded");
    Ok(Some(target))
}

fn sanitize(name: &str) -> String {
    let cleaned = sanitize_filename::sanitize(name.trim());
    if cleaned.is_empty() {
        "audio".to_string()
    } else {
        cleaned
    }
}

/// Convert `input` to `output` with ffmpeg, writing the tag fields
async fn transcode(
    ffmpeg: &str,
    input: &Path,
    output: &Path,
    title: &str,
    artist: Option<&str>,
) -> Result<()> {
    let mut cmd = Command::new(ffmpeg);
    cmd.args(["-y", "-loglevel", "error", "-i"])
        .arg(input)
        .args(["-vn", "-codec:a", "libmp3lame", "-q:a", "2"])
        .arg("-metadata")
        .arg(format!("title={}", title));
    if let Some(artist) = artist {
        cmd.arg("-metadata").arg(format!("artist={}", artist));
    }
    cmd.arg(output);

    let output = cmd
        .output()
        .await
        .map_err(|e| MusicStreamError::CommandError(format!("{}: {}", ffmpeg, e)))?;
    if !output.status.success() {
        return Err(MusicStreamError::CommandError(format!(
            "{} exited with {}: {}",
            ffmpeg,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}
