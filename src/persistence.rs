//! Boundary to the playlist/track store
//!
//! Only the operations the registry hands data to are modelled here. The
//! in-memory store backs the CLI and tests; a database-backed store
//! implements the same trait.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

pub const LIKED_SONGS: &str = "Liked Songs";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistRecord {
    pub id: u64,
    pub title: String,
    pub description: Option<String>,
    pub date_created: DateTime<Utc>,
    /// Tracks added to a downloaded playlist are fetched to disk
    pub downloaded: bool,
}

/// Fields a new track is created from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTrack {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub duration: Option<u64>,
    /// Stream URL, or the page URL for sources whose stream URLs expire
    pub stream_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
    pub id: u64,
    pub track: NewTrack,
    pub playlist_ids: Vec<u64>,
    pub path: Option<PathBuf>,
}

pub trait TrackStore {
    fn get_or_create_playlist(&mut self, title: &str) -> Result<PlaylistRecord>;

    /// Create a track and add it to the playlist; returns the track id
    fn create_and_add_track(&mut self, track: NewTrack, playlist_id: u64) -> Result<u64>;

    fn set_track_path(&mut self, track_id: u64, path: &Path) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    playlists: Vec<PlaylistRecord>,
    tracks: Vec<TrackRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn playlist(&self, title: &str) -> Option<&PlaylistRecord> {
        self.playlists.iter().find(|p| p.title == title)
    }

    pub fn playlists(&self) -> &[PlaylistRecord] {
        &self.playlists
    }

    pub fn track(&self, id: u64) -> Option<&TrackRecord> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn tracks_in(&self, playlist_id: u64) -> impl Iterator<Item = &TrackRecord> {
        self.tracks
            .iter()
            .filter(move |t| t.playlist_ids.contains(&playlist_id))
    }

    /// Mark a playlist as downloaded, creating it if needed
    pub fn set_downloaded(&mut self, title: &str, downloaded: bool) -> Result<()> {
        self.get_or_create_playlist(title)?;
        if let Some(playlist) = self.playlists.iter_mut().find(|p| p.title == title) {
            playlist.downloaded = downloaded;
        }
        Ok(())
    }
}

impl TrackStore for MemoryStore {
    fn get_or_create_playlist(&mut self, title: &str) -> Result<PlaylistRecord> {
        if let Some(existing) = self.playlist(title) {
            return Ok(existing.clone());
        }
        let record = PlaylistRecord {
            id: self.playlists.len() as u64 + 1,
            title: title.to_string(),
            description: None,
            date_created: Utc::now(),
            downloaded: false,
        };
        self.playlists.push(record.clone());
        Ok(record)
    }

    fn create_and_add_track(&mut self, track: NewTrack, playlist_id: u64) -> Result<u64> {
        let id = self.tracks.len() as u64 + 1;
        self.tracks.push(TrackRecord {
            id,
            track,
            playlist_ids: vec![playlist_id],
            path: None,
        });
        Ok(id)
    }

    fn set_track_path(&mut self, track_id: u64, path: &Path) -> Result<()> {
        if let Some(record) = self.tracks.iter_mut().find(|t| t.id == track_id) {
            record.path = Some(path.to_path_buf());
        }
        Ok(())
    }
}
