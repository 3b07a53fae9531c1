pub mod backend;
pub mod config;
pub mod context;
pub mod core;
pub mod download;
pub mod downloader;
pub mod error;
pub mod generic;
pub mod persistence;
pub mod player;
pub mod stream_data;
mod utils;
pub mod validator;
pub mod wait;
pub mod youtube;

pub use backend::{MediaBackend, MediaPlayer, PlayerState};
pub use config::Config;
pub use context::Context;
pub use crate::core::{Extractor, SourceKind, StreamCandidate, classify};
pub use downloader::download_stream;
pub use error::{MusicStreamError, Result};
pub use generic::GenericExtractor;
pub use player::{Audio, LocalAudio, PlaybackController, PlaybackState};
pub use stream_data::StreamData;
pub use validator::{Validity, check_stream_validity};
pub use youtube::YoutubeExtractor;

/// Resolve a reference (page, stream or video link) into its streams
pub async fn resolve(ctx: &Context, reference: &str) -> StreamData {
    StreamData::resolve(ctx, reference).await
}
