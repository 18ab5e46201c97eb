//! The contract between the download queue and the media engine that does
//! the actual extraction and downloading.

use crate::error::Result;
use crate::logging::LogSink;
use crate::queue::Playlist;
use async_trait::async_trait;

pub mod ytdlp;

pub use ytdlp::{EngineOptions, YtDlpEngine};

/// Byte progress reported by the engine while a video downloads.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProgressUpdate {
    pub downloaded_bytes: Option<u64>,
    pub total_bytes: Option<u64>,
    /// Bytes per second.
    pub speed: Option<f64>,
}

/// One download handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub output_template: String,
}

/// How a fetch that ran to completion ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Completed,
    /// The engine reported failure with this exit code. Details were logged
    /// to the item's [`LogSink`].
    Failed(i32),
}

/// A media extraction and download engine.
///
/// `fetch` returning `Err` is an unexpected failure (the engine could not be
/// run at all); an engine that ran and failed returns
/// `Ok(FetchStatus::Failed(_))` after logging its errors.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Flat listing of a playlist or single video.
    async fn list_playlist(&self, url: &str) -> Result<Playlist>;

    /// Downloads one video.
    async fn fetch(
        &self,
        request: &FetchRequest,
        progress: &(dyn Fn(ProgressUpdate) + Send + Sync),
        log: &dyn LogSink,
    ) -> Result<FetchStatus>;

    /// Updates the engine itself. Called once per cycle.
    async fn refresh(&self) -> Result<()> {
        Ok(())
    }
}
