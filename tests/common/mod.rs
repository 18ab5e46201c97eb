#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use playlist_archiver::logging::LogSink;
use playlist_archiver::{AppError, Engine, FetchRequest, FetchStatus, Playlist, ProgressUpdate, Result, WorkItem};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// What the fake engine does for one video URL.
#[derive(Debug, Clone)]
pub enum Script {
    Succeed,
    Fail { code: i32, errors: Vec<String> },
    Error(String),
    Panic(String),
    Hang,
}

/// Engine double driven by per-URL scripts. Unscripted videos succeed.
#[derive(Default)]
pub struct ScriptedEngine {
    playlists: HashMap<String, Playlist>,
    scripts: HashMap<String, Script>,
    delay: Duration,
    running: AtomicUsize,
    peak: AtomicUsize,
    refreshes: AtomicUsize,
    fetched: Mutex<Vec<String>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_playlist(mut self, url: &str, playlist: Playlist) -> Self {
        self.playlists.insert(url.to_string(), playlist);
        self
    }

    pub fn with_script(mut self, item_id: &str, script: Script) -> Self {
        self.scripts.insert(video_url(item_id), script);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Most fetches that were ever in flight at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().clone()
    }
}

struct Running<'a>(&'a AtomicUsize);

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Engine for ScriptedEngine {
    async fn list_playlist(&self, url: &str) -> Result<Playlist> {
        self.playlists
            .get(url)
            .cloned()
            .ok_or_else(|| AppError::Engine(format!("ERROR: Unsupported URL: {}", url)))
    }

    async fn fetch(
        &self,
        request: &FetchRequest,
        progress: &(dyn Fn(ProgressUpdate) + Send + Sync),
        log: &dyn LogSink,
    ) -> Result<FetchStatus> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        let _running = Running(&self.running);
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.fetched.lock().push(request.url.clone());

        progress(ProgressUpdate {
            downloaded_bytes: Some(50),
            total_bytes: Some(100),
            speed: Some(1024.0),
        });
        tokio::time::sleep(self.delay).await;

        match self.scripts.get(&request.url).cloned().unwrap_or(Script::Succeed) {
            Script::Succeed => {
                progress(ProgressUpdate {
                    downloaded_bytes: Some(100),
                    total_bytes: Some(100),
                    speed: None,
                });
                Ok(FetchStatus::Completed)
            }
            Script::Fail { code, errors } => {
                for line in &errors {
                    log.error(line);
                }
                log.warning("WARNING: not an error");
                Ok(FetchStatus::Failed(code))
            }
            Script::Error(msg) => Err(AppError::Custom(msg)),
            Script::Panic(msg) => panic!("{}", msg),
            Script::Hang => {
                std::future::pending::<()>().await;
                Ok(FetchStatus::Completed)
            }
        }
    }

    async fn refresh(&self) -> Result<()> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn video_url(id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", id)
}

pub fn item(id: &str) -> WorkItem {
    WorkItem {
        id: id.to_string(),
        title: format!("Video {}", id),
        source_url: video_url(id),
    }
}

pub fn playlist(id: &str, ids: &[&str]) -> Playlist {
    Playlist {
        id: id.to_string(),
        title: format!("Playlist {}", id),
        entries: ids.iter().map(|id| item(id)).collect(),
    }
}

pub fn archive_lines(path: &std::path::Path) -> Vec<String> {
    let mut lines: Vec<String> = std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect();
    lines.sort();
    lines
}
