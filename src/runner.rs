use crate::aggregator::{ResultAggregator, RunStats};
use crate::archive::DownloadArchive;
use crate::config::Config;
use crate::downloader::{elapsed_minutes, Downloader};
use crate::engine::Engine;
use crate::error::{AppError, Result};
use crate::input::InputPlan;
use crate::logging::LogSink;
use crate::progress::Board;
use crate::queue::{dedup_entries, WorkQueue};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, Level};

/// Drives whole cycles over an [`InputPlan`]: one playlist at a time, each
/// through the worker pool, then either stops or sleeps and starts over.
pub struct Runner {
    config: Arc<Config>,
    engine: Arc<dyn Engine>,
    downloader: Downloader,
    board: Arc<Board>,
    error_log: Arc<dyn LogSink>,
    shutdown: CancellationToken,
    /// Playlists whose archive was already erased during this process.
    erased: HashSet<String>,
}

impl Runner {
    pub fn new(
        config: Arc<Config>,
        engine: Arc<dyn Engine>,
        downloader: Downloader,
        board: Arc<Board>,
        error_log: Arc<dyn LogSink>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            engine,
            downloader,
            board,
            error_log,
            shutdown,
            erased: HashSet::new(),
        }
    }

    /// Runs one cycle, or cycles forever in daemon mode.
    ///
    /// # Returns
    /// * `Result<RunStats>` - Counters of the last cycle. Returns
    ///   [`AppError::Interrupted`] once the shutdown token is cancelled.
    pub async fn run(&mut self, plan: &InputPlan) -> Result<RunStats> {
        loop {
            let stats = self.run_cycle(plan).await?;
            if !self.config.daemon {
                return Ok(stats);
            }

            info!(
                "Sleeping for {} min.",
                elapsed_minutes(self.config.daemon_sleep)
            );
            self.pause(self.config.daemon_sleep).await?;
        }
    }

    /// Processes every URL of `plan` once.
    #[instrument(skip_all)]
    pub async fn run_cycle(&mut self, plan: &InputPlan) -> Result<RunStats> {
        let started = Instant::now();

        if !self.config.no_update {
            self.board.set_status("Updating yt-dlp...");
            if let Err(e) = self.engine.refresh().await {
                self.board
                    .write(Level::WARN, &format!("Could not update yt-dlp: {}", e));
            }
        }

        let total = plan.url_count();
        self.board.start_inputs(total);

        let mut stats = RunStats::default();
        let mut visited = 0;
        for target in &plan.targets {
            for url in &target.urls {
                if self.shutdown.is_cancelled() {
                    return Err(AppError::Interrupted);
                }
                visited += 1;

                stats.absorb(self.process_url(&target.output_dir, url).await?);

                if visited < total && !self.config.ratelimit_sleep.is_zero() {
                    self.board.set_status(format!(
                        "Sleeping {}s before the next URL...",
                        self.config.ratelimit_sleep.as_secs()
                    ));
                    self.pause(self.config.ratelimit_sleep).await?;
                }
                self.board.advance_inputs();
            }
        }

        self.board.write(Level::INFO, &stats.summary());
        info!(
            "Finished process in {} min.",
            elapsed_minutes(started.elapsed())
        );
        Ok(stats)
    }

    /// Lists one URL and downloads whatever its archive does not cover.
    ///
    /// A URL the engine cannot list, or whose archive or output directory is
    /// unusable, is reported and skipped. Only an interrupt is returned as an
    /// error.
    #[instrument(skip(self, output_dir))]
    async fn process_url(&mut self, output_dir: &Path, url: &str) -> Result<RunStats> {
        self.board.set_status(format!("Listing {}...", url));
        let playlist = match self.engine.list_playlist(url).await {
            Ok(playlist) => playlist,
            Err(e) => {
                self.board
                    .write(Level::WARN, &format!("Skipping {}: {}", url, e));
                return Ok(RunStats::default());
            }
        };

        let archive = match self.open_archive(&playlist.id).await {
            Ok(archive) => archive,
            Err(e) => {
                self.board.write(
                    Level::ERROR,
                    &format!("Skipping {}: archive unavailable: {}", url, e),
                );
                return Ok(RunStats::default());
            }
        };

        let ignoring = self.config.ignore_downloaded;
        self.board.write(
            Level::INFO,
            &format!(
                "Found {} downloaded videos for playlist \"{}\" ({}).{}",
                archive.len(),
                playlist.title,
                playlist.id,
                if ignoring { " Ignoring." } else { "" }
            ),
        );

        let entries = dedup_entries(playlist.entries);
        let total = entries.len();
        let queue = WorkQueue::build(entries, archive.snapshot(), self.config.queue_options());
        let already_done = if ignoring { 0 } else { archive.len() };
        self.board
            .start_playlist(&playlist.title, &playlist.id, total, already_done);

        if queue.is_empty() {
            self.board.write(
                Level::INFO,
                &format!("All videos already downloaded for '{}'.", playlist.title),
            );
            return Ok(RunStats::default());
        }

        if let Err(e) = tokio::fs::create_dir_all(output_dir).await {
            self.board.write(
                Level::ERROR,
                &format!("Skipping {}: cannot create {}: {}", url, output_dir.display(), e),
            );
            return Ok(RunStats::default());
        }
        self.board
            .set_status(format!("Downloading {} videos...", queue.len()));

        let mut aggregator = ResultAggregator::new(
            archive,
            self.error_log.as_ref(),
            &self.board,
            self.config.silence_errors,
        );
        self.downloader
            .process_queue(queue, output_dir, &mut aggregator, &self.shutdown)
            .await?;

        info!("Finished item: '{}' {}", playlist.title, url);
        Ok(aggregator.stats())
    }

    /// Opens the playlist's archive, erasing it first if asked to and not
    /// yet done during this process.
    async fn open_archive(&mut self, playlist_id: &str) -> Result<DownloadArchive> {
        let path = self.config.archive_path(playlist_id);
        if self.config.erase_downloaded_tracker && !self.erased.contains(playlist_id) {
            DownloadArchive::erase(&path).await?;
            self.erased.insert(playlist_id.to_string());
        }
        DownloadArchive::open(&path).await
    }

    async fn pause(&self, duration: Duration) -> Result<()> {
        tokio::select! {
            _ = self.shutdown.cancelled() => Err(AppError::Interrupted),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}
