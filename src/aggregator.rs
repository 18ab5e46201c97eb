use crate::archive::DownloadArchive;
use crate::downloader::WorkResult;
use crate::logging::LogSink;
use crate::progress::Board;
use tracing::Level;

/// Counters for one cycle over all inputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub downloaded: usize,
    /// Error lines reported, across all videos.
    pub encountered_errors: usize,
    /// Videos that failed, each counted once.
    pub errored_items: usize,
}

impl RunStats {
    pub fn absorb(&mut self, other: RunStats) {
        self.downloaded += other.downloaded;
        self.encountered_errors += other.encountered_errors;
        self.errored_items += other.errored_items;
    }

    pub fn summary(&self) -> String {
        format!(
            "Encountered {} errors on {} videos.",
            self.encountered_errors, self.errored_items
        )
    }
}

/// Folds worker results into the playlist's archive, the error log and the
/// counters. Results are taken one at a time, so archive appends never
/// interleave.
pub struct ResultAggregator<'a> {
    archive: DownloadArchive,
    error_log: &'a dyn LogSink,
    board: &'a Board,
    silence_errors: bool,
    stats: RunStats,
}

impl<'a> ResultAggregator<'a> {
    pub fn new(
        archive: DownloadArchive,
        error_log: &'a dyn LogSink,
        board: &'a Board,
        silence_errors: bool,
    ) -> Self {
        Self {
            archive,
            error_log,
            board,
            silence_errors,
            stats: RunStats::default(),
        }
    }

    /// Takes one result. Never fails: a video that downloaded but could not be
    /// written to the archive is reported as an error and downloaded again
    /// next cycle.
    pub async fn record(&mut self, result: WorkResult) {
        if result.succeeded {
            self.stats.downloaded += 1;
            if let Err(e) = self.archive.append(&result.item_id).await {
                let line = format!(
                    "Could not record {} in {}: {}",
                    result.item_id,
                    self.archive.path().display(),
                    e
                );
                self.error_log.error(&line);
                self.stats.encountered_errors += 1;
                self.board.write(Level::ERROR, &line);
            }
        }

        for line in &result.error_messages {
            self.error_log.error(line);
            self.stats.encountered_errors += 1;
            if !self.silence_errors {
                self.board.write(Level::ERROR, line);
            } else if self.board.is_interactive() {
                // Only reaches the run log file; the console stays quiet.
                tracing::error!("{}", line);
            }
        }

        if !result.succeeded {
            self.stats.errored_items += 1;
            if self.silence_errors && !self.board.is_interactive() {
                tracing::error!("{} failed due to error.", result.item_id);
            }
        }

        for line in &result.info_messages {
            tracing::info!("{}", line);
        }

        self.board.advance_playlist();
    }

    pub fn stats(&self) -> RunStats {
        self.stats
    }

    pub fn archive(&self) -> &DownloadArchive {
        &self.archive
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::ItemLog;
    use tempfile::TempDir;

    fn success(id: &str) -> WorkResult {
        WorkResult {
            item_id: id.to_string(),
            succeeded: true,
            error_messages: vec![],
            info_messages: vec![format!("{} downloaded in 0.02 min.", id)],
        }
    }

    fn failure(id: &str, errors: &[&str]) -> WorkResult {
        WorkResult {
            item_id: id.to_string(),
            succeeded: false,
            error_messages: errors.iter().map(|e| e.to_string()).collect(),
            info_messages: vec![],
        }
    }

    #[tokio::test]
    async fn test_counts_and_archive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("PL.log");
        let archive = DownloadArchive::open(&path).await.unwrap();
        let error_log = ItemLog::muted();
        let board = Board::hidden(0);
        board.start_playlist("PL", "PL", 4, 0);

        let mut aggregator = ResultAggregator::new(archive, &error_log, &board, false);
        aggregator.record(success("a")).await;
        aggregator
            .record(failure("b", &["ERROR: one", "ERROR: two"]))
            .await;
        aggregator.record(success("c")).await;
        aggregator.record(failure("d", &["EXCEPTION -> boom"])).await;

        assert_eq!(
            aggregator.stats(),
            RunStats {
                downloaded: 2,
                encountered_errors: 3,
                errored_items: 2,
            }
        );
        assert!(aggregator.archive().contains("a"));
        assert!(!aggregator.archive().contains("b"));
        assert_eq!(
            error_log.errors(),
            vec!["ERROR: one", "ERROR: two", "EXCEPTION -> boom"]
        );
        assert_eq!(board.playlist_position(), 4);

        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert_eq!(on_disk, "a\nc\n");
    }

    #[tokio::test]
    async fn test_silenced_errors_still_reach_error_log() {
        let dir = TempDir::new().unwrap();
        let archive = DownloadArchive::open(dir.path().join("PL.log")).await.unwrap();
        let error_log = ItemLog::muted();
        let board = Board::hidden(0);

        let mut aggregator = ResultAggregator::new(archive, &error_log, &board, true);
        aggregator.record(failure("x", &["ERROR: gone"])).await;

        assert_eq!(error_log.errors(), vec!["ERROR: gone"]);
        assert_eq!(aggregator.stats().errored_items, 1);
    }

    #[tokio::test]
    async fn test_archive_write_failure_is_reported_not_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("PL.log");
        std::fs::write(&path, "").unwrap();
        let archive = DownloadArchive::open_read_only(&path).await.unwrap();
        let error_log = ItemLog::muted();
        let board = Board::hidden(0);
        board.start_playlist("PL", "PL", 2, 0);

        let mut aggregator = ResultAggregator::new(archive, &error_log, &board, false);
        aggregator.record(success("a")).await;
        aggregator.record(success("b")).await;

        let stats = aggregator.stats();
        assert_eq!(stats.downloaded, 2);
        assert_eq!(stats.encountered_errors, 2);
        assert_eq!(stats.errored_items, 0);
        assert!(!aggregator.archive().contains("a"));
        let errors = error_log.errors();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].starts_with("Could not record a in "));
        assert_eq!(board.playlist_position(), 2);
    }

    #[test]
    fn test_stats_absorb_and_summary() {
        let mut total = RunStats::default();
        total.absorb(RunStats {
            downloaded: 1,
            encountered_errors: 2,
            errored_items: 1,
        });
        total.absorb(RunStats {
            downloaded: 3,
            encountered_errors: 1,
            errored_items: 1,
        });

        assert_eq!(total.downloaded, 4);
        assert_eq!(total.summary(), "Encountered 3 errors on 2 videos.");
    }
}
