use crate::aggregator::ResultAggregator;
use crate::engine::{Engine, FetchRequest, FetchStatus, ProgressUpdate, ytdlp::OUTPUT_TEMPLATE};
use crate::error::{AppError, Result};
use crate::logging::{ConsoleLogSink, FileLogSink, ItemLog};
use crate::progress::{Board, ProgressSink};
use crate::queue::{WorkItem, WorkQueue};
use crate::slots::{AcquiredSlot, SlotPool};
use futures::stream::{self, StreamExt};
use futures::FutureExt;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

/// Outcome of one dispatched video. Exactly one is produced per item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkResult {
    pub item_id: String,
    pub succeeded: bool,
    pub error_messages: Vec<String>,
    pub info_messages: Vec<String>,
}

impl WorkResult {
    fn new(item_id: &str) -> Self {
        Self {
            item_id: item_id.to_string(),
            ..Self::default()
        }
    }
}

/// A downloader that runs a queue of videos through a fixed number of
/// concurrent workers.
///
/// # Fields
/// * `engine` - The media engine doing the actual downloads
/// * `slots` - Display slots; each running video holds one
/// * `board` - Terminal display the slots draw on
/// * `concurrency` - Number of videos in flight at once
/// * `item_logs` - Whether each video gets its own log file
pub struct Downloader {
    engine: Arc<dyn Engine>,
    slots: Arc<SlotPool>,
    board: Arc<Board>,
    concurrency: usize,
    item_logs: bool,
}

impl Downloader {
    /// Creates a new `Downloader`.
    ///
    /// # Arguments
    /// * `engine` - Engine used for every fetch
    /// * `slots` - Shared slot pool; an empty pool disables per-video bars
    /// * `board` - Display the slot bars live on
    /// * `concurrency` - Worker count, at least 1
    pub fn new(
        engine: Arc<dyn Engine>,
        slots: Arc<SlotPool>,
        board: Arc<Board>,
        concurrency: usize,
    ) -> Self {
        Self {
            engine,
            slots,
            board,
            concurrency: concurrency.max(1),
            item_logs: true,
        }
    }

    /// Enables or disables the per-video log file next to the output. Without
    /// it, engine messages go to `tracing`.
    pub fn with_item_logs(mut self, enabled: bool) -> Self {
        self.item_logs = enabled;
        self
    }

    /// Downloads every video in `queue` into `output_dir`.
    ///
    /// # Arguments
    /// * `queue` - Videos to download
    /// * `output_dir` - Target directory
    /// * `aggregator` - Receives each result as soon as it is ready
    /// * `shutdown` - Stops the run; in-flight downloads are abandoned
    ///
    /// # Returns
    /// * `Result<()>` - Per-video failures are reported to the aggregator,
    ///   so the only error is [`AppError::Interrupted`]
    ///
    /// # Details
    /// Results arrive in completion order, not queue order.
    pub async fn process_queue(
        &self,
        queue: WorkQueue,
        output_dir: &Path,
        aggregator: &mut ResultAggregator<'_>,
        shutdown: &CancellationToken,
    ) -> Result<()> {
        let results = stream::iter(queue)
            .map(|item| self.download_item(item, output_dir))
            .buffer_unordered(self.concurrency);
        let mut results = std::pin::pin!(results);

        loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => return Err(AppError::Interrupted),
                next = results.next() => next,
            };
            match next {
                Some(result) => aggregator.record(result).await,
                None => return Ok(()),
            }
        }
    }

    /// Downloads a single video.
    ///
    /// # Arguments
    /// * `item` - The video
    /// * `output_dir` - Directory the video and its log file go to
    ///
    /// # Returns
    /// * `WorkResult` - Never fails; every failure is folded into the result
    ///
    /// # Details
    /// 1. Waits for a display slot (skipped when the pool is empty)
    /// 2. Runs the engine with a progress callback bound to the slot's bar
    ///    and a fresh log capturing this video's errors
    /// 3. Closes the bar and releases the slot on every path
    #[instrument(skip(self, item, output_dir), fields(id = %item.id))]
    pub async fn download_item(&self, item: WorkItem, output_dir: &Path) -> WorkResult {
        let slot = self.slots.acquire(None).await;
        let sink = match &slot {
            Some(slot) => self.board.sink(slot.index(), &item),
            None => ProgressSink::noop(),
        };
        let lease = SlotLease {
            pool: &self.slots,
            slot,
            sink,
        };

        let log = self.item_log(&item, output_dir);
        let request = FetchRequest {
            url: item.source_url.clone(),
            output_template: output_template(output_dir),
        };
        let report = |update: ProgressUpdate| lease.sink.update(&update);

        let started = Instant::now();
        let outcome = AssertUnwindSafe(self.engine.fetch(&request, &report, &log))
            .catch_unwind()
            .await;

        let mut result = WorkResult::new(&item.id);
        match outcome {
            Ok(Ok(FetchStatus::Completed)) => {
                result.succeeded = true;
                result.info_messages.push(format!(
                    "{} '{}' downloaded in {} min.",
                    item.id,
                    item.title,
                    elapsed_minutes(started.elapsed())
                ));
            }
            Ok(Ok(FetchStatus::Failed(code))) => {
                let mut errors = log.take_errors();
                if errors.is_empty() {
                    errors.push(format!("{} failed with exit code {}", item.id, code));
                }
                result.error_messages = errors;
            }
            Ok(Err(e)) => {
                lease.sink.complete();
                result.error_messages.push(format!("EXCEPTION -> {}", e));
            }
            Err(panic) => {
                lease.sink.complete();
                result
                    .error_messages
                    .push(format!("EXCEPTION -> {}", panic_message(panic.as_ref())));
            }
        }

        drop(lease);
        result
    }

    fn item_log(&self, item: &WorkItem, output_dir: &Path) -> ItemLog {
        if !self.item_logs {
            return ItemLog::new(Box::new(ConsoleLogSink::new(&item.id)));
        }

        let path = output_dir.join(format!("{}.log", item.id.replace(['/', '\\'], "_")));
        match FileLogSink::open(&item.id, &path) {
            Ok(sink) => ItemLog::new(Box::new(sink)),
            Err(e) => {
                warn!("Could not open log file {}: {}", path.display(), e);
                ItemLog::new(Box::new(ConsoleLogSink::new(&item.id)))
            }
        }
    }
}

/// yt-dlp output template for a target directory.
pub fn output_template(output_dir: &Path) -> String {
    output_dir.join(OUTPUT_TEMPLATE).to_string_lossy().into_owned()
}

/// Minutes rounded to two places, counting started seconds as whole.
pub fn elapsed_minutes(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64().ceil() / 60.0 * 100.0).round() / 100.0
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// A held slot and the bar drawn on it.
///
/// Dropping the lease closes the bar first and then releases the slot, so
/// the next holder never has its fresh bar blanked. This also runs when the
/// download future is dropped mid-flight.
struct SlotLease<'a> {
    pool: &'a SlotPool,
    slot: Option<AcquiredSlot>,
    sink: ProgressSink,
}

impl Drop for SlotLease<'_> {
    fn drop(&mut self) {
        self.sink.close();
        if let Some(slot) = self.slot.take() {
            self.pool.release(slot);
        }
    }
}
