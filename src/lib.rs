/// A concurrent YouTube playlist archiver.
///
/// This library lists playlists through yt-dlp, skips the videos recorded in
/// each playlist's download archive, and downloads the rest with a fixed
/// number of concurrent workers drawing on shared terminal progress lines.
///
/// # Architecture
///
/// The application is structured into several key components:
/// - `Config`: Validated runtime settings built from the command line
/// - `Runner`: Cycle loop over every input URL
/// - `Downloader`: Worker pool running one queue through the engine
/// - `SlotPool`: Progress lines shared by the workers
/// - `StaleSlotReclaimer`: Clears lines abandoned by dead workers
/// - `Engine`: The media engine contract, implemented by `YtDlpEngine`
///
/// # Example
/// ```no_run
/// use playlist_archiver::{resolve_input, InputDatatype};
/// use std::path::Path;
///
/// let plan = resolve_input("urls.txt", InputDatatype::Auto, Some(Path::new("videos"))).unwrap();
/// println!("{} urls", plan.url_count());
/// ```
pub mod aggregator;
pub mod archive;
pub mod cli;
pub mod config;
pub mod downloader;
pub mod engine;
pub mod error;
pub mod input;
pub mod logging;
pub mod progress;
pub mod queue;
pub mod reclaimer;
pub mod runner;
pub mod slots;

// Re-export commonly used items
pub use aggregator::{ResultAggregator, RunStats};
pub use archive::DownloadArchive;
pub use cli::Args;
pub use config::Config;
pub use downloader::{Downloader, WorkResult};
pub use engine::{Engine, FetchRequest, FetchStatus, ProgressUpdate, YtDlpEngine};
pub use error::{AppError, Result};
pub use input::{resolve_input, InputDatatype, InputPlan};
pub use logging::{ItemLog, LogSink};
pub use progress::{Board, ProgressSink};
pub use queue::{Playlist, WorkItem, WorkQueue};
pub use reclaimer::{ReclaimerConfig, StaleSlotReclaimer};
pub use runner::Runner;
pub use slots::{AcquiredSlot, SlotPool};
