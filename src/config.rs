use crate::cli::Args;
use crate::error::{AppError, Result};
use crate::queue::QueueOptions;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Runtime settings of the archiver.
///
/// Built from the command line by [`Config::from_args`], which resolves
/// every path and rejects inconsistent combinations before any work starts.
///
/// # Examples
///
/// ```
/// use playlist_archiver::Config;
///
/// let config = Config::default();
/// assert!(config.threads > 0);
/// assert_eq!(config.slot_count(), config.threads);
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub threads: usize,
    pub daemon: bool,
    pub daemon_sleep: Duration,
    pub ratelimit_sleep: Duration,
    pub ignore_downloaded: bool,
    pub erase_downloaded_tracker: bool,
    pub backwards: bool,
    pub silence_errors: bool,
    pub no_update: bool,
    pub rm_cache: bool,
    pub verbose: bool,
    pub max_size_mb: u64,
    pub output: Option<PathBuf>,
    pub archive_dir: PathBuf,
    pub log_dir: PathBuf,
    pub libraries_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let archive_dir = default_archive_dir();
        Self {
            threads: default_threads(),
            daemon: false,
            daemon_sleep: Duration::from_secs(60 * 60),
            ratelimit_sleep: Duration::from_secs(5),
            ignore_downloaded: false,
            erase_downloaded_tracker: false,
            backwards: false,
            silence_errors: false,
            no_update: false,
            rm_cache: false,
            verbose: false,
            max_size_mb: 1100,
            output: None,
            libraries_dir: archive_dir.join("libs"),
            archive_dir,
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl Config {
    /// Validates `args` and resolves every path to an absolute one.
    ///
    /// # Errors
    /// Returns [`AppError::Config`] if:
    /// - `--threads` is 0
    /// - `--sleep` is negative, not a number or too long
    /// - neither `--output` nor `--log-dir` is given
    pub fn from_args(args: &Args) -> Result<Self> {
        let threads = match args.threads {
            Some(0) => {
                return Err(AppError::Config(
                    "--threads must be at least 1".into(),
                ))
            }
            Some(n) => n,
            None => default_threads(),
        };

        if !args.sleep.is_finite() || args.sleep < 0.0 {
            return Err(AppError::Config(format!(
                "--sleep must be a positive number of minutes, got {}",
                args.sleep
            )));
        }

        let daemon_sleep = Duration::try_from_secs_f64(args.sleep * 60.0).map_err(|_| {
            AppError::Config(format!("--sleep of {} minutes is too long", args.sleep))
        })?;

        let output = args.output.as_deref().map(resolve_path).transpose()?;
        let log_dir = match (&args.log_dir, &output) {
            (Some(dir), _) => resolve_path(dir)?,
            (None, Some(output)) => output.join("logs"),
            (None, None) => {
                return Err(AppError::Config(
                    "You must specify a log directory with --log-dir when --output is not set."
                        .into(),
                ))
            }
        };

        let archive_dir = match &args.download_cache_file_directory {
            Some(dir) => resolve_path(dir)?,
            None => default_archive_dir(),
        };
        let libraries_dir = match &args.libraries_dir {
            Some(dir) => resolve_path(dir)?,
            None => archive_dir.join("libs"),
        };

        Ok(Self {
            threads,
            daemon: args.daemon,
            daemon_sleep,
            ratelimit_sleep: Duration::from_secs(args.ratelimit_sleep),
            ignore_downloaded: args.ignore_downloaded,
            erase_downloaded_tracker: args.erase_downloaded_tracker,
            backwards: args.backwards,
            silence_errors: args.silence_errors,
            no_update: args.no_update,
            rm_cache: args.rm_cache,
            verbose: args.verbose,
            max_size_mb: args.max_size,
            output,
            archive_dir,
            log_dir,
            libraries_dir,
        })
    }

    /// Number of per-video progress lines. Daemon mode draws none.
    pub fn slot_count(&self) -> usize {
        if self.daemon {
            0
        } else {
            self.threads
        }
    }

    pub fn queue_options(&self) -> QueueOptions {
        QueueOptions {
            ignore_archive: self.ignore_downloaded,
            backwards: self.backwards,
        }
    }

    /// Archive file of one playlist.
    pub fn archive_path(&self, playlist_id: &str) -> PathBuf {
        self.archive_dir
            .join(format!("{}.log", playlist_id.replace(['/', '\\'], "_")))
    }
}

/// Expands a leading `~` and makes `path` absolute against the working
/// directory. The path does not have to exist.
pub fn resolve_path(path: &Path) -> Result<PathBuf> {
    let expanded = match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    };

    if expanded.is_absolute() {
        Ok(expanded)
    } else {
        Ok(std::env::current_dir()?.join(expanded))
    }
}

fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_archive_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("playlist-archiver"))
        .unwrap_or_else(|| PathBuf::from(".playlist-archiver"))
}
