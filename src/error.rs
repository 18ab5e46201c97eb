use std::io;
use thiserror::Error;

/// Error types for the application.
///
/// Only startup and playlist-level failures travel through [`AppError`].
/// Failures of a single video are captured in its `WorkResult` instead and
/// never leave the worker pool.

/// Represents all possible errors that can occur in the application.
///
/// # Error Categories
///
/// - IO: File system operations (archives, log files, child processes)
/// - Config: Invalid command line or paths, fatal before any work starts
/// - Engine: The download engine could not list a playlist
/// - Parsing: URL, CSV and JSON parsing
/// - Custom: Application-specific errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Input error: {0}")]
    Input(String),

    #[error("Youtube error: {0}")]
    Youtube(#[from] yt_dlp::error::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Interrupted")]
    Interrupted,

    #[error("{0}")]
    Custom(String),
}

impl AppError {
    /// Whether this error should stop the process before any download starts.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::Config(_) | AppError::Input(_))
    }
}

impl From<&str> for AppError {
    fn from(error: &str) -> Self {
        AppError::Custom(error.to_string())
    }
}

impl From<String> for AppError {
    fn from(error: String) -> Self {
        AppError::Custom(error)
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
