use crate::input::InputDatatype;
use clap::Parser;
use std::path::PathBuf;

/// Command line surface of the archiver.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "playlist-archiver",
    version,
    about = "Archive YouTube playlists with yt-dlp, skipping videos already downloaded"
)]
pub struct Args {
    /// URL to download, or path of a text or CSV file of URLs
    pub file: String,

    /// Output directory. Ignored for CSV input, which names its own directories
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Do not update yt-dlp before each cycle
    #[arg(short = 'n', long)]
    pub no_update: bool,

    /// Maximum video size in MB
    #[arg(long, default_value_t = 1100)]
    pub max_size: u64,

    /// Remove the yt-dlp cache directory before starting
    #[arg(short = 'r', long)]
    pub rm_cache: bool,

    /// Number of concurrent downloads [default: number of CPUs]
    #[arg(long)]
    pub threads: Option<usize>,

    /// Run forever, sleeping between cycles
    #[arg(short = 'd', long)]
    pub daemon: bool,

    /// Minutes to sleep between daemon cycles
    #[arg(long, default_value_t = 60.0)]
    pub sleep: f64,

    /// Where the per-playlist download archives are kept
    #[arg(long)]
    pub download_cache_file_directory: Option<PathBuf>,

    /// Do not print per-video errors to the terminal
    #[arg(short = 's', long)]
    pub silence_errors: bool,

    /// Download videos even if they are in the archive
    #[arg(short = 'i', long)]
    pub ignore_downloaded: bool,

    /// Delete each playlist's archive the first time it is visited
    #[arg(short = 'e', long)]
    pub erase_downloaded_tracker: bool,

    /// Seconds to wait between two URLs
    #[arg(long, default_value_t = 5)]
    pub ratelimit_sleep: u64,

    /// How to read `file`
    #[arg(long, value_enum, default_value_t = InputDatatype::Auto)]
    pub input_datatype: InputDatatype,

    /// Log directory [default: <output>/logs]
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Directory holding the yt-dlp and ffmpeg binaries
    #[arg(long)]
    pub libraries_dir: Option<PathBuf>,

    /// Download playlists from the last entry to the first
    #[arg(short = 'b', long)]
    pub backwards: bool,

    /// Debug level logging
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["playlist-archiver", "urls.txt"]).unwrap();

        assert_eq!(args.file, "urls.txt");
        assert_eq!(args.max_size, 1100);
        assert_eq!(args.sleep, 60.0);
        assert_eq!(args.ratelimit_sleep, 5);
        assert_eq!(args.input_datatype, InputDatatype::Auto);
        assert!(args.threads.is_none());
        assert!(!args.daemon);
    }

    #[test]
    fn test_short_flags() {
        let args = Args::try_parse_from([
            "playlist-archiver",
            "-d",
            "-s",
            "-i",
            "-e",
            "-b",
            "-n",
            "-r",
            "--threads",
            "3",
            "--input-datatype",
            "csv",
            "list.csv",
        ])
        .unwrap();

        assert!(args.daemon && args.silence_errors && args.ignore_downloaded);
        assert!(args.erase_downloaded_tracker && args.backwards);
        assert!(args.no_update && args.rm_cache);
        assert_eq!(args.threads, Some(3));
        assert_eq!(args.input_datatype, InputDatatype::Csv);
    }
}
