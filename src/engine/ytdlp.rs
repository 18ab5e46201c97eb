use super::{Engine, FetchRequest, FetchStatus, ProgressUpdate};
use crate::error::{AppError, Result};
use crate::logging::LogSink;
use crate::queue::{Playlist, WorkItem};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, instrument};
use yt_dlp::fetcher::deps::Libraries;
use yt_dlp::Youtube;

/// Output file name pattern inside a target directory. The fields are
/// bracketed so a leading dash in a title is never read as an option.
pub const OUTPUT_TEMPLATE: &str = "[%(id)s] [%(title)s] [%(uploader)s] [%(uploader_id)s].%(ext)s";

const PROGRESS_MARKER: &str = "[progress]";
const PROGRESS_TEMPLATE: &str = "download:[progress] %(progress.downloaded_bytes)s %(progress.total_bytes)s %(progress.total_bytes_estimate)s %(progress.speed)s";

/// Options applied to every download.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Largest accepted video stream, in megabytes.
    pub max_size_mb: u64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self { max_size_mb: 1100 }
    }
}

/// Engine backed by the yt-dlp executable.
///
/// Binaries are installed and updated through the `yt-dlp` crate; listing
/// and downloading run the executable directly so its output can be
/// streamed line by line into the item log and the progress bar.
pub struct YtDlpEngine {
    youtube: Youtube,
    options: EngineOptions,
}

impl YtDlpEngine {
    /// Locates or installs yt-dlp and ffmpeg in `libraries_dir`.
    ///
    /// # Details
    /// Checks for existing yt-dlp and ffmpeg binaries. If either is missing,
    /// fresh ones are downloaded; otherwise the existing ones are used.
    #[instrument(skip(options))]
    pub async fn initialize(
        libraries_dir: &Path,
        work_dir: &Path,
        options: EngineOptions,
    ) -> Result<Self> {
        let yt_dlp = libraries_dir.join("yt-dlp");
        let ffmpeg = libraries_dir.join("ffmpeg");

        let youtube = if !yt_dlp.exists() || !ffmpeg.exists() {
            Youtube::with_new_binaries(libraries_dir.to_path_buf(), work_dir.to_path_buf()).await?
        } else {
            let libraries = Libraries::new(yt_dlp, ffmpeg);
            Youtube::new(libraries, work_dir.to_path_buf())?
        };

        Ok(Self { youtube, options })
    }

    fn binary(&self) -> &Path {
        &self.youtube.libraries.youtube
    }

    fn ffmpeg(&self) -> &Path {
        &self.youtube.libraries.ffmpeg
    }

    /// Empties yt-dlp's cache directory.
    pub async fn remove_cache(&self) -> Result<()> {
        let status = Command::new(self.binary())
            .arg("--rm-cache-dir")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;
        if !status.success() {
            return Err(AppError::Engine(format!(
                "yt-dlp --rm-cache-dir exited with {}",
                status
            )));
        }
        Ok(())
    }

    pub fn download_args(&self, request: &FetchRequest) -> Vec<String> {
        download_args(
            request,
            &self.options,
            &self.ffmpeg().to_string_lossy(),
        )
    }
}

/// Full yt-dlp command line for one download.
pub fn download_args(request: &FetchRequest, options: &EngineOptions, ffmpeg: &str) -> Vec<String> {
    let selector = format_selector(options.max_size_mb);
    let mut args: Vec<String> = [
        "--format",
        selector.as_str(),
        "--merge-output-format",
        "mkv",
        "--embed-chapters",
        "--embed-metadata",
        "--embed-subs",
        "--write-thumbnail",
        "--embed-thumbnail",
        "--convert-thumbnails",
        "jpg",
        "--write-subs",
        "--write-auto-subs",
        "--sub-format",
        "vtt",
        "--sub-langs",
        "en",
        "--write-description",
        "--write-info-json",
        "--ignore-errors",
        "--no-continue",
        "--ffmpeg-location",
        ffmpeg,
        "--newline",
        "--progress-template",
        PROGRESS_TEMPLATE,
        "--output",
        request.output_template.as_str(),
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    args.push("--".to_string());
    args.push(request.url.clone());
    args
}

/// Video format preference.
///
/// AV1, then VP9.2, then VP9 at 1080p or more, high frame rate first; the
/// same ladder again at 720p; then any video under the size cap. Best opus
/// audio is merged in, with a single-file `best` as the last resort.
pub fn format_selector(max_size_mb: u64) -> String {
    let cap = format!("[filesize<{}M]", max_size_mb);
    let mut video = Vec::new();
    for height in [1080, 720] {
        for fps in ["[fps>30]", ""] {
            for codec in ["[vcodec^=av01]", "[vcodec=vp9.2]", "[vcodec=vp9]"] {
                video.push(format!("bestvideo{}{}[height>={}]{}", cap, codec, height, fps));
            }
        }
        video.push(format!("bestvideo{}[height>={}]", cap, height));
    }
    video.push(format!("bestvideo{}", cap));

    format!("({})+(bestaudio[acodec=opus]/bestaudio)/best", video.join("/"))
}

/// Parses a line produced by [`PROGRESS_TEMPLATE`]. Missing values are `NA`.
pub fn parse_progress(line: &str) -> Option<ProgressUpdate> {
    let rest = line.trim().strip_prefix(PROGRESS_MARKER)?;
    let fields: Vec<&str> = rest.split_whitespace().collect();
    let number = |i: usize| fields.get(i).and_then(|v| v.parse::<f64>().ok());

    Some(ProgressUpdate {
        downloaded_bytes: number(0).map(|v| v as u64),
        total_bytes: number(1).or_else(|| number(2)).map(|v| v as u64),
        speed: number(3),
    })
}

fn route_line(line: &str, log: &dyn LogSink) {
    let line = line.trim_end();
    if line.is_empty() {
        return;
    }
    if line.starts_with("ERROR:") {
        log.error(line);
    } else if line.starts_with("WARNING:") {
        log.warning(line);
    } else if line.starts_with("[debug]") {
        log.debug(line);
    } else {
        log.info(line);
    }
}

async fn pump_lines<R>(
    reader: R,
    log: &dyn LogSink,
    progress: Option<&(dyn Fn(ProgressUpdate) + Send + Sync)>,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        match (progress, parse_progress(&line)) {
            (Some(report), Some(update)) => report(update),
            _ => route_line(&line, log),
        }
    }
    Ok(())
}

fn watch_url(id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", id)
}

#[derive(Debug, Deserialize)]
struct RawListing {
    #[serde(rename = "_type", default)]
    kind: Option<String>,
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    webpage_url: Option<String>,
    #[serde(default)]
    entries: Option<Vec<Option<RawEntry>>>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

/// Turns `yt-dlp -J --flat-playlist` output into a [`Playlist`].
pub fn parse_listing(json: &str) -> Result<Playlist> {
    let raw: RawListing = serde_json::from_str(json)?;
    let title = raw.title.clone().unwrap_or_else(|| raw.id.clone());

    let entries = match raw.kind.as_deref().unwrap_or("video") {
        "playlist" => raw
            .entries
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .filter_map(|entry| {
                let id = entry.id?;
                Some(WorkItem {
                    title: entry.title.unwrap_or_else(|| id.clone()),
                    source_url: entry.url.unwrap_or_else(|| watch_url(&id)),
                    id,
                })
            })
            .collect(),
        "video" => vec![WorkItem {
            id: raw.id.clone(),
            title: title.clone(),
            source_url: raw
                .webpage_url
                .clone()
                .unwrap_or_else(|| watch_url(&raw.id)),
        }],
        other => {
            return Err(AppError::Engine(format!("Unknown media type: {}", other)));
        }
    };

    Ok(Playlist {
        id: raw.id,
        title,
        entries,
    })
}

#[async_trait]
impl Engine for YtDlpEngine {
    #[instrument(skip(self))]
    async fn list_playlist(&self, url: &str) -> Result<Playlist> {
        let output = Command::new(self.binary())
            .args(["--dump-single-json", "--flat-playlist", "--skip-download", "--", url])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines() {
            debug!("{}", line);
        }

        if !output.status.success() {
            let reason = stderr
                .lines()
                .rev()
                .find(|line| line.starts_with("ERROR:"))
                .map(str::to_string)
                .unwrap_or_else(|| format!("yt-dlp exited with {}", output.status));
            return Err(AppError::Engine(reason));
        }

        parse_listing(&String::from_utf8_lossy(&output.stdout))
    }

    async fn fetch(
        &self,
        request: &FetchRequest,
        progress: &(dyn Fn(ProgressUpdate) + Send + Sync),
        log: &dyn LogSink,
    ) -> Result<FetchStatus> {
        let mut child = Command::new(self.binary())
            .args(self.download_args(request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child.stdout.take().ok_or("yt-dlp stdout was not captured")?;
        let stderr = child.stderr.take().ok_or("yt-dlp stderr was not captured")?;

        let (out, err) = tokio::join!(
            pump_lines(stdout, log, Some(progress)),
            pump_lines(stderr, log, None)
        );
        out?;
        err?;

        let status = child.wait().await?;
        if status.success() {
            Ok(FetchStatus::Completed)
        } else {
            Ok(FetchStatus::Failed(status.code().unwrap_or(-1)))
        }
    }

    async fn refresh(&self) -> Result<()> {
        self.youtube.update_downloader().await?;
        Ok(())
    }
}

impl std::fmt::Debug for YtDlpEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YtDlpEngine")
            .field("binary", &PathBuf::from(self.binary()))
            .field("options", &self.options)
            .finish()
    }
}
