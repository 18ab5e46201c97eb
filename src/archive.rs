use crate::error::Result;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;

/// Persistent record of downloaded video ids.
///
/// Backed by an append-only text file with one id per line. The file is read
/// once when opened; every successful download appends a line that is
/// flushed and synced before [`DownloadArchive::append`] returns.
#[derive(Debug)]
pub struct DownloadArchive {
    path: PathBuf,
    ids: HashSet<String>,
    file: File,
}

impl DownloadArchive {
    /// Opens the archive at `path`, creating an empty one if it does not exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        let ids = read_ids(&path).await?;

        Ok(Self { path, ids, file })
    }

    /// Archive whose handle refuses writes, for exercising append failures.
    #[cfg(test)]
    pub(crate) async fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).await?;
        let ids = read_ids(&path).await?;

        Ok(Self { path, ids, file })
    }

    /// Deletes the archive file if present.
    pub async fn erase(path: impl AsRef<Path>) -> Result<bool> {
        match fs::remove_file(path.as_ref()).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Ids known when the archive was opened plus those appended since.
    pub fn snapshot(&self) -> &HashSet<String> {
        &self.ids
    }

    pub async fn append(&mut self, id: &str) -> Result<()> {
        self.file.write_all(format!("{}\n", id).as_bytes()).await?;
        self.file.flush().await?;
        self.file.sync_data().await?;
        self.ids.insert(id.to_string());
        Ok(())
    }
}

async fn read_ids(path: &Path) -> Result<HashSet<String>> {
    let content = fs::read_to_string(path).await?;
    Ok(content
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}
