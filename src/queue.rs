use std::collections::HashSet;

/// One playlist entry scheduled for download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub id: String,
    pub title: String,
    pub source_url: String,
}

/// Flat listing of a playlist (or a single video presented as a playlist of one).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Playlist {
    pub id: String,
    pub title: String,
    pub entries: Vec<WorkItem>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueOptions {
    /// Keep entries that are already in the archive.
    pub ignore_archive: bool,
    /// Download in reverse playlist order.
    pub backwards: bool,
}

/// Removes repeated ids, keeping the first occurrence and the original order.
pub fn dedup_entries(entries: Vec<WorkItem>) -> Vec<WorkItem> {
    let mut seen = HashSet::with_capacity(entries.len());
    entries
        .into_iter()
        .filter(|entry| seen.insert(entry.id.clone()))
        .collect()
}

/// The ordered, duplicate-free list of videos still to download.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkQueue {
    items: Vec<WorkItem>,
}

impl WorkQueue {
    /// Builds the queue from a raw listing and a snapshot of the archive.
    ///
    /// Entries are deduplicated first, then archived ids are dropped unless
    /// `ignore_archive` is set, then the order is optionally reversed.
    pub fn build(
        entries: Vec<WorkItem>,
        archived: &HashSet<String>,
        options: QueueOptions,
    ) -> Self {
        let mut items: Vec<WorkItem> = dedup_entries(entries)
            .into_iter()
            .filter(|item| options.ignore_archive || !archived.contains(&item.id))
            .collect();

        if options.backwards {
            items.reverse();
        }

        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    pub fn ids(&self) -> Vec<&str> {
        self.items.iter().map(|item| item.id.as_str()).collect()
    }
}

impl IntoIterator for WorkQueue {
    type Item = WorkItem;
    type IntoIter = std::vec::IntoIter<WorkItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
