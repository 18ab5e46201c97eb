use crate::engine::ProgressUpdate;
use crate::queue::WorkItem;
use crate::reclaimer::SlotCanvas;
use indicatif::{HumanBytes, MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing::Level;

/// Terminal progress display.
///
/// The board owns a fixed stack of lines: the inputs bar, the current
/// playlist bar, a status line and one persistent bar per display slot.
/// Slot bars are reused from video to video; an idle slot renders as an
/// empty line.

const PREFIX_WIDTH: usize = 40;

const INPUTS_TEMPLATE: &str = "{msg} {wide_bar} {pos}/{len}";
const PLAYLIST_TEMPLATE: &str = "{msg} {percent:>3}%|{wide_bar}| {pos}/{len} [{elapsed}<{eta}]";
const ITEM_TEMPLATE: &str = "{prefix} {percent:>3}%|{wide_bar}| {elapsed}<{eta} {msg}";
const LINE_TEMPLATE: &str = "{msg}";

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_bar())
}

fn blank(bar: &ProgressBar) {
    bar.reset();
    bar.set_style(style(LINE_TEMPLATE));
    bar.set_prefix("");
    bar.set_message("");
}

/// Percentage of `downloaded` over `total`, rounded and capped at 100.
pub fn percent_of(downloaded: u64, total: u64) -> Option<u64> {
    if total == 0 {
        return None;
    }
    let percent = (downloaded as f64 / total as f64 * 100.0).round() as u64;
    Some(percent.min(100))
}

/// Fixed-width `<id> - <title>` label for an item bar.
pub fn describe(item: &WorkItem) -> String {
    let label: String = format!("{} - {}", item.id, item.title)
        .chars()
        .take(PREFIX_WIDTH)
        .collect();
    format!("{:<width$}", label, width = PREFIX_WIDTH)
}

/// Progress output for one video, bound to a slot bar or to nothing.
///
/// The displayed percentage only moves forward until the sink is closed.
#[derive(Clone, Debug)]
pub struct ProgressSink {
    bar: Option<ProgressBar>,
}

impl ProgressSink {
    /// A sink that discards everything, used when no slot is held.
    pub fn noop() -> Self {
        Self { bar: None }
    }

    fn attached(bar: ProgressBar, item: &WorkItem) -> Self {
        bar.reset();
        bar.set_length(100);
        bar.set_style(style(ITEM_TEMPLATE));
        bar.set_prefix(describe(item));
        bar.set_message("");
        Self { bar: Some(bar) }
    }

    pub fn is_noop(&self) -> bool {
        self.bar.is_none()
    }

    /// Currently displayed percentage.
    pub fn percent(&self) -> u64 {
        self.bar.as_ref().map_or(0, ProgressBar::position)
    }

    pub fn update(&self, update: &ProgressUpdate) {
        let Some(bar) = &self.bar else {
            return;
        };

        if let (Some(downloaded), Some(total)) = (update.downloaded_bytes, update.total_bytes) {
            if let Some(percent) = percent_of(downloaded, total) {
                self.advance_to(percent);
            }
            let speed = update
                .speed
                .map(|s| format!("{}/s ", HumanBytes(s as u64)))
                .unwrap_or_default();
            bar.set_message(format!(
                "{}{}/{}",
                speed,
                HumanBytes(downloaded),
                HumanBytes(total)
            ));
        }
    }

    pub fn advance_to(&self, percent: u64) {
        if let Some(bar) = &self.bar {
            let percent = percent.min(100);
            if percent > bar.position() {
                bar.set_position(percent);
            }
        }
    }

    /// Jumps to 100% so a failed video does not look stuck.
    pub fn complete(&self) {
        self.advance_to(100);
    }

    /// Returns the slot line to its idle, empty state.
    pub fn close(&self) {
        if let Some(bar) = &self.bar {
            blank(bar);
        }
    }
}

/// The whole terminal display of a run.
pub struct Board {
    multi: MultiProgress,
    inputs: ProgressBar,
    playlist: ProgressBar,
    status: ProgressBar,
    slots: Vec<ProgressBar>,
    interactive: bool,
}

impl Board {
    /// Board drawn to stderr with `slot_count` item lines.
    pub fn interactive(slot_count: usize) -> Self {
        Self::build(MultiProgress::new(), slot_count, true)
    }

    /// Board that renders nothing. Used in daemon mode.
    pub fn hidden(slot_count: usize) -> Self {
        Self::build(
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden()),
            slot_count,
            false,
        )
    }

    fn build(multi: MultiProgress, slot_count: usize, interactive: bool) -> Self {
        let inputs = multi.add(ProgressBar::new(0));
        inputs.set_style(style(INPUTS_TEMPLATE));
        inputs.set_message("Inputs");

        let playlist = multi.add(ProgressBar::new(0));
        blank(&playlist);
        let status = multi.add(ProgressBar::new(0));
        blank(&status);

        let slots = (0..slot_count)
            .map(|_| {
                let bar = multi.add(ProgressBar::new(100));
                blank(&bar);
                bar
            })
            .collect();

        Self {
            multi,
            inputs,
            playlist,
            status,
            slots,
            interactive,
        }
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Sink for `item` drawn on the bar of slot `index`.
    pub fn sink(&self, index: usize, item: &WorkItem) -> ProgressSink {
        match self.slots.get(index) {
            Some(bar) => ProgressSink::attached(bar.clone(), item),
            None => ProgressSink::noop(),
        }
    }

    pub fn start_inputs(&self, total: usize) {
        self.inputs.reset();
        self.inputs.set_length(total as u64);
    }

    pub fn advance_inputs(&self) {
        self.inputs.inc(1);
    }

    pub fn start_playlist(&self, title: &str, id: &str, total: usize, already_done: usize) {
        self.playlist.reset();
        self.playlist.set_style(style(PLAYLIST_TEMPLATE));
        self.playlist.set_length(total as u64);
        self.playlist.set_position(already_done.min(total) as u64);
        self.playlist.set_message(format!("\"{}\" ({})", title, id));
    }

    pub fn advance_playlist(&self) {
        self.playlist.inc(1);
    }

    pub fn playlist_position(&self) -> u64 {
        self.playlist.position()
    }

    /// Replaces the one-line status text.
    pub fn set_status(&self, msg: impl Into<String>) {
        let msg = msg.into();
        if self.interactive {
            self.status.set_message(msg);
        } else {
            tracing::info!("{}", msg);
        }
    }

    /// Prints a message above the bars and mirrors it to the log.
    pub fn write(&self, level: Level, msg: &str) {
        match level {
            Level::ERROR => tracing::error!("{}", msg),
            Level::WARN => tracing::warn!("{}", msg),
            _ => tracing::info!("{}", msg),
        }
        if self.interactive {
            let line = match level {
                Level::ERROR => format!("[error] {}", msg),
                Level::WARN => format!("[warning] {}", msg),
                _ => msg.to_string(),
            };
            if let Err(e) = self.multi.println(line) {
                tracing::debug!("Could not print to terminal: {}", e);
            }
        }
    }

    /// Clears every line. Called once at shutdown.
    pub fn finish(&self) {
        for bar in &self.slots {
            bar.finish_and_clear();
        }
        self.status.finish_and_clear();
        self.playlist.finish_and_clear();
        self.inputs.finish_and_clear();
    }
}

impl SlotCanvas for Board {
    fn clear(&self, index: usize) {
        if let Some(bar) = self.slots.get(index) {
            blank(bar);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str) -> WorkItem {
        WorkItem {
            id: id.to_string(),
            title: format!("title of {}", id),
            source_url: format!("https://example.com/{}", id),
        }
    }

    #[test]
    fn test_percent_of() {
        assert_eq!(percent_of(0, 0), None);
        assert_eq!(percent_of(0, 200), Some(0));
        assert_eq!(percent_of(101, 200), Some(51));
        assert_eq!(percent_of(300, 200), Some(100));
    }

    #[test]
    fn test_describe_is_fixed_width() {
        let long = WorkItem {
            title: "x".repeat(200),
            ..item("abc")
        };
        assert_eq!(describe(&long).chars().count(), PREFIX_WIDTH);
        assert!(describe(&item("a")).starts_with("a - title of a"));
        assert_eq!(describe(&item("a")).chars().count(), PREFIX_WIDTH);
    }

    #[test]
    fn test_sink_percent_never_goes_backwards() {
        let board = Board::hidden(1);
        let sink = board.sink(0, &item("a"));

        sink.update(&ProgressUpdate {
            downloaded_bytes: Some(60),
            total_bytes: Some(100),
            speed: Some(10.0),
        });
        assert_eq!(sink.percent(), 60);

        // A new stream (e.g. audio after video) restarts its own byte count.
        sink.update(&ProgressUpdate {
            downloaded_bytes: Some(10),
            total_bytes: Some(100),
            speed: None,
        });
        assert_eq!(sink.percent(), 60);

        sink.complete();
        assert_eq!(sink.percent(), 100);

        sink.close();
        assert_eq!(sink.percent(), 0);
    }

    #[test]
    fn test_sink_ignores_updates_without_totals() {
        let board = Board::hidden(1);
        let sink = board.sink(0, &item("a"));

        sink.update(&ProgressUpdate {
            downloaded_bytes: Some(60),
            total_bytes: None,
            speed: None,
        });
        assert_eq!(sink.percent(), 0);
    }

    #[test]
    fn test_out_of_range_slot_gives_noop_sink() {
        let board = Board::hidden(2);
        assert!(!board.sink(1, &item("a")).is_noop());
        assert!(board.sink(2, &item("a")).is_noop());

        let noop = ProgressSink::noop();
        noop.complete();
        assert_eq!(noop.percent(), 0);
    }

    #[test]
    fn test_clear_resets_slot_bar() {
        let board = Board::hidden(1);
        let sink = board.sink(0, &item("a"));
        sink.advance_to(42);

        board.clear(0);
        assert_eq!(sink.percent(), 0);
        board.clear(7);
    }

    #[test]
    fn test_playlist_bar_starts_at_archive_size() {
        let board = Board::hidden(0);
        board.start_playlist("Mix", "PL1", 10, 4);
        assert_eq!(board.playlist_position(), 4);
        board.advance_playlist();
        assert_eq!(board.playlist_position(), 5);

        board.start_playlist("Other", "PL2", 3, 9);
        assert_eq!(board.playlist_position(), 3);
    }
}
