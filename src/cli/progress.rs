//! Progress display for a case save.
//!
//! Also provides global progress context for coordinating output from
//! any part of the application during progress display.

use std::collections::HashSet;
use std::sync::{Mutex, OnceLock, RwLock};
use std::time::Duration;

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::messaging::OverallState;
use crate::models::{DocumentIdentifier, DownloadState};

/// Global reference to active progress display for coordinating output.
static ACTIVE_PROGRESS: OnceLock<RwLock<Option<MultiProgress>>> = OnceLock::new();

fn get_active_progress() -> &'static RwLock<Option<MultiProgress>> {
    ACTIVE_PROGRESS.get_or_init(|| RwLock::new(None))
}

/// Set the global active progress display.
pub fn set_active_progress(multi: Option<MultiProgress>) {
    if let Ok(mut guard) = get_active_progress().write() {
        *guard = multi;
    }
}

/// Print a message that coordinates with any active progress display.
/// Falls back to println! if no progress display is active.
pub fn progress_println(message: &str) {
    if let Ok(guard) = get_active_progress().read() {
        if let Some(ref multi) = *guard {
            let _ = multi.println(message);
            return;
        }
    }
    println!("{}", message);
}

#[derive(Default)]
struct Tally {
    seen: HashSet<DocumentIdentifier>,
    finished: HashSet<DocumentIdentifier>,
    complete: usize,
    interrupted: usize,
}

/// Summary bar plus a status line for one case.
///
/// The document count isn't known up front; the bar grows as documents
/// are first reported.
pub struct CaseProgress {
    multi: MultiProgress,
    summary_bar: ProgressBar,
    status_bar: ProgressBar,
    tally: Mutex<Tally>,
}

impl CaseProgress {
    pub fn new() -> Self {
        let multi = MultiProgress::new();

        let summary_bar = multi.add(ProgressBar::new(0));
        summary_bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} {msg} [{bar:30.cyan/blue}] {pos}/{len}")
                .unwrap()
                .progress_chars("█▓░"),
        );
        summary_bar.set_message("Probing");

        let status_bar = multi.add(ProgressBar::new_spinner());
        status_bar.set_style(
            ProgressStyle::default_spinner()
                .template("  {spinner:.cyan} {wide_msg}")
                .unwrap(),
        );
        status_bar.enable_steady_tick(Duration::from_millis(100));

        // Register as active progress display for coordinated output
        set_active_progress(Some(multi.clone()));

        Self {
            multi,
            summary_bar,
            status_bar,
            tally: Mutex::new(Tally::default()),
        }
    }

    /// A document entered the in-progress state.
    pub fn start_document(&self, id: &DocumentIdentifier) {
        let mut tally = self.tally.lock().unwrap_or_else(|e| e.into_inner());
        if tally.seen.insert(id.clone()) {
            self.summary_bar.inc_length(1);
        }
        self.status_bar
            .set_message(truncate_label(&id.to_string(), 60));
    }

    /// A document reached a terminal state. Repeats are ignored.
    pub fn finish_document(&self, id: &DocumentIdentifier, state: DownloadState) {
        let mut tally = self.tally.lock().unwrap_or_else(|e| e.into_inner());
        if tally.seen.insert(id.clone()) {
            self.summary_bar.inc_length(1);
        }
        if !tally.finished.insert(id.clone()) {
            return;
        }

        match state {
            DownloadState::Complete => tally.complete += 1,
            _ => {
                tally.interrupted += 1;
                self.println(&format!("{} {}", style("✗").red(), id));
            }
        }
        self.summary_bar.inc(1);
        self.summary_bar.set_message(format!(
            "Complete: {} | Interrupted: {}",
            tally.complete, tally.interrupted
        ));
    }

    pub fn set_overall(&self, state: OverallState) {
        let message = match state {
            OverallState::Downloading => "Downloading",
            OverallState::Done => "Done",
            OverallState::Failed => "Failed",
        };
        self.status_bar.set_message(message);
    }

    /// Finish all progress bars and clear the display.
    pub fn finish(&self) {
        self.status_bar.finish_and_clear();
        self.summary_bar.finish_and_clear();

        // Unregister active progress display
        set_active_progress(None);
    }

    /// Print a message that coordinates with the progress display.
    pub fn println(&self, message: &str) {
        let _ = self.multi.println(message);
    }
}

impl Default for CaseProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Truncate a label for display, keeping the tail visible.
fn truncate_label(label: &str, max_chars: usize) -> String {
    let count = label.chars().count();
    if count <= max_chars {
        return label.to_string();
    }
    let tail: String = label.chars().skip(count - (max_chars - 3)).collect();
    format!("...{}", tail)
}
