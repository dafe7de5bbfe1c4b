//! Case documents table reconciliation.
//!
//! The site renders grouped rows: only the first row of an event repeats the
//! event text, so the walk carries the last seen event forward. Rows that do
//! not look like document rows are skipped one at a time; nothing here fails
//! the whole scrape.

use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

use super::case_page::element_text;
use super::uniquify::uniquify;
use crate::models::{CourtDocument, DocumentIdentifier, DocumentSet};
use crate::utils::{normalize_event, DateSeparator, UNKNOWN_EVENT};

/// Class marking a status cell this tool injected into a row.
pub const STATUS_CELL_CLASS: &str = "casedocs-status";

/// Query parameter carrying a document's numeric id.
pub const FRAGMENT_ID_PARAM: &str = "DocumentFragmentID";

/// Number of data cells in a document row: event/date, link, extra.
const EXPECTED_CELLS: usize = 3;

static TABLE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").unwrap());
static HEADER_CELL_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("th").unwrap());
static ROW_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static ANCHOR_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());

/// What happened to a single table row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    /// A document was added (or replaced an earlier one with the same id).
    Document(DocumentIdentifier),
    /// Header row with no data cells.
    Header,
    /// Row did not have exactly three data cells.
    WrongCellCount(usize),
    /// No link in the second cell.
    MissingLink,
    /// Link has no numeric `DocumentFragmentID`.
    MissingFragmentId,
}

/// Counters describing one reconciliation walk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    pub rows: usize,
    pub documents: usize,
    pub skipped_cell_count: usize,
    pub skipped_missing_link: usize,
    pub skipped_missing_fragment: usize,
    pub duplicates: usize,
}

impl ReconcileStats {
    pub fn skipped(&self) -> usize {
        self.skipped_cell_count + self.skipped_missing_link + self.skipped_missing_fragment
    }
}

/// Row-by-row state machine that builds the identifier-to-document map.
pub struct TableReconciler<'a> {
    base_url: &'a Url,
    separator: DateSeparator,
    last_event: String,
    documents: DocumentSet,
    stats: ReconcileStats,
}

impl<'a> TableReconciler<'a> {
    pub fn new(base_url: &'a Url, separator: DateSeparator) -> Self {
        Self {
            base_url,
            separator,
            last_event: String::new(),
            documents: DocumentSet::new(),
            stats: ReconcileStats::default(),
        }
    }

    /// Process one `<tr>`, in document order.
    pub fn process_row(&mut self, row: ElementRef<'_>) -> RowOutcome {
        let cells: Vec<ElementRef<'_>> = row
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|el| el.value().name() == "td")
            .filter(|el| !el.value().classes().any(|c| c == STATUS_CELL_CLASS))
            .collect();

        if cells.is_empty() {
            return RowOutcome::Header;
        }

        self.stats.rows += 1;

        if cells.len() != EXPECTED_CELLS {
            debug!(
                "Found an unexpected number of cells: {}, skipping row",
                cells.len()
            );
            self.stats.skipped_cell_count += 1;
            return RowOutcome::WrongCellCount(cells.len());
        }

        let event_text = element_text(&cells[0]);
        if !event_text.is_empty() {
            self.last_event = normalize_event(&event_text, self.separator);
        }
        if self.last_event.is_empty() {
            self.last_event = UNKNOWN_EVENT.to_string();
        }

        let Some(link) = cells[1].select(&ANCHOR_SELECTOR).next() else {
            debug!("No link in row under event {:?}, skipping", self.last_event);
            self.stats.skipped_missing_link += 1;
            return RowOutcome::MissingLink;
        };
        let Some(href) = link.value().attr("href") else {
            debug!("Link without href under event {:?}, skipping", self.last_event);
            self.stats.skipped_missing_link += 1;
            return RowOutcome::MissingLink;
        };

        let Some((url, fragment_id)) = resolve_fragment_link(self.base_url, href) else {
            debug!("No numeric {} in {:?}, skipping", FRAGMENT_ID_PARAM, href);
            self.stats.skipped_missing_fragment += 1;
            return RowOutcome::MissingFragmentId;
        };

        let id = DocumentIdentifier::new(self.last_event.clone(), fragment_id);
        let document = CourtDocument::new(id.clone(), element_text(&link), url);
        if let Some(previous) = self.documents.insert(document) {
            warn!(
                "Duplicate document {} ({:?}); keeping the later row",
                id, previous.label
            );
            self.stats.duplicates += 1;
        }

        RowOutcome::Document(id)
    }

    /// Uniquify labels per event group and hand back the finished set.
    pub fn finish(mut self) -> (DocumentSet, ReconcileStats) {
        for (event, ids) in self.documents.groups() {
            let labels: Vec<String> = ids
                .iter()
                .filter_map(|id| self.documents.get(id))
                .map(|doc| doc.label.clone())
                .collect();
            let unique = uniquify(&labels);

            for (id, label) in ids.iter().zip(unique) {
                if let Some(doc) = self.documents.get_mut(id) {
                    doc.unique_label = label;
                }
            }
            debug!("Event {:?}: {} documents", event, ids.len());
        }

        self.stats.documents = self.documents.len();
        (self.documents, self.stats)
    }
}

/// Walk every data row of every headed table, in document order.
pub fn reconcile(
    document: &Html,
    base_url: &Url,
    separator: DateSeparator,
) -> (DocumentSet, ReconcileStats) {
    let mut reconciler = TableReconciler::new(base_url, separator);
    let mut visited = HashSet::new();

    for table in document.select(&TABLE_SELECTOR) {
        if table.select(&HEADER_CELL_SELECTOR).next().is_none() {
            continue;
        }
        for row in table.select(&ROW_SELECTOR) {
            // Nested headed tables would otherwise yield their rows twice.
            if visited.insert(row.id()) {
                reconciler.process_row(row);
            }
        }
    }

    reconciler.finish()
}

/// Resolve `href` and pull out its numeric `DocumentFragmentID`.
pub fn resolve_fragment_link(base_url: &Url, href: &str) -> Option<(String, u64)> {
    let url = base_url.join(href.trim()).ok()?;
    let fragment_id = url
        .query_pairs()
        .find(|(key, _)| key == FRAGMENT_ID_PARAM)
        .and_then(|(_, value)| value.trim().parse::<u64>().ok())?;
    Some((url.to_string(), fragment_id))
}
