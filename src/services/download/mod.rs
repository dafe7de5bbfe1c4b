//! Case download service.
//!
//! Turns enriched documents into download requests, runs them all at once
//! and reports each outcome. The case page itself and its stylesheet are
//! saved alongside so the case can be browsed offline.

mod fs;
mod types;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, info, warn};
use url::Url;

use crate::messaging::{Notification, Notifier};
use crate::models::{CaseMetadata, CourtDocument, DownloadState, ProcessedCourtDocument};
use crate::services::index::rewrite_index_html;
use crate::utils::sanitize_segment;

pub use fs::{resolve_destination, uniquify_path, DownloadRecord, FsDownloader};
pub use types::{
    ConflictAction, DocumentOutcome, DownloadConfig, DownloadError, DownloadHandle,
    DownloadRequest, DownloadSource, DownloadSummary,
};

/// Directory the stylesheet copy lives in, relative to the case root.
pub const STYLESHEET_DIR: &str = "CSS";

/// A download manager: starts downloads and reports how they end.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Start a download. `Err` means it never started.
    async fn download(&self, request: DownloadRequest) -> Result<DownloadHandle, DownloadError>;

    /// Wait until the download completes or is interrupted.
    async fn await_terminal(&self, handle: DownloadHandle) -> DownloadState;

    /// Forget a finished download. The file stays.
    async fn erase(&self, handle: DownloadHandle);

    /// Show where a finished download was saved.
    async fn reveal(&self, handle: DownloadHandle);
}

/// Relative path of a document under the case root.
///
/// `<event>/<label>[.<ext>]`, or `<event>-<label>[.<ext>]` without
/// subdirectories. Both segments are sanitized.
pub fn relative_path(document: &CourtDocument, use_subdirectories: bool) -> String {
    join_path(
        &sanitize_segment(document.event()),
        &label_segment(document),
        document.file_extension.as_deref(),
        use_subdirectories,
    )
}

fn label_segment(document: &CourtDocument) -> String {
    let label = if document.unique_label.is_empty() {
        &document.label
    } else {
        &document.unique_label
    };
    sanitize_segment(label)
}

fn join_path(event: &str, label: &str, extension: Option<&str>, use_subdirectories: bool) -> String {
    let separator = if use_subdirectories { '/' } else { '-' };
    match extension.filter(|ext| !ext.is_empty()) {
        Some(ext) => format!("{}{}{}.{}", event, separator, label, ext),
        None => format!("{}{}{}", event, separator, label),
    }
}

/// Attach relative paths to documents, keeping their order.
///
/// Distinct labels can sanitize to the same segment ("Report: Final" and
/// "Report Final"), so a path already taken in this case gets `-N` appended
/// to its label segment. Paths are compared case-insensitively.
pub fn process_documents(
    documents: Vec<CourtDocument>,
    use_subdirectories: bool,
) -> Vec<ProcessedCourtDocument> {
    let mut taken: HashSet<String> = HashSet::with_capacity(documents.len());

    documents
        .into_iter()
        .map(|doc| {
            let event = sanitize_segment(doc.event());
            let label = label_segment(&doc);
            let extension = doc.file_extension.as_deref();

            let mut path = join_path(&event, &label, extension, use_subdirectories);
            let mut suffix = 1u32;
            while taken.contains(&path.to_lowercase()) {
                let numbered = format!("{}-{}", label, suffix);
                path = join_path(&event, &numbered, extension, use_subdirectories);
                suffix += 1;
            }
            if suffix > 1 {
                debug!("{} renamed to {} to avoid a path clash", doc.id, path);
            }

            taken.insert(path.to_lowercase());
            ProcessedCourtDocument::new(doc, path)
        })
        .collect()
}

/// A case ready to be saved.
#[derive(Debug, Clone)]
pub struct CaseDownload {
    pub metadata: CaseMetadata,
    /// Documents in per-event, per-row order.
    pub documents: Vec<CourtDocument>,
    pub page_html: String,
    pub page_url: String,
    pub stylesheet_url: Option<String>,
}

/// Saves a case through a [`Downloader`].
pub struct DownloadOrchestrator {
    downloader: Arc<dyn Downloader>,
    notifier: Notifier,
    config: DownloadConfig,
}

impl DownloadOrchestrator {
    pub fn new(downloader: Arc<dyn Downloader>, notifier: Notifier, config: DownloadConfig) -> Self {
        Self {
            downloader,
            notifier,
            config,
        }
    }

    /// Start, await and report one download.
    async fn run_one(&self, request: DownloadRequest) -> (DownloadState, Option<DownloadHandle>) {
        let destination = request.destination.clone();
        let handle = match self.downloader.download(request).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Couldn't start download of {}: {}", destination, e);
                return (DownloadState::Interrupted, None);
            }
        };

        let state = self.downloader.await_terminal(handle).await;
        debug!("{} {} -> {}", handle, destination, state.as_str());
        (state, Some(handle))
    }

    async fn save_document(&self, root: &str, document: &ProcessedCourtDocument) -> DocumentOutcome {
        let request = DownloadRequest {
            source: DownloadSource::Url(document.url().to_string()),
            destination: format!("{}/{}", root, document.relative_path()),
            conflict: ConflictAction::Overwrite,
        };

        let (state, handle) = self.run_one(request).await;
        if let (DownloadState::Complete, Some(handle)) = (state, handle) {
            if self.config.erase_completed {
                self.downloader.erase(handle).await;
            }
        }

        self.notifier.notify(Notification::CourtDocumentDownloadUpdated {
            id: document.id().clone(),
            state,
        });

        DocumentOutcome {
            id: document.id().clone(),
            relative_path: document.relative_path().to_string(),
            state,
        }
    }

    async fn save_stylesheet(&self, root: &str, url: Option<&str>) -> Option<DownloadState> {
        let url = url?;
        let request = DownloadRequest {
            source: DownloadSource::Url(url.to_string()),
            destination: format!("{}/{}", root, self.stylesheet_path()),
            conflict: ConflictAction::Overwrite,
        };
        let (state, _) = self.run_one(request).await;
        Some(state)
    }

    async fn save_index(&self, root: &str, html: String) -> DownloadState {
        let request = DownloadRequest {
            source: DownloadSource::Inline {
                bytes: html.into_bytes(),
                mime_type: "text/html".to_string(),
            },
            destination: format!("{}/{}", root, self.config.index_filename),
            conflict: ConflictAction::Uniquify,
        };

        let (state, handle) = self.run_one(request).await;
        if let (DownloadState::Complete, Some(handle)) = (state, handle) {
            if self.config.reveal_index {
                self.downloader.reveal(handle).await;
            }
        }
        state
    }

    fn stylesheet_path(&self) -> String {
        format!("{}/{}", STYLESHEET_DIR, self.config.stylesheet_name)
    }

    /// Download every document, the stylesheet and the rewritten index page.
    ///
    /// Downloads run concurrently and one failure never stops the others.
    /// Every document gets exactly one terminal notification.
    pub async fn run(&self, case: CaseDownload) -> DownloadSummary {
        let root = case.metadata.root_dir(&self.config.site_prefix);
        let processed = process_documents(case.documents, self.config.use_subdirectories);

        info!("Saving {} documents to {}", processed.len(), root);

        let stylesheet_path = self.stylesheet_path();
        let index_html = match Url::parse(&case.page_url) {
            Ok(base_url) => rewrite_index_html(
                &case.page_html,
                &base_url,
                &processed,
                case.stylesheet_url
                    .as_deref()
                    .map(|url| (url, stylesheet_path.as_str())),
            ),
            Err(e) => {
                warn!("Saving page unmodified, bad page URL {}: {}", case.page_url, e);
                case.page_html.clone()
            }
        };

        let documents = join_all(processed.iter().map(|doc| self.save_document(&root, doc)));
        let (documents, stylesheet, index) = tokio::join!(
            documents,
            self.save_stylesheet(&root, case.stylesheet_url.as_deref()),
            self.save_index(&root, index_html),
        );

        let summary = DownloadSummary {
            root_dir: root,
            documents,
            stylesheet,
            index: Some(index),
        };
        info!(
            "Saved {}/{} documents to {}",
            summary.completed(),
            summary.documents.len(),
            summary.root_dir
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    use tokio::sync::mpsc;

    use crate::models::DocumentIdentifier;

    /// Records requests; fails any URL containing "broken".
    #[derive(Default)]
    struct FakeDownloader {
        next: AtomicU64,
        requests: Mutex<HashMap<DownloadHandle, DownloadRequest>>,
        erased: Mutex<Vec<DownloadHandle>>,
        revealed: Mutex<Vec<DownloadHandle>>,
    }

    impl FakeDownloader {
        fn destinations(&self) -> Vec<String> {
            let mut all: Vec<String> = self
                .requests
                .lock()
                .unwrap()
                .values()
                .map(|r| r.destination.clone())
                .collect();
            all.sort();
            all
        }

        fn request_for(&self, destination: &str) -> Option<DownloadRequest> {
            self.requests
                .lock()
                .unwrap()
                .values()
                .find(|r| r.destination == destination)
                .cloned()
        }
    }

    #[async_trait]
    impl Downloader for FakeDownloader {
        async fn download(&self, request: DownloadRequest) -> Result<DownloadHandle, DownloadError> {
            if request.source.describe().contains("refused") {
                return Err(DownloadError::InvalidDestination(request.destination));
            }
            let handle = DownloadHandle(self.next.fetch_add(1, Ordering::Relaxed));
            self.requests.lock().unwrap().insert(handle, request);
            Ok(handle)
        }

        async fn await_terminal(&self, handle: DownloadHandle) -> DownloadState {
            let requests = self.requests.lock().unwrap();
            match requests.get(&handle) {
                Some(r) if r.source.describe().contains("broken") => DownloadState::Interrupted,
                Some(_) => DownloadState::Complete,
                None => DownloadState::Interrupted,
            }
        }

        async fn erase(&self, handle: DownloadHandle) {
            self.erased.lock().unwrap().push(handle);
        }

        async fn reveal(&self, handle: DownloadHandle) {
            self.revealed.lock().unwrap().push(handle);
        }
    }

    fn doc(event: &str, id: u64, label: &str, ext: Option<&str>) -> CourtDocument {
        let mut doc = CourtDocument::new(
            DocumentIdentifier::new(event, id),
            label,
            format!("https://example.org/doc?DocumentFragmentID={}", id),
        );
        doc.unique_label = label.to_string();
        doc.file_extension = ext.map(String::from);
        doc
    }

    fn case(documents: Vec<CourtDocument>) -> CaseDownload {
        CaseDownload {
            metadata: CaseMetadata::new("P123456", "Jane Doe"),
            documents,
            page_html: "<html></html>".to_string(),
            page_url: "https://example.org/CaseDocuments.aspx".to_string(),
            stylesheet_url: Some("https://example.org/CSS/PublicAccess.css".to_string()),
        }
    }

    #[test]
    fn test_relative_path() {
        let d = doc("2020-12-31 Review", 1, "Report: Final", Some("pdf"));
        assert_eq!(relative_path(&d, true), "2020-12-31-Review/Report-Final.pdf");
        assert_eq!(relative_path(&d, false), "2020-12-31-Review-Report-Final.pdf");

        let d = doc("Review", 2, "Letter", None);
        assert_eq!(relative_path(&d, true), "Review/Letter");
    }

    #[test]
    fn test_relative_path_falls_back_to_label() {
        let mut d = doc("Review", 1, "Report", None);
        d.unique_label.clear();
        assert_eq!(relative_path(&d, true), "Review/Report");
    }

    #[test]
    fn test_process_documents_keeps_sanitized_clashes_apart() {
        let processed = process_documents(
            vec![
                doc("Review", 1, "Report: Final", Some("pdf")),
                doc("Review", 2, "Report Final", Some("pdf")),
                doc("Review", 3, "report final", Some("pdf")),
                doc("Hearing", 4, "Report Final", Some("pdf")),
            ],
            true,
        );

        let paths: Vec<&str> = processed.iter().map(|d| d.relative_path()).collect();
        assert_eq!(
            paths,
            vec![
                "Review/Report-Final.pdf",
                "Review/Report-Final-1.pdf",
                "Review/report-final-2.pdf",
                "Hearing/Report-Final.pdf",
            ]
        );
    }

    #[test]
    fn test_process_documents_flat_layout_clash() {
        // "A B" / "C" and "A" / "B C" meet at "A-B-C" without subdirectories.
        let processed = process_documents(
            vec![doc("A B", 1, "C", None), doc("A", 2, "B C", None)],
            false,
        );
        assert_eq!(processed[0].relative_path(), "A-B-C");
        assert_eq!(processed[1].relative_path(), "A-B-C-1");
    }

    #[tokio::test]
    async fn test_run_saves_documents_stylesheet_and_index() {
        let downloader = Arc::new(FakeDownloader::default());
        let orchestrator = DownloadOrchestrator::new(
            downloader.clone(),
            Notifier::disconnected(),
            DownloadConfig::default(),
        );

        let summary = orchestrator
            .run(case(vec![
                doc("2020-12-31 Review", 1, "Report", Some("pdf")),
                doc("2020-12-31 Review", 2, "Report-1", Some("pdf")),
            ]))
            .await;

        let root = "oesi-cases/P123456-Jane Doe";
        assert_eq!(summary.root_dir, root);
        assert_eq!(summary.completed(), 2);
        assert_eq!(summary.stylesheet, Some(DownloadState::Complete));
        assert_eq!(summary.index, Some(DownloadState::Complete));

        assert_eq!(
            downloader.destinations(),
            vec![
                format!("{}/2020-12-31-Review/Report-1.pdf", root),
                format!("{}/2020-12-31-Review/Report.pdf", root),
                format!("{}/CSS/PublicAccess.css", root),
                format!("{}/index.html", root),
            ]
        );

        let index = downloader.request_for(&format!("{}/index.html", root)).unwrap();
        assert_eq!(index.conflict, ConflictAction::Uniquify);
        assert!(matches!(index.source, DownloadSource::Inline { .. }));

        assert_eq!(downloader.erased.lock().unwrap().len(), 2);
        assert_eq!(downloader.revealed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_other_downloads() {
        let downloader = Arc::new(FakeDownloader::default());
        let (tx, mut rx) = mpsc::channel(32);
        let orchestrator = DownloadOrchestrator::new(
            downloader.clone(),
            Notifier::new(tx),
            DownloadConfig::default(),
        );

        let mut broken = doc("A", 2, "Broken", Some("pdf"));
        broken.url = "https://example.org/broken".to_string();
        let mut refused = doc("A", 3, "Refused", Some("pdf"));
        refused.url = "https://example.org/refused".to_string();

        let mut input = case(vec![doc("A", 1, "Fine", Some("pdf")), broken, refused]);
        input.stylesheet_url = None;

        let summary = orchestrator.run(input).await;
        drop(orchestrator);

        let states: Vec<_> = summary.documents.iter().map(|d| d.state).collect();
        assert_eq!(
            states,
            vec![
                DownloadState::Complete,
                DownloadState::Interrupted,
                DownloadState::Interrupted
            ]
        );
        assert_eq!(summary.stylesheet, None);
        // Only the completed download is erased.
        assert_eq!(downloader.erased.lock().unwrap().len(), 1);

        let mut notified = Vec::new();
        while let Some(note) = rx.recv().await {
            if let Notification::CourtDocumentDownloadUpdated { id, state } = note {
                notified.push((id.fragment_id, state));
            }
        }
        notified.sort_by_key(|(id, _)| *id);
        assert_eq!(
            notified,
            vec![
                (1, DownloadState::Complete),
                (2, DownloadState::Interrupted),
                (3, DownloadState::Interrupted)
            ]
        );
    }

    #[tokio::test]
    async fn test_keep_history_and_flat_layout() {
        let downloader = Arc::new(FakeDownloader::default());
        let config = DownloadConfig {
            erase_completed: false,
            use_subdirectories: false,
            ..Default::default()
        };
        let orchestrator =
            DownloadOrchestrator::new(downloader.clone(), Notifier::disconnected(), config);

        let summary = orchestrator
            .run(case(vec![doc("Review", 1, "Report", None)]))
            .await;

        assert_eq!(summary.documents[0].relative_path, "Review-Report");
        assert!(downloader.erased.lock().unwrap().is_empty());
    }
}
