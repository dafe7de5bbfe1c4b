//! Document enrichment.
//!
//! Probes every document URL, one at a time, to learn its file extension
//! and to weed out links the session can no longer reach. An expired
//! session aborts the pass: every later probe would fail the same way.

mod types;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::messaging::{Notification, Notifier};
use crate::models::{DocumentSet, DownloadState};
use crate::scrapers::http_client::{
    extension_from_content_type, extension_from_filename, parse_content_disposition_filename,
};
use crate::scrapers::HttpClient;

pub use types::{
    CancellationToken, DropReason, EnrichConfig, EnrichError, EnrichResult, ProbeOutcome,
    ProbeResponse,
};

/// Source of document metadata without fetching the body.
#[async_trait]
pub trait MetadataFetcher: Send + Sync {
    /// Fetch headers for `url`. `Err` means the request itself failed.
    async fn probe(&self, url: &str) -> Result<ProbeResponse, String>;
}

#[async_trait]
impl MetadataFetcher for HttpClient {
    async fn probe(&self, url: &str) -> Result<ProbeResponse, String> {
        let head = self.head(url).await.map_err(|e| e.to_string())?;
        Ok(ProbeResponse {
            ok: head.is_success(),
            status: head.status.as_u16(),
            redirected: head.redirected,
            final_url: head.final_url.clone(),
            content_type: head.content_type().map(String::from),
            content_disposition: head.content_disposition().map(String::from),
        })
    }
}

fn is_html(content_type: Option<&str>) -> bool {
    content_type
        .map(|ct| {
            let ct = ct.to_ascii_lowercase();
            ct.contains("text/html") || ct.contains("application/xhtml")
        })
        .unwrap_or(false)
}

/// Classify a probe response.
///
/// HTML in place of a document means the link is off limits; if we were
/// also redirected to a login or error page, the whole session is.
pub fn classify(response: &ProbeResponse, login_markers: &[String]) -> ProbeOutcome {
    if is_html(response.content_type.as_deref()) {
        // Markers may contain spaces; URLs carry them percent-encoded.
        let target = urlencoding::decode(&response.final_url)
            .map(|decoded| decoded.to_lowercase())
            .unwrap_or_else(|_| response.final_url.to_lowercase());
        if response.redirected
            && login_markers
                .iter()
                .any(|marker| target.contains(&marker.to_lowercase()))
        {
            return ProbeOutcome::SessionExpired {
                login_url: response.final_url.clone(),
            };
        }
        return ProbeOutcome::AccessDenied;
    }

    if !response.ok {
        return ProbeOutcome::Unavailable(response.status);
    }

    let extension = response
        .content_disposition
        .as_deref()
        .and_then(parse_content_disposition_filename)
        .and_then(|name| extension_from_filename(&name))
        .or_else(|| {
            response
                .content_type
                .as_deref()
                .and_then(extension_from_content_type)
        });

    ProbeOutcome::Extension(extension)
}

/// One sequential pass over a case's documents.
pub struct EnrichmentPass<'a, F: MetadataFetcher + ?Sized> {
    fetcher: &'a F,
    notifier: &'a Notifier,
    config: &'a EnrichConfig,
    cancel: CancellationToken,
}

impl<'a, F: MetadataFetcher + ?Sized> EnrichmentPass<'a, F> {
    pub fn new(
        fetcher: &'a F,
        notifier: &'a Notifier,
        config: &'a EnrichConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            fetcher,
            notifier,
            config,
            cancel,
        }
    }

    /// Probe every document in per-event, per-row order.
    ///
    /// Documents that can't be fetched are removed from `documents` and
    /// reported as interrupted. On session expiry the token is cancelled,
    /// the remaining documents are left untouched and the pass fails.
    pub async fn run(&self, documents: &mut DocumentSet) -> Result<EnrichResult, EnrichError> {
        let ids = documents.grouped_ids();
        let total = ids.len();
        let mut result = EnrichResult::default();

        info!("Probing {} documents", total);

        for (index, id) in ids.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(EnrichError::Cancelled {
                    remaining: total - index,
                });
            }

            if index > 0 && !self.config.probe_delay.is_zero() {
                tokio::time::sleep(self.config.probe_delay).await;
            }

            let Some(url) = documents.get(&id).map(|doc| doc.url.clone()) else {
                continue;
            };

            self.notifier.notify(Notification::CourtDocumentDownloadUpdated {
                id: id.clone(),
                state: DownloadState::InProgress,
            });

            result.probed += 1;
            let drop_reason = match self.fetcher.probe(&url).await {
                Err(e) => {
                    warn!("Probe failed for {}: {}", id, e);
                    DropReason::NetworkFailure(e)
                }
                Ok(response) => match classify(&response, &self.config.login_markers) {
                    ProbeOutcome::Extension(extension) => {
                        debug!("{} -> {:?}", id, extension);
                        if let Some(doc) = documents.get_mut(&id) {
                            doc.file_extension = extension;
                        }
                        result.enriched += 1;
                        continue;
                    }
                    ProbeOutcome::SessionExpired { login_url } => {
                        error!("Session expired while probing {} (sent to {})", id, login_url);
                        self.cancel.cancel();
                        self.notifier.notify(Notification::CourtDocumentDownloadUpdated {
                            id,
                            state: DownloadState::Interrupted,
                        });
                        self.notifier.notify(Notification::SessionExpired {
                            login_url: login_url.clone(),
                        });
                        return Err(EnrichError::SessionExpired {
                            login_url,
                            remaining: total - index - 1,
                        });
                    }
                    ProbeOutcome::AccessDenied => {
                        warn!("Got a web page instead of {}", id);
                        DropReason::AccessDenied
                    }
                    ProbeOutcome::Unavailable(status) => {
                        warn!("HTTP {} for {}", status, id);
                        DropReason::Unavailable(status)
                    }
                },
            };

            documents.remove(&id);
            self.notifier.notify(Notification::CourtDocumentDownloadUpdated {
                id: id.clone(),
                state: DownloadState::Interrupted,
            });
            result.dropped.push((id, drop_reason));
        }

        info!(
            "Probed {} documents: {} usable, {} dropped",
            result.probed,
            result.enriched,
            result.dropped.len()
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use tokio::sync::mpsc;

    use crate::models::{CourtDocument, DocumentIdentifier};

    #[derive(Default)]
    struct FakeFetcher {
        responses: HashMap<String, Result<ProbeResponse, String>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        fn with(mut self, url: &str, response: Result<ProbeResponse, String>) -> Self {
            self.responses.insert(url.to_string(), response);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MetadataFetcher for FakeFetcher {
        async fn probe(&self, url: &str) -> Result<ProbeResponse, String> {
            self.calls.lock().unwrap().push(url.to_string());
            self.responses
                .get(url)
                .cloned()
                .unwrap_or_else(|| Err("no route".to_string()))
        }
    }

    fn pdf(filename: &str) -> Result<ProbeResponse, String> {
        Ok(ProbeResponse {
            ok: true,
            status: 200,
            final_url: String::new(),
            content_type: Some("application/pdf".to_string()),
            content_disposition: Some(format!("inline; filename=\"{}\"", filename)),
            ..Default::default()
        })
    }

    fn login_redirect() -> Result<ProbeResponse, String> {
        Ok(ProbeResponse {
            ok: true,
            status: 200,
            redirected: true,
            final_url: "https://example.org/Login.aspx".to_string(),
            content_type: Some("text/html; charset=utf-8".to_string()),
            ..Default::default()
        })
    }

    fn doc(event: &str, id: u64) -> CourtDocument {
        CourtDocument::new(
            DocumentIdentifier::new(event, id),
            format!("Doc {}", id),
            format!("https://example.org/doc?DocumentFragmentID={}", id),
        )
    }

    fn url(id: u64) -> String {
        format!("https://example.org/doc?DocumentFragmentID={}", id)
    }

    fn config() -> EnrichConfig {
        EnrichConfig {
            probe_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    #[test]
    fn test_classify_extension_from_disposition() {
        let response = pdf("Report.final.tif").unwrap();
        assert_eq!(
            classify(&response, &config().login_markers),
            ProbeOutcome::Extension(Some("tif".to_string()))
        );
    }

    #[test]
    fn test_classify_falls_back_to_content_type() {
        let response = ProbeResponse {
            ok: true,
            status: 200,
            content_type: Some("application/pdf".to_string()),
            content_disposition: Some("inline; filename=README".to_string()),
            ..Default::default()
        };
        assert_eq!(
            classify(&response, &[]),
            ProbeOutcome::Extension(Some("pdf".to_string()))
        );
    }

    #[test]
    fn test_classify_html_without_redirect_is_access_denied() {
        let response = ProbeResponse {
            ok: true,
            status: 200,
            final_url: "https://example.org/Login.aspx".to_string(),
            content_type: Some("text/html".to_string()),
            ..Default::default()
        };
        assert_eq!(
            classify(&response, &config().login_markers),
            ProbeOutcome::AccessDenied
        );
    }

    #[test]
    fn test_classify_login_redirect() {
        assert_eq!(
            classify(&login_redirect().unwrap(), &config().login_markers),
            ProbeOutcome::SessionExpired {
                login_url: "https://example.org/Login.aspx".to_string()
            }
        );
    }

    #[test]
    fn test_classify_error_page_redirect() {
        for final_url in [
            "https://example.org/Error%20Occurred.aspx",
            "https://example.org/ErrorOccurred.aspx?aspxerrorpath=/doc",
        ] {
            let response = ProbeResponse {
                ok: true,
                status: 200,
                redirected: true,
                final_url: final_url.to_string(),
                content_type: Some("text/html".to_string()),
                ..Default::default()
            };
            assert_eq!(
                classify(&response, &config().login_markers),
                ProbeOutcome::SessionExpired {
                    login_url: final_url.to_string()
                },
                "{}",
                final_url
            );
        }
    }

    #[test]
    fn test_classify_error_status() {
        let response = ProbeResponse {
            ok: false,
            status: 404,
            content_type: Some("application/octet-stream".to_string()),
            ..Default::default()
        };
        assert_eq!(classify(&response, &[]), ProbeOutcome::Unavailable(404));
    }

    #[tokio::test]
    async fn test_pass_sets_extensions_and_drops_failures() {
        let mut documents: DocumentSet = vec![doc("A", 1), doc("A", 2), doc("B", 3)]
            .into_iter()
            .collect();
        let fetcher = FakeFetcher::default()
            .with(&url(1), pdf("one.pdf"))
            .with(&url(3), pdf("three.docx"));
        let (tx, mut rx) = mpsc::channel(32);
        let notifier = Notifier::new(tx);
        let config = config();

        let result = EnrichmentPass::new(&fetcher, &notifier, &config, CancellationToken::new())
            .run(&mut documents)
            .await
            .unwrap();

        assert_eq!(result.probed, 3);
        assert_eq!(result.enriched, 2);
        assert_eq!(result.dropped.len(), 1);
        assert_eq!(result.dropped[0].0, DocumentIdentifier::new("A", 2));

        assert_eq!(documents.len(), 2);
        let one = documents.get(&DocumentIdentifier::new("A", 1)).unwrap();
        assert_eq!(one.file_extension.as_deref(), Some("pdf"));
        let three = documents.get(&DocumentIdentifier::new("B", 3)).unwrap();
        assert_eq!(three.file_extension.as_deref(), Some("docx"));

        drop(notifier);
        let mut interrupted = Vec::new();
        while let Some(note) = rx.recv().await {
            if let Notification::CourtDocumentDownloadUpdated {
                id,
                state: DownloadState::Interrupted,
            } = note
            {
                interrupted.push(id);
            }
        }
        assert_eq!(interrupted, vec![DocumentIdentifier::new("A", 2)]);
    }

    #[tokio::test]
    async fn test_session_expiry_aborts_remaining_probes() {
        let mut documents: DocumentSet = vec![doc("A", 1), doc("A", 2), doc("A", 3), doc("B", 4)]
            .into_iter()
            .collect();
        let fetcher = FakeFetcher::default()
            .with(&url(1), pdf("one.pdf"))
            .with(&url(2), login_redirect())
            .with(&url(3), pdf("three.pdf"))
            .with(&url(4), pdf("four.pdf"));
        let (tx, mut rx) = mpsc::channel(32);
        let notifier = Notifier::new(tx);
        let config = config();
        let cancel = CancellationToken::new();

        let err = EnrichmentPass::new(&fetcher, &notifier, &config, cancel.clone())
            .run(&mut documents)
            .await
            .unwrap_err();

        match err {
            EnrichError::SessionExpired {
                login_url,
                remaining,
            } => {
                assert_eq!(login_url, "https://example.org/Login.aspx");
                assert_eq!(remaining, 2);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(cancel.is_cancelled());
        assert_eq!(fetcher.calls(), vec![url(1), url(2)]);

        // Later documents were never touched.
        for id in [3, 4] {
            let key = DocumentIdentifier::new(if id == 4 { "B" } else { "A" }, id);
            assert_eq!(documents.get(&key).unwrap().file_extension, None);
        }

        drop(notifier);
        let mut saw_expiry = false;
        while let Some(note) = rx.recv().await {
            if let Notification::SessionExpired { .. } = note {
                saw_expiry = true;
            }
        }
        assert!(saw_expiry);
    }

    #[tokio::test]
    async fn test_cancelled_pass_probes_nothing() {
        let mut documents: DocumentSet = vec![doc("A", 1)].into_iter().collect();
        let fetcher = FakeFetcher::default().with(&url(1), pdf("one.pdf"));
        let notifier = Notifier::disconnected();
        let config = config();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = EnrichmentPass::new(&fetcher, &notifier, &config, cancel)
            .run(&mut documents)
            .await
            .unwrap_err();

        assert!(matches!(err, EnrichError::Cancelled { remaining: 1 }));
        assert!(fetcher.calls().is_empty());
    }
}
