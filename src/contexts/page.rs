//! The page context: owns the loaded case page and answers UI requests.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::messaging::{
    Channel, ChannelError, Notification, Notifier, OverallState, Request, RequestHandler,
    Response, SaveCaseRequest,
};
use crate::models::CourtDocument;
use crate::scrapers::{CasePage, ScrapeError};
use crate::services::download::DownloadSummary;
use crate::services::enrich::{
    CancellationToken, EnrichConfig, EnrichError, EnrichmentPass, MetadataFetcher,
};
use crate::session::{CaseSession, SessionError};
use crate::utils::DateSeparator;

/// What the page context needs from the settings.
#[derive(Debug, Clone)]
pub struct PageConfig {
    pub date_separator: DateSeparator,
    pub stylesheet_name: String,
    pub case_documents_link_pattern: String,
    pub enrich: EnrichConfig,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            date_separator: DateSeparator::default(),
            stylesheet_name: "PublicAccess.css".to_string(),
            case_documents_link_pattern: "CaseDocuments".to_string(),
            enrich: EnrichConfig::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PageError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Scrape(#[from] ScrapeError),
    #[error(transparent)]
    Enrich(#[from] EnrichError),
    #[error("Couldn't reach the download context: {0}")]
    Channel(#[from] ChannelError),
    #[error("Saving the case failed: {0}")]
    Save(String),
}

pub struct PageContext {
    page: CasePage,
    session: Arc<CaseSession>,
    fetcher: Arc<dyn MetadataFetcher>,
    background: Arc<dyn Channel>,
    notifier: Notifier,
    config: PageConfig,
    cancel: CancellationToken,
}

impl PageContext {
    pub fn new(
        page: CasePage,
        fetcher: Arc<dyn MetadataFetcher>,
        background: Arc<dyn Channel>,
        notifier: Notifier,
        config: PageConfig,
    ) -> Self {
        Self {
            page,
            session: CaseSession::new(),
            fetcher,
            background,
            notifier,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Use `cancel` to stop enrichment from outside, e.g. on Ctrl-C.
    ///
    /// Each scrape probes under its own child token, so a session expiry
    /// ends only that scrape and a later retry starts clean.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn session(&self) -> &Arc<CaseSession> {
        &self.session
    }

    pub fn case_documents_url(&self) -> Option<String> {
        self.page
            .case_documents_url(&self.config.case_documents_link_pattern)
    }

    /// Scrape the page, probe the documents and hand the case to the
    /// download context.
    pub async fn scrape_and_download(&self) -> Result<DownloadSummary, PageError> {
        let scrape = self.session.begin()?;
        info!("Session {}: scraping {}", scrape.session_id(), self.page.base_url());

        let scraped = self
            .page
            .scrape(self.config.date_separator, &self.config.stylesheet_name)?;
        let mut documents = scraped.documents;

        self.notifier.notify(Notification::OverallStatus {
            state: OverallState::Downloading,
        });

        EnrichmentPass::new(
            self.fetcher.as_ref(),
            &self.notifier,
            &self.config.enrich,
            self.cancel.child(),
        )
        .run(&mut documents)
        .await?;

        let court_documents: Vec<CourtDocument> = documents
            .grouped_ids()
            .iter()
            .filter_map(|id| documents.get(id).cloned())
            .collect();

        let request = Request::SaveCase(SaveCaseRequest {
            metadata: scraped.metadata,
            case_documents_html: self.page.html().to_string(),
            page_url: self.page.base_url().to_string(),
            stylesheet_url: scraped.stylesheet_url,
            court_documents,
        });

        match self.background.request(request).await? {
            Response::Outcome {
                success: true,
                summary: Some(summary),
                ..
            } => Ok(summary),
            Response::Outcome { error, .. } => Err(PageError::Save(
                error.unwrap_or_else(|| "no summary returned".to_string()),
            )),
            other => Err(PageError::Save(format!("unexpected response {:?}", other))),
        }
    }
}

#[async_trait]
impl RequestHandler for PageContext {
    async fn handle(&self, request: Request) -> Response {
        match request {
            Request::GetCaseDocumentsUrl => match self.case_documents_url() {
                Some(url) => Response::CaseDocumentsUrl {
                    success: true,
                    url: Some(url),
                    error: None,
                },
                None => Response::CaseDocumentsUrl {
                    success: false,
                    url: None,
                    error: Some("No case documents link on this page".to_string()),
                },
            },
            Request::ScrapeAndDownload => match self.scrape_and_download().await {
                Ok(summary) => Response::completed(summary),
                Err(PageError::Session(e)) => {
                    // The running scrape owns the overall status.
                    warn!("{}", e);
                    Response::failed(e)
                }
                Err(e) => {
                    warn!("Scrape failed: {}", e);
                    self.notifier.notify(Notification::OverallStatus {
                        state: OverallState::Failed,
                    });
                    Response::failed(e)
                }
            },
            other => Response::failed(format!("{} is not handled by the page", other.kind())),
        }
    }
}
