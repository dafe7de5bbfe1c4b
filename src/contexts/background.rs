//! The background context: saves cases handed over by a page.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::messaging::{
    Notification, Notifier, OverallState, Request, RequestHandler, Response, SaveCaseRequest,
};
use crate::services::download::{
    CaseDownload, DownloadConfig, DownloadOrchestrator, DownloadSummary, Downloader,
};

pub struct BackgroundContext {
    orchestrator: DownloadOrchestrator,
    notifier: Notifier,
}

impl BackgroundContext {
    pub fn new(downloader: Arc<dyn Downloader>, notifier: Notifier, config: DownloadConfig) -> Self {
        Self {
            orchestrator: DownloadOrchestrator::new(downloader, notifier.clone(), config),
            notifier,
        }
    }

    pub async fn save_case(&self, request: SaveCaseRequest) -> DownloadSummary {
        info!(
            "Saving case {} with {} documents",
            request.metadata.case_number,
            request.court_documents.len()
        );

        let summary = self
            .orchestrator
            .run(CaseDownload {
                metadata: request.metadata,
                documents: request.court_documents,
                page_html: request.case_documents_html,
                page_url: request.page_url,
                stylesheet_url: request.stylesheet_url,
            })
            .await;

        self.notifier.notify(Notification::OverallStatus {
            state: OverallState::Done,
        });
        summary
    }
}

#[async_trait]
impl RequestHandler for BackgroundContext {
    async fn handle(&self, request: Request) -> Response {
        match request {
            Request::SaveCase(request) => Response::completed(self.save_case(request).await),
            other => Response::failed(format!(
                "{} is not handled by the background context",
                other.kind()
            )),
        }
    }
}
