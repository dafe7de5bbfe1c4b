//! Typed messages between the page context, the orchestration context and
//! whatever UI is watching.
//!
//! Requests are answered exactly once. Notifications are fire-and-forget:
//! receivers must tolerate them arriving out of order or not at all.

mod local;

pub use local::{LocalChannel, Notifier};

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{CaseMetadata, CourtDocument, DocumentIdentifier, DownloadState};
use crate::services::download::DownloadSummary;

/// A request sent across a [`Channel`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// Find the case documents page linked from the current page.
    #[serde(rename = "getCaseDocumentsURL")]
    GetCaseDocumentsUrl,
    /// Scrape the current page, probe every document and save the case.
    #[serde(rename = "scrapeAndDownload")]
    ScrapeAndDownload,
    /// Download a reconciled, enriched case.
    #[serde(rename = "saveCase")]
    SaveCase(SaveCaseRequest),
}

impl Request {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::GetCaseDocumentsUrl => "getCaseDocumentsURL",
            Self::ScrapeAndDownload => "scrapeAndDownload",
            Self::SaveCase(_) => "saveCase",
        }
    }
}

/// Payload of a `saveCase` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveCaseRequest {
    pub metadata: CaseMetadata,
    pub case_documents_html: String,
    pub page_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stylesheet_url: Option<String>,
    /// Surviving documents in per-event, per-row order.
    pub court_documents: Vec<CourtDocument>,
}

/// The answer to a [`Request`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Response {
    #[serde(rename_all = "camelCase")]
    CaseDocumentsUrl {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Outcome {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<DownloadSummary>,
    },
}

impl Response {
    pub fn completed(summary: DownloadSummary) -> Self {
        Self::Outcome {
            success: true,
            error: None,
            summary: Some(summary),
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self::Outcome {
            success: false,
            error: Some(error.to_string()),
            summary: None,
        }
    }

    pub fn is_success(&self) -> bool {
        match self {
            Self::CaseDocumentsUrl { success, .. } | Self::Outcome { success, .. } => *success,
        }
    }
}

/// Whole-case status shown next to the trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallState {
    Downloading,
    Done,
    Failed,
}

/// One-way progress events for the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Notification {
    CourtDocumentDownloadUpdated {
        id: DocumentIdentifier,
        state: DownloadState,
    },
    OverallStatus {
        state: OverallState,
    },
    #[serde(rename_all = "camelCase")]
    SessionExpired {
        login_url: String,
    },
}

/// Errors delivering a request.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel closed")]
    Closed,
    #[error("No response to {kind} within {timeout:?}")]
    Timeout {
        kind: &'static str,
        timeout: Duration,
    },
    #[error("A {0} request is already in flight")]
    Busy(&'static str),
}

/// Request/response plus notification primitives between two contexts.
#[async_trait]
pub trait Channel: Send + Sync {
    async fn request(&self, request: Request) -> Result<Response, ChannelError>;

    fn notify(&self, notification: Notification);
}

/// The receiving side of a [`Channel`].
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    async fn handle(&self, request: Request) -> Response;
}
