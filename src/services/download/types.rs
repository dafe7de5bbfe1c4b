//! Download service types.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::{DocumentIdentifier, DownloadState};

/// What to do when the destination already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictAction {
    Overwrite,
    /// Keep both; the new file gets a ` (N)` suffix.
    Uniquify,
}

/// Where download bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadSource {
    Url(String),
    /// Bytes produced locally, like the rewritten index page.
    Inline { bytes: Vec<u8>, mime_type: String },
}

impl DownloadSource {
    pub fn describe(&self) -> &str {
        match self {
            Self::Url(url) => url,
            Self::Inline { mime_type, .. } => mime_type,
        }
    }
}

/// A request handed to a [`Downloader`](super::Downloader).
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub source: DownloadSource,
    /// `/`-separated path relative to the downloader's root.
    pub destination: String,
    pub conflict: ConflictAction,
}

/// Opaque id of a started download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DownloadHandle(pub u64);

impl fmt::Display for DownloadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Configuration for the download orchestrator.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Prefix of the case root directory (`<prefix>-cases/...`).
    pub site_prefix: String,
    /// Nest documents under one directory per event.
    pub use_subdirectories: bool,
    /// Drop completed downloads from the downloader's history.
    pub erase_completed: bool,
    /// Reveal the index page once it is saved.
    pub reveal_index: bool,
    pub stylesheet_name: String,
    pub index_filename: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            site_prefix: "oesi".to_string(),
            use_subdirectories: true,
            erase_completed: true,
            reveal_index: true,
            stylesheet_name: "PublicAccess.css".to_string(),
            index_filename: "index.html".to_string(),
        }
    }
}

/// Final state of one document download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentOutcome {
    pub id: DocumentIdentifier,
    pub relative_path: String,
    pub state: DownloadState,
}

/// Result of saving one case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadSummary {
    pub root_dir: String,
    pub documents: Vec<DocumentOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stylesheet: Option<DownloadState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<DownloadState>,
}

impl DownloadSummary {
    pub fn completed(&self) -> usize {
        self.documents
            .iter()
            .filter(|d| d.state == DownloadState::Complete)
            .count()
    }

    pub fn interrupted(&self) -> usize {
        self.documents.len() - self.completed()
    }
}

/// Errors from a downloader.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("Invalid destination {0:?}")]
    InvalidDestination(String),
    #[error("Unknown download {0}")]
    UnknownHandle(DownloadHandle),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}
