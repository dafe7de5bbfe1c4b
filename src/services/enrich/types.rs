//! Enrichment types: probe responses, outcomes and the cancellation token.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::models::DocumentIdentifier;

/// What a metadata probe learned about a document URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeResponse {
    pub ok: bool,
    pub status: u16,
    pub redirected: bool,
    pub final_url: String,
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
}

/// Classification of one probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The document is downloadable. The extension may still be unknown.
    Extension(Option<String>),
    /// An HTML page came back instead of the document.
    AccessDenied,
    /// Redirected to a login or error page; the session is gone.
    SessionExpired { login_url: String },
    /// A non-HTML error status.
    Unavailable(u16),
}

/// Why a document was dropped during enrichment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "detail")]
pub enum DropReason {
    NetworkFailure(String),
    AccessDenied,
    Unavailable(u16),
}

/// Result of a completed enrichment pass.
#[derive(Debug, Default, Clone, Serialize)]
pub struct EnrichResult {
    pub probed: usize,
    pub enriched: usize,
    pub dropped: Vec<(DocumentIdentifier, DropReason)>,
}

/// Settings for the enrichment pass.
#[derive(Debug, Clone)]
pub struct EnrichConfig {
    /// Pause between consecutive probes.
    pub probe_delay: Duration,
    /// Substrings of a redirect target that mean the session expired.
    pub login_markers: Vec<String>,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            probe_delay: Duration::from_millis(300),
            login_markers: vec![
                "login".to_string(),
                "erroroccurred".to_string(),
                "error occurred".to_string(),
            ],
        }
    }
}

/// Errors that abort the whole pass.
#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    #[error("Session expired; log in again at {login_url}")]
    SessionExpired { login_url: String, remaining: usize },
    #[error("Cancelled with {remaining} documents left to probe")]
    Cancelled { remaining: usize },
}

/// Shared flag that stops an enrichment pass between probes.
///
/// A child token is also cancelled when any of its ancestors is, but
/// cancelling the child leaves the ancestors alone.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
    ancestors: Vec<Arc<AtomicBool>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token for one run, stopped by this token or by its own `cancel`.
    pub fn child(&self) -> Self {
        let mut ancestors = self.ancestors.clone();
        ancestors.push(Arc::clone(&self.flag));
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            ancestors,
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self
                .ancestors
                .iter()
                .any(|flag| flag.load(Ordering::SeqCst))
    }
}
