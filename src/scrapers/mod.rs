//! Case page scraping and document table reconciliation.

pub mod case_page;
pub mod case_table;
pub mod http_client;
pub mod uniquify;

pub use case_page::{CasePage, ScrapedCase};
pub use case_table::{reconcile, ReconcileStats, RowOutcome, TableReconciler};
pub use http_client::{ClientBuildError, ClientOptions, HeadResponse, HttpClient};
pub use uniquify::uniquify;

/// Errors that fail a whole scrape. Row-level problems never end up here.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("Couldn't find the case number on the page")]
    MissingCaseNumber,
    #[error("Couldn't find the person name (\"In the Matter of:\") on the page")]
    MissingPersonName,
    #[error("Invalid page URL {0}: {1}")]
    InvalidBaseUrl(String, url::ParseError),
    #[error("Cannot build a file URL for {0}")]
    InvalidPath(String),
    #[error("Failed to fetch page: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("Failed to read page: {0}")]
    Io(#[from] std::io::Error),
}
