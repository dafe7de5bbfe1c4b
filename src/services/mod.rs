//! Service layer for case saving.
//!
//! This module contains domain logic separated from UI concerns.
//! Services report progress through a [`Notifier`](crate::messaging::Notifier)
//! and can be driven by the CLI or by tests.

pub mod download;
pub mod enrich;
pub mod index;

pub use download::{
    CaseDownload, DownloadConfig, DownloadOrchestrator, DownloadSummary, Downloader, FsDownloader,
};
pub use enrich::{CancellationToken, EnrichConfig, EnrichError, EnrichmentPass, MetadataFetcher};
pub use index::rewrite_index_html;
