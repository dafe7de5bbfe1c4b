//! Data models for case documents.

mod case;
mod document;

pub use case::CaseMetadata;
pub use document::{
    CourtDocument, DocumentIdentifier, DocumentSet, DownloadState, ProcessedCourtDocument,
};
