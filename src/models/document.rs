//! Court document models and the identifier-keyed document set.
//!
//! A document is named by its event and the `DocumentFragmentID` found in its
//! link. Fragment ids are only unique within an event, so both fields make up
//! the key.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Composite key naming one document within a scrape session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentIdentifier {
    /// Normalized event name.
    pub event: String,
    /// Numeric `DocumentFragmentID` from the link query string.
    #[serde(rename = "fragmentID")]
    pub fragment_id: u64,
}

impl DocumentIdentifier {
    pub fn new(event: impl Into<String>, fragment_id: u64) -> Self {
        Self {
            event: event.into(),
            fragment_id,
        }
    }
}

impl fmt::Display for DocumentIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{}", self.event, self.fragment_id)
    }
}

/// Lifecycle state of a document as reported to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadState {
    InProgress,
    Complete,
    Interrupted,
}

impl DownloadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Complete => "complete",
            Self::Interrupted => "interrupted",
        }
    }

    /// Whether no further transitions follow this state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

/// One downloadable artifact referenced by the case table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourtDocument {
    pub id: DocumentIdentifier,
    /// Link text as scraped; not unique.
    pub label: String,
    /// Label made unique within the event group. Empty until uniquified.
    #[serde(default)]
    pub unique_label: String,
    /// Absolute URL of the link.
    pub url: String,
    /// Extension found by the enrichment pass, without the leading dot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_extension: Option<String>,
}

impl CourtDocument {
    pub fn new(id: DocumentIdentifier, label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            unique_label: String::new(),
            url: url.into(),
            file_extension: None,
        }
    }

    pub fn event(&self) -> &str {
        &self.id.event
    }
}

/// A document with its final relative path. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedCourtDocument {
    #[serde(flatten)]
    document: CourtDocument,
    relative_path: String,
}

impl ProcessedCourtDocument {
    pub fn new(document: CourtDocument, relative_path: String) -> Self {
        Self {
            document,
            relative_path,
        }
    }

    pub fn id(&self) -> &DocumentIdentifier {
        &self.document.id
    }

    pub fn url(&self) -> &str {
        &self.document.url
    }

    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }
}

/// Identifier-keyed documents that remember the order rows were scraped in.
///
/// Re-inserting an existing identifier replaces the document but keeps its
/// original position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentSet {
    documents: HashMap<DocumentIdentifier, CourtDocument>,
    order: Vec<DocumentIdentifier>,
}

impl DocumentSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a document, returning the one it replaced (if any).
    pub fn insert(&mut self, document: CourtDocument) -> Option<CourtDocument> {
        let id = document.id.clone();
        let previous = self.documents.insert(id.clone(), document);
        if previous.is_none() {
            self.order.push(id);
        }
        previous
    }

    pub fn remove(&mut self, id: &DocumentIdentifier) -> Option<CourtDocument> {
        let removed = self.documents.remove(id)?;
        self.order.retain(|existing| existing != id);
        Some(removed)
    }

    pub fn get(&self, id: &DocumentIdentifier) -> Option<&CourtDocument> {
        self.documents.get(id)
    }

    pub fn get_mut(&mut self, id: &DocumentIdentifier) -> Option<&mut CourtDocument> {
        self.documents.get_mut(id)
    }

    pub fn contains(&self, id: &DocumentIdentifier) -> bool {
        self.documents.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Documents in scrape order.
    pub fn iter(&self) -> impl Iterator<Item = &CourtDocument> {
        self.order.iter().filter_map(|id| self.documents.get(id))
    }

    /// Identifiers grouped by event.
    ///
    /// Events appear in the order they were first seen; identifiers keep
    /// their row order inside each group.
    pub fn groups(&self) -> Vec<(String, Vec<DocumentIdentifier>)> {
        let mut groups: Vec<(String, Vec<DocumentIdentifier>)> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();

        for id in &self.order {
            match index.get(id.event.as_str()) {
                Some(&slot) => groups[slot].1.push(id.clone()),
                None => {
                    index.insert(id.event.as_str(), groups.len());
                    groups.push((id.event.clone(), vec![id.clone()]));
                }
            }
        }

        groups
    }

    /// Identifiers in per-event, per-row order.
    pub fn grouped_ids(&self) -> Vec<DocumentIdentifier> {
        self.groups().into_iter().flat_map(|(_, ids)| ids).collect()
    }

    /// Consume the set, yielding documents in scrape order.
    pub fn into_documents(mut self) -> Vec<CourtDocument> {
        self.order
            .iter()
            .filter_map(|id| self.documents.remove(id))
            .collect()
    }
}

impl FromIterator<CourtDocument> for DocumentSet {
    fn from_iter<I: IntoIterator<Item = CourtDocument>>(iter: I) -> Self {
        let mut set = DocumentSet::new();
        for document in iter {
            set.insert(document);
        }
        set
    }
}

impl IntoIterator for DocumentSet {
    type Item = CourtDocument;
    type IntoIter = std::vec::IntoIter<CourtDocument>;

    fn into_iter(self) -> Self::IntoIter {
        self.into_documents().into_iter()
    }
}
