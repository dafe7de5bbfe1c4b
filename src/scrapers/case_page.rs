//! Case page loading and header extraction.
//!
//! `scraper::Html` is not `Send`, so a [`CasePage`] keeps the raw markup and
//! parses it inside synchronous methods. Nothing holds a parsed tree across
//! an `.await`.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};
use url::Url;

use super::case_table::{reconcile, ReconcileStats};
use super::http_client::HttpClient;
use super::ScrapeError;
use crate::models::{CaseMetadata, DocumentSet};
use crate::utils::DateSeparator;

static CASE_NUMBER_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div > span").unwrap());

static BODY_DIV_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body > div").unwrap());

static LINK_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

static STYLESHEET_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"link[rel~="stylesheet"][href]"#).unwrap());

static PERSON_NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"In the Matter of:\s+(.+)").unwrap());

/// Everything a scrape produces from one case documents page.
#[derive(Debug, Clone)]
pub struct ScrapedCase {
    pub metadata: CaseMetadata,
    pub documents: DocumentSet,
    pub stylesheet_url: Option<String>,
    pub stats: ReconcileStats,
}

/// Raw markup of a case page plus the URL its links resolve against.
#[derive(Debug, Clone)]
pub struct CasePage {
    html: String,
    base_url: Url,
}

impl CasePage {
    pub fn new(html: impl Into<String>, base_url: Url) -> Self {
        Self {
            html: html.into(),
            base_url,
        }
    }

    /// Build a page from markup and a base URL string.
    pub fn from_html(html: impl Into<String>, base_url: &str) -> Result<Self, ScrapeError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ScrapeError::InvalidBaseUrl(base_url.to_string(), e))?;
        Ok(Self::new(html, base_url))
    }

    /// Load a page from an `http(s)` URL or a saved file.
    ///
    /// For files, `base_url` should name the page's original location so
    /// relative document links resolve; without it they resolve against the
    /// file itself.
    pub async fn load(
        source: &str,
        base_url: Option<&str>,
        client: &HttpClient,
    ) -> Result<Self, ScrapeError> {
        if source.starts_with("http://") || source.starts_with("https://") {
            info!("Fetching case page {}", source);
            let html = client.get_text(source).await?;
            let base = base_url.unwrap_or(source);
            return Self::from_html(html, base);
        }

        let path = Path::new(source);
        let html = tokio::fs::read_to_string(path).await?;
        match base_url {
            Some(base) => Self::from_html(html, base),
            None => {
                warn!(
                    "No base URL given for {}; relative document links resolve against the file",
                    path.display()
                );
                let absolute = std::path::absolute(path)?;
                let base = Url::from_file_path(&absolute)
                    .map_err(|_| ScrapeError::InvalidPath(absolute.display().to_string()))?;
                Ok(Self::new(html, base))
            }
        }
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Scrape case metadata, reconcile the document table and find the stylesheet.
    ///
    /// Missing case metadata fails the whole scrape; malformed rows do not.
    pub fn scrape(
        &self,
        separator: DateSeparator,
        stylesheet_name: &str,
    ) -> Result<ScrapedCase, ScrapeError> {
        let document = Html::parse_document(&self.html);
        let metadata = extract_case_metadata(&document)?;
        info!(
            "Case {} ({})",
            metadata.case_number, metadata.person_name
        );

        let (documents, stats) = reconcile(&document, &self.base_url, separator);
        let stylesheet_url = find_stylesheet_url(&document, &self.base_url, stylesheet_name);

        Ok(ScrapedCase {
            metadata,
            documents,
            stylesheet_url,
            stats,
        })
    }

    /// Locate the link to the case documents page on a case summary page.
    pub fn case_documents_url(&self, pattern: &str) -> Option<String> {
        let document = Html::parse_document(&self.html);
        find_case_documents_url(&document, &self.base_url, pattern)
    }
}

/// Pull the case number and person name out of the page header.
pub fn extract_case_metadata(document: &Html) -> Result<CaseMetadata, ScrapeError> {
    let case_number = document
        .select(&CASE_NUMBER_SELECTOR)
        .map(|span| element_text(&span))
        .find(|text| !text.is_empty())
        .ok_or(ScrapeError::MissingCaseNumber)?;

    // The "In the Matter of" block is the last top-level div; search upward from it.
    let divs: Vec<ElementRef<'_>> = document.select(&BODY_DIV_SELECTOR).collect();
    let person_name = divs
        .iter()
        .rev()
        .find_map(|div| {
            let text: String = div.text().collect();
            PERSON_NAME_PATTERN
                .captures(&text)
                .map(|caps| caps[1].trim().to_string())
        })
        .filter(|name| !name.is_empty())
        .ok_or(ScrapeError::MissingPersonName)?;

    Ok(CaseMetadata::new(case_number, person_name))
}

/// First link whose `href` contains `pattern`, resolved to an absolute URL.
pub fn find_case_documents_url(document: &Html, base_url: &Url, pattern: &str) -> Option<String> {
    let found = document
        .select(&LINK_SELECTOR)
        .filter_map(|a| a.value().attr("href"))
        .find(|href| href.contains(pattern))?;

    match base_url.join(found) {
        Ok(url) => Some(url.to_string()),
        Err(e) => {
            debug!("Unresolvable case documents link {}: {}", found, e);
            None
        }
    }
}

/// Stylesheet link whose `href` ends with `name` (case-insensitive).
pub fn find_stylesheet_url(document: &Html, base_url: &Url, name: &str) -> Option<String> {
    let name = name.to_lowercase();
    document
        .select(&STYLESHEET_SELECTOR)
        .filter_map(|link| link.value().attr("href"))
        .find(|href| {
            let path = href.split(['?', '#']).next().unwrap_or(href);
            path.to_lowercase().ends_with(&name)
        })
        .and_then(|href| base_url.join(href).ok())
        .map(|url| url.to_string())
}

/// Text content of an element with whitespace runs collapsed to single spaces.
pub(crate) fn element_text(element: &ElementRef<'_>) -> String {
    let raw: String = element.text().collect();
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}
