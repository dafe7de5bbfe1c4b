//! Offline copy of the case documents page.
//!
//! Links to saved documents are pointed at the local files and the site
//! stylesheet at its local copy, so the saved page browses like the live one.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use url::Url;

use crate::models::ProcessedCourtDocument;
use crate::utils::{html_escape, html_unescape_attr};

static ANCHOR_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<a\b[^>]*>").unwrap());

static LINK_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<link\b[^>]*>").unwrap());

static HREF_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bhref\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#).unwrap()
});

static TARGET_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\s+target\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'>]+)"#).unwrap()
});

/// Percent-encode each segment of a relative path for use in an href.
pub fn relative_href(relative_path: &str) -> String {
    relative_path
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn href_value<'t>(caps: &Captures<'t>) -> Option<&'t str> {
    caps.get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))
        .map(|m| m.as_str())
}

/// Resolve the href of `tag` and look it up in `targets`.
fn lookup<'a>(tag: &str, base_url: &Url, targets: &'a HashMap<String, String>) -> Option<&'a str> {
    let caps = HREF_ATTR.captures(tag)?;
    let raw = html_unescape_attr(href_value(&caps)?);
    let resolved = base_url.join(raw.trim()).ok()?;
    targets.get(resolved.as_str()).map(String::as_str)
}

fn replace_href(tag: &str, href: &str) -> String {
    let replacement = format!("href=\"{}\"", html_escape(href));
    HREF_ATTR
        .replace(tag, regex::NoExpand(&replacement))
        .into_owned()
}

fn open_in_new_tab(tag: &str) -> String {
    let tag = TARGET_ATTR.replace_all(tag, "");
    let (head, close) = match tag.strip_suffix("/>") {
        Some(head) => (head.trim_end(), "/>"),
        None => (tag.strip_suffix('>').unwrap_or(&tag).trim_end(), ">"),
    };
    format!("{} target=\"_blank\"{}", head, close)
}

/// Rewrite a case documents page for offline viewing.
///
/// Every anchor whose resolved href is a saved document points at its
/// relative path and opens in a new tab. A stylesheet link matching
/// `stylesheet` (remote URL, local path) points at the local copy. All other
/// markup is left as is.
pub fn rewrite_index_html(
    html: &str,
    base_url: &Url,
    documents: &[ProcessedCourtDocument],
    stylesheet: Option<(&str, &str)>,
) -> String {
    let targets: HashMap<String, String> = documents
        .iter()
        .filter_map(|doc| {
            let url = Url::parse(doc.url()).ok()?;
            Some((url.to_string(), relative_href(doc.relative_path())))
        })
        .collect();

    let html = ANCHOR_TAG.replace_all(html, |caps: &Captures| {
        let tag = &caps[0];
        match lookup(tag, base_url, &targets) {
            Some(href) => open_in_new_tab(&replace_href(tag, href)),
            None => tag.to_string(),
        }
    });

    let Some((remote, local)) = stylesheet else {
        return html.into_owned();
    };
    let Ok(remote) = Url::parse(remote) else {
        return html.into_owned();
    };
    let stylesheets = HashMap::from([(remote.to_string(), relative_href(local))]);

    LINK_TAG
        .replace_all(&html, |caps: &Captures| {
            let tag = &caps[0];
            match lookup(tag, base_url, &stylesheets) {
                Some(href) => replace_href(tag, href),
                None => tag.to_string(),
            }
        })
        .into_owned()
}
