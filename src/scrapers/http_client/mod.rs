//! HTTP client for case pages, metadata probes and document bodies.

mod response;

pub use response::{
    extension_from_content_type, extension_from_filename, parse_content_disposition_filename,
    HeadResponse,
};

use std::collections::HashMap;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CACHE_CONTROL, COOKIE, PRAGMA};
use reqwest::{Client, Response};
use tracing::debug;

/// Accept header sent with metadata probes, matching what a browser sends
/// when following a document link.
const PROBE_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

pub const USER_AGENT: &str = concat!("casedocs/", env!("CARGO_PKG_VERSION"));

/// Desktop browser agent for portals that turn away non-browser clients.
///
/// Fixed rather than rotated: the session cookie comes from the user's
/// browser and the portal sees one client for the whole run.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// `None` or empty = [`USER_AGENT`], `"browser"`/`"impersonate"` =
/// [`BROWSER_USER_AGENT`], anything else is sent as given.
pub fn resolve_user_agent(config: Option<&str>) -> &str {
    match config.map(str::trim) {
        None | Some("") => USER_AGENT,
        Some(name) if name.eq_ignore_ascii_case("browser") => BROWSER_USER_AGENT,
        Some(name) if name.eq_ignore_ascii_case("impersonate") => BROWSER_USER_AGENT,
        Some(custom) => custom,
    }
}

/// Errors building an [`HttpClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientBuildError {
    #[error("Invalid cookie header: {0}")]
    InvalidCookie(#[from] reqwest::header::InvalidHeaderValue),
    #[error("Failed to create HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Options for constructing an [`HttpClient`].
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    pub timeout: Duration,
    /// See [`resolve_user_agent`].
    pub user_agent: Option<String>,
    /// Raw `Cookie` header carrying the site session.
    pub cookie: Option<String>,
}

/// HTTP client sharing one cookie jar across page fetches, probes and downloads.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a new HTTP client.
    pub fn new(options: &ClientOptions) -> Result<Self, ClientBuildError> {
        let user_agent = resolve_user_agent(options.user_agent.as_deref()).to_string();

        let mut headers = HeaderMap::new();
        if let Some(ref cookie) = options.cookie {
            let mut value = HeaderValue::from_str(cookie)?;
            value.set_sensitive(true);
            headers.insert(COOKIE, value);
        }

        let client = Client::builder()
            .user_agent(&user_agent)
            .timeout(options.timeout)
            .default_headers(headers)
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self { client })
    }

    /// Get page content as text.
    pub async fn get_text(&self, url: &str) -> Result<String, reqwest::Error> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        response.text().await
    }

    /// Start a GET for a document body. The caller streams the body.
    pub async fn get(&self, url: &str) -> Result<Response, reqwest::Error> {
        self.client.get(url).send().await?.error_for_status()
    }

    /// Make a HEAD request to check headers without downloading content.
    /// Redirects are followed; the response records whether any happened.
    pub async fn head(&self, url: &str) -> Result<HeadResponse, reqwest::Error> {
        let start = Instant::now();
        let response = self
            .client
            .head(url)
            .header(ACCEPT, PROBE_ACCEPT)
            .header(CACHE_CONTROL, "no-cache")
            .header(PRAGMA, "no-cache")
            .send()
            .await?;

        let final_url = response.url().to_string();
        let redirected = url::Url::parse(url)
            .map(|requested| requested != *response.url())
            .unwrap_or(true);

        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(name.to_string(), v.to_string());
            }
        }

        debug!(
            "HEAD {} -> {} in {}ms{}",
            url,
            response.status(),
            start.elapsed().as_millis(),
            if redirected { " (redirected)" } else { "" }
        );

        Ok(HeadResponse {
            status: response.status(),
            headers,
            final_url,
            redirected,
        })
    }
}
