//! HTTP response wrappers and header parsing.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use reqwest::StatusCode;

static FILENAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"filename[^;=\n]*=(?:"([^"\n]*)"|'([^'\n]*)'|([^;\n]*))"#).unwrap()
});

/// HEAD response wrapper (no body, just headers and where we ended up).
#[derive(Debug, Clone)]
pub struct HeadResponse {
    pub status: StatusCode,
    pub headers: HashMap<String, String>,
    /// URL after following redirects.
    pub final_url: String,
    /// True if at least one redirect was followed.
    pub redirected: bool,
}

impl HeadResponse {
    /// Check if the response is successful.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Get the Content-Type header.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(|s| s.as_str())
    }

    /// Get the Content-Disposition header.
    pub fn content_disposition(&self) -> Option<&str> {
        self.headers.get("content-disposition").map(|s| s.as_str())
    }
}

/// Parse filename from Content-Disposition header value.
/// Parses both `filename="name.pdf"` and `filename*=UTF-8''name.pdf` formats.
pub fn parse_content_disposition_filename(header: &str) -> Option<String> {
    // Try filename*= first (RFC 5987 encoded)
    if let Some(start) = header.find("filename*=") {
        let rest = &header[start + 10..];
        if let Some(quote_start) = rest.find("''") {
            let encoded = rest[quote_start + 2..].split([';', ' ']).next()?;
            if let Ok(decoded) = urlencoding::decode(encoded) {
                let filename = decoded.trim().to_string();
                if !filename.is_empty() {
                    return Some(filename);
                }
            }
        }
    }

    // Quoted or bare token up to `;` or newline
    let caps = FILENAME_PATTERN.captures(header)?;
    let raw = caps
        .get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))?
        .as_str();
    let name = raw.replace(['\'', '"'], "").trim().to_string();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Extension (without the dot) after the last `.` of a filename.
pub fn extension_from_filename(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    let ext = ext.trim();
    if ext.is_empty() {
        None
    } else {
        Some(ext.to_string())
    }
}

/// Map a Content-Type to a file extension.
pub fn extension_from_content_type(content_type: &str) -> Option<String> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
        .to_lowercase();

    let known = match essence.as_str() {
        "application/pdf" => Some("pdf"),
        "text/plain" => Some("txt"),
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/tiff" => Some("tif"),
        "application/msword" => Some("doc"),
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => Some("docx"),
        "application/vnd.ms-excel" => Some("xls"),
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => Some("xlsx"),
        _ => None,
    };
    if let Some(ext) = known {
        return Some(ext.to_string());
    }

    mime_guess::get_mime_extensions_str(&essence)
        .and_then(|exts| exts.first())
        .map(|ext| ext.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_disposition_quoted() {
        let header = r#"attachment; filename="document.pdf""#;
        assert_eq!(
            parse_content_disposition_filename(header),
            Some("document.pdf".to_string())
        );
    }

    #[test]
    fn test_parse_content_disposition_single_quoted() {
        let header = "inline; filename='Guardian Report.tif'; size=10";
        assert_eq!(
            parse_content_disposition_filename(header),
            Some("Guardian Report.tif".to_string())
        );
    }

    #[test]
    fn test_parse_content_disposition_unquoted() {
        let header = "attachment; filename=document.pdf; size=1234";
        assert_eq!(
            parse_content_disposition_filename(header),
            Some("document.pdf".to_string())
        );
    }

    #[test]
    fn test_parse_content_disposition_rfc5987() {
        let header = "attachment; filename*=UTF-8''my%20document.pdf";
        assert_eq!(
            parse_content_disposition_filename(header),
            Some("my document.pdf".to_string())
        );
    }

    #[test]
    fn test_parse_content_disposition_none() {
        assert_eq!(parse_content_disposition_filename("attachment"), None);
        assert_eq!(parse_content_disposition_filename("inline"), None);
        assert_eq!(parse_content_disposition_filename(r#"attachment; filename="""#), None);
    }

    #[test]
    fn test_extension_from_filename() {
        assert_eq!(extension_from_filename("a.b.pdf").as_deref(), Some("pdf"));
        assert_eq!(extension_from_filename("README"), None);
        assert_eq!(extension_from_filename("trailing."), None);
    }

    #[test]
    fn test_extension_from_content_type() {
        assert_eq!(
            extension_from_content_type("application/pdf; charset=binary").as_deref(),
            Some("pdf")
        );
        assert_eq!(extension_from_content_type("IMAGE/JPEG").as_deref(), Some("jpg"));
        assert_eq!(extension_from_content_type("application/x-unknown-thing"), None);
    }
}
