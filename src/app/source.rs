//! Page source loading for headless scans.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use log::{info, warn};
use url::Url;

use crate::dom::Page;

/// Maximum URL length (2048 characters), matching common browser and server
/// limits.
const MAX_URL_LENGTH: usize = 2048;

/// Validates a page address.
///
/// Adds an `https://` prefix when the scheme is missing. Returns `None` (and
/// logs a warning) for addresses that are too long, malformed or not
/// http(s).
pub fn validate_page_url(url: &str) -> Option<Url> {
    let url = url.trim();
    if url.len() > MAX_URL_LENGTH {
        warn!(
            "Skipping URL exceeding maximum length ({} > {})",
            url.len(),
            MAX_URL_LENGTH
        );
        return None;
    }

    let normalized = if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{url}")
    };

    match Url::parse(&normalized) {
        Ok(parsed) => match parsed.scheme() {
            "http" | "https" => Some(parsed),
            _ => {
                warn!("Unsupported scheme for URL: {url}");
                None
            }
        },
        Err(e) => {
            warn!("Invalid URL {url}: {e}");
            None
        }
    }
}

fn is_remote(page: &str) -> bool {
    page.starts_with("http://") || page.starts_with("https://")
}

/// Loads the page to scan.
///
/// `page` is either an http(s) URL, which is downloaded, or a path to an
/// HTML file. `page_url` overrides the address the document is considered
/// to be served from; a file without one is addressed by its `file://` URL.
///
/// # Errors
///
/// Invalid addresses, download failures, unreadable files.
pub async fn load_page(
    http: &reqwest::Client,
    page: &str,
    page_url: Option<&str>,
) -> Result<Arc<Page>> {
    let address = match page_url {
        Some(raw) => match validate_page_url(raw) {
            Some(url) => Some(url),
            None => bail!("Invalid page URL: {}", raw),
        },
        None => None,
    };

    let (html, address) = if is_remote(page) {
        let url = validate_page_url(page).with_context(|| format!("Invalid URL: {}", page))?;
        info!("Downloading {}", url);
        let html = http
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("Failed to download {}", url))?
            .error_for_status()
            .with_context(|| format!("Failed to download {}", url))?
            .text()
            .await
            .with_context(|| format!("Failed to read body of {}", url))?;
        (html, address.unwrap_or(url))
    } else {
        let html = tokio::fs::read_to_string(page)
            .await
            .with_context(|| format!("Failed to read page file {}", page))?;
        let address = match address {
            Some(url) => url,
            None => {
                let path = tokio::fs::canonicalize(page)
                    .await
                    .with_context(|| format!("Failed to resolve {}", page))?;
                Url::from_file_path(&path)
                    .map_err(|_| anyhow::anyhow!("Cannot address {} as a URL", path.display()))?
            }
        };
        (html, address)
    };

    Page::from_html(address.as_str(), &html).context("Failed to parse page address")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_validate_page_url_adds_scheme() {
        assert_eq!(
            validate_page_url("example.com/gallery").map(String::from).as_deref(),
            Some("https://example.com/gallery")
        );
        assert!(validate_page_url("ftp://example.com").is_none());
        assert!(validate_page_url(&format!("https://{}", "a".repeat(MAX_URL_LENGTH))).is_none());
    }

    #[tokio::test]
    async fn test_load_page_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"<html><body><img src="/a.jpg"></body></html>"#).unwrap();

        let page = load_page(
            &reqwest::Client::new(),
            file.path().to_str().unwrap(),
            Some("https://example.com/gallery"),
        )
        .await
        .unwrap();
        assert_eq!(page.hostname(), "example.com");
        assert_eq!(page.images().len(), 1);

        let page = load_page(&reqwest::Client::new(), file.path().to_str().unwrap(), None)
            .await
            .unwrap();
        assert_eq!(page.url().scheme(), "file");
    }

    #[tokio::test]
    async fn test_load_page_missing_file() {
        assert!(load_page(&reqwest::Client::new(), "/nonexistent/page.html", None)
            .await
            .is_err());
    }
}
