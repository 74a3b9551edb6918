//! User site blacklist.
//!
//! Patterns are host names (`example.com`) or wildcard host names
//! (`*.example.com`, which also matches `example.com` itself). A leading
//! `www.` is ignored on both sides.

use url::Url;

use crate::storage::{keys, Storage, StorageArea};

/// Reduces a user-entered pattern to a lowercase host name.
pub fn normalize_pattern(pattern: &str) -> String {
    let trimmed = pattern.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    if let Some(base) = trimmed.strip_prefix("*.") {
        let base = normalize_pattern(base);
        return if base.is_empty() {
            String::new()
        } else {
            format!("*.{}", base)
        };
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };
    match Url::parse(&with_scheme).ok().and_then(|u| u.host_str().map(str::to_string)) {
        Some(host) => normalize_hostname(&host),
        None => {
            let without_scheme = trimmed
                .trim_start_matches("https://")
                .trim_start_matches("http://");
            normalize_hostname(without_scheme.split('/').next().unwrap_or(""))
        }
    }
}

pub fn normalize_hostname(hostname: &str) -> String {
    let lower = hostname.trim().to_lowercase();
    lower.strip_prefix("www.").unwrap_or(&lower).to_string()
}

pub fn matches_pattern(hostname: &str, pattern: &str) -> bool {
    let pattern = normalize_pattern(pattern);
    let hostname = normalize_hostname(hostname);
    if pattern.is_empty() || hostname.is_empty() {
        return false;
    }
    match pattern.strip_prefix("*.") {
        Some(base) => hostname == base || hostname.ends_with(&format!(".{}", base)),
        None => hostname == pattern,
    }
}

async fn read_from(storage: &Storage, area: StorageArea) -> Vec<String> {
    match storage.read::<Vec<String>>(keys::BLACKLIST, area).await {
        Ok(list) => list
            .unwrap_or_default()
            .into_iter()
            .filter(|p| !p.trim().is_empty())
            .collect(),
        Err(e) => {
            log::warn!("Failed to read blacklist from {} storage: {}", area, e);
            Vec::new()
        }
    }
}

/// The blacklist from sync storage, or from local storage when sync has none.
pub async fn load_blacklist(storage: &Storage) -> Vec<String> {
    let synced = read_from(storage, StorageArea::Sync).await;
    if !synced.is_empty() {
        return synced;
    }
    read_from(storage, StorageArea::Local).await
}

/// First pattern of `blacklist` matching `hostname`.
pub fn find_match<'a>(hostname: &str, blacklist: &'a [String]) -> Option<&'a str> {
    blacklist
        .iter()
        .map(String::as_str)
        .find(|pattern| matches_pattern(hostname, pattern))
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Markup of the full-page overlay shown on a blacklisted site.
pub fn overlay_html(pattern: &str) -> String {
    format!(
        concat!(
            r#"<div class="mg-blacklist-card">"#,
            r#"<h2>This page has been blocked</h2>"#,
            r#"<p>The current domain matches your blacklist.</p>"#,
            r#"<p>Blocked pattern: <code>{}</code></p>"#,
            r#"<button data-action="leave">Leave this page</button>"#,
            r#"<button data-action="settings">Open settings (keep blocking)</button>"#,
            r#"</div>"#
        ),
        escape_html(pattern)
    )
}
