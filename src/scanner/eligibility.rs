//! Image identity, fetchable URL and size checks.

use url::Url;

use crate::config::{MIN_IMAGE_DIMENSION, MIN_IMAGE_DIMENSION_IMAGE_SEARCH};
use crate::detection::is_inline_media_url;
use crate::dom::ImageElement;

/// Why an image was not sent for classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Already blocked or warned.
    AlreadyTreated,
    /// No source and no identifying container.
    NoIdentity,
    /// Already in the processed set.
    Duplicate,
    /// Only inline (`data:`/`blob:`) sources.
    NotFetchable,
    TooSmall,
    /// Still loading after the wait, or failed to load.
    NotLoaded,
}

fn resolve(page_url: &Url, raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if is_inline_media_url(raw) {
        return Some(raw.to_string());
    }
    page_url.join(raw).ok().map(String::from)
}

/// Stable identifier of an image within one page lifetime.
///
/// The resolved `src` (inline sources are shortened to their first 100
/// characters plus length), else `data-src`, else the enclosing `data-id`
/// container.
pub fn image_identifier(image: &ImageElement, page_url: &Url) -> Option<String> {
    if let Some(src) = image.src().and_then(|src| resolve(page_url, &src)) {
        if src.starts_with("data:") {
            let head: String = src.chars().take(100).collect();
            return Some(format!("base64-{}-{}", head, src.len()));
        }
        return Some(src);
    }
    if let Some(data_src) = image
        .attribute("data-src")
        .and_then(|src| resolve(page_url, &src))
    {
        return Some(data_src);
    }
    image
        .container_id()
        .map(|id| format!("container-{}", id))
}

/// The URL to download the image from, if any.
///
/// On an image-search surface thumbnails are inline or proxied, so the
/// original is looked up first: the `imgurl` query of the enclosing result
/// link, then `data-iurl`, then `data-src` and `src` when they are neither
/// inline nor `encrypted-` thumbnail proxies. Elsewhere the first non-inline
/// of `src`, `data-src` and `data-lazy-src` is used.
pub fn fetchable_url(image: &ImageElement, page_url: &Url, image_search: bool) -> Option<String> {
    if image_search {
        if let Some(original) = image
            .anchor_href()
            .and_then(|href| page_url.join(href).ok())
            .and_then(|link| {
                link.query_pairs()
                    .find(|(key, _)| key == "imgurl")
                    .map(|(_, value)| value.into_owned())
            })
            .filter(|value| !value.is_empty())
        {
            return Some(original);
        }
        return ["data-iurl", "data-src", "src"]
            .iter()
            .filter_map(|name| image.attribute(name))
            .filter_map(|raw| resolve(page_url, &raw))
            .find(|candidate| !is_inline_media_url(candidate) && !candidate.contains("encrypted-"));
    }

    ["src", "data-src", "data-lazy-src"]
        .iter()
        .filter_map(|name| image.attribute(name))
        .filter_map(|raw| resolve(page_url, &raw))
        .find(|candidate| !is_inline_media_url(candidate))
}

pub fn min_dimension(image_search: bool) -> u32 {
    if image_search {
        MIN_IMAGE_DIMENSION_IMAGE_SEARCH
    } else {
        MIN_IMAGE_DIMENSION
    }
}

/// Whether the image is at least `min` pixels in both axes.
///
/// The intrinsic size decides; the rendered size is used only when the
/// intrinsic size is unknown.
pub fn has_min_size(image: &ImageElement, min: u32) -> bool {
    match image.natural_size().or_else(|| image.rendered_size()) {
        Some((width, height)) => width >= min && height >= min,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Page;

    fn first_image(url: &str, body: &str) -> (std::sync::Arc<ImageElement>, Url) {
        let page = Page::from_html(url, &format!("<html><body>{}</body></html>", body)).unwrap();
        (page.images()[0].clone(), page.url().clone())
    }

    #[test]
    fn test_identifier_resolves_relative_src() {
        let (img, url) = first_image("https://example.com/a/page", r#"<img src="pic.jpg">"#);
        assert_eq!(
            image_identifier(&img, &url).as_deref(),
            Some("https://example.com/a/pic.jpg")
        );
    }

    #[test]
    fn test_identifier_shortens_inline_sources() {
        let data = format!("data:image/png;base64,{}", "A".repeat(300));
        let (img, url) = first_image("https://example.com/", &format!(r#"<img src="{}">"#, data));
        let id = image_identifier(&img, &url).unwrap();
        assert!(id.starts_with("base64-data:image/png"));
        assert!(id.ends_with(&format!("-{}", data.len())));
    }

    #[test]
    fn test_identifier_falls_back_to_container() {
        let (img, url) = first_image("https://example.com/", r#"<div data-id="abc"><img></div>"#);
        assert_eq!(image_identifier(&img, &url).as_deref(), Some("container-abc"));
    }

    #[test]
    fn test_fetchable_url_skips_inline_placeholders() {
        let (img, url) = first_image(
            "https://example.com/",
            r#"<img src="data:image/gif;base64,R0lG" data-src="/real.jpg">"#,
        );
        assert_eq!(
            fetchable_url(&img, &url, false).as_deref(),
            Some("https://example.com/real.jpg")
        );

        let (img, url) = first_image("https://example.com/", r#"<img src="blob:https://example.com/1">"#);
        assert_eq!(fetchable_url(&img, &url, false), None);
    }

    #[test]
    fn test_fetchable_url_on_image_search() {
        let (img, url) = first_image(
            "https://www.google.com/search?tbm=isch&q=x",
            r#"<a href="/imgres?imgurl=https%3A%2F%2Fcdn.example.com%2Ffull.jpg&w=1"><img src="https://encrypted-tbn0.gstatic.com/images?q=1"></a>"#,
        );
        assert_eq!(
            fetchable_url(&img, &url, true).as_deref(),
            Some("https://cdn.example.com/full.jpg")
        );

        let (img, url) = first_image(
            "https://www.google.com/search?tbm=isch&q=x",
            r#"<img src="https://encrypted-tbn0.gstatic.com/images?q=1">"#,
        );
        assert_eq!(fetchable_url(&img, &url, true), None);
    }

    #[test]
    fn test_size_uses_intrinsic_size_first() {
        let (img, _) = first_image(
            "https://example.com/",
            r#"<img src="/a.jpg" data-natural-width="40" data-natural-height="40" style="width: 200px; height: 200px">"#,
        );
        assert!(!has_min_size(&img, 50));

        let (img, _) = first_image(
            "https://example.com/",
            r#"<img src="/a.jpg" style="width: 64px; height: 64px">"#,
        );
        assert!(has_min_size(&img, 50));

        let (img, _) = first_image("https://example.com/", r#"<img src="/a.jpg" width="50" height="49">"#);
        assert!(!has_min_size(&img, 50));
        assert!(has_min_size(&img, 30));
    }
}
