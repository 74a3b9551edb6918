//! Early-blur guard.
//!
//! On an image-search results page, blurs every image before the page
//! scanner has had a chance to classify anything:
//! - a stylesheet inserted at the very start of `<head>` blurs all images by
//!   default and releases them through the scanner's annotations
//! - an inline `blur` filter is applied to every image present once `<body>`
//!   exists and to every image inserted afterwards
//!
//! The guard makes no network calls and no verdicts, and depends on nothing
//! but the page model.

use std::ops::ControlFlow;
use std::sync::Arc;

use url::Url;

use crate::config::{ATTR_PROCESSED, EARLY_BLUR_STYLE_ID};
use crate::dom::{ImageElement, MutationObserver, MutationRecord, Page};

/// Value of the processed marker set by the guard.
pub const PROCESSED_BLUR: &str = "blur";

/// Blur-by-default rules with carve-outs for the scanner's annotations.
pub const EARLY_BLUR_CSS: &str = r#"
img:not([data-mg-safe="true"]):not([data-mg-warned="true"]) {
  filter: blur(15px) !important;
}
img[data-mg-safe="true"] {
  filter: none !important;
}
img[data-mg-blocked="true"] {
  filter: blur(25px) !important;
  opacity: 0.3 !important;
}
img[data-mg-warned="true"] {
  filter: none !important;
  outline: 3px solid orange !important;
}
"#;

/// Whether `url` is a search engine's image results page.
///
/// The host must contain `google` and the URL must select image search
/// (`tbm=isch`, `udm=2`) or point at an image or search path.
pub fn is_image_search_surface(url: &Url) -> bool {
    let is_google = url.host_str().is_some_and(|host| host.contains("google"));
    if !is_google {
        return false;
    }
    let query = url.query().unwrap_or("");
    let path = url.path();
    query.contains("tbm=isch")
        || query.contains("udm=2")
        || path.contains("/imghp")
        || path.contains("/images")
        || path.contains("/search")
}

/// Applies the inline blur to `image` unless the guard already did.
///
/// Returns whether the image was changed.
pub fn blur_image(image: &ImageElement) -> bool {
    if image.has_attribute(ATTR_PROCESSED) {
        return false;
    }
    image.set_attribute(ATTR_PROCESSED, PROCESSED_BLUR);
    image.set_style_important("filter", "blur(15px)");
    image.set_style_important("transition", "filter 0.3s ease");
    true
}

/// Whether the guard blurred `image`.
pub fn is_early_blurred(image: &ImageElement) -> bool {
    image.attribute(ATTR_PROCESSED).as_deref() == Some(PROCESSED_BLUR)
}

fn blur_all(page: &Page) -> usize {
    let blurred = page.images().iter().filter(|img| blur_image(img)).count();
    log::debug!("Early blur applied to {} existing images", blurred);
    blurred
}

fn insert_style(page: &Page) -> bool {
    let inserted = page.insert_stylesheet_first(EARLY_BLUR_STYLE_ID, EARLY_BLUR_CSS);
    if inserted {
        log::debug!("Early blur stylesheet injected");
    }
    inserted
}

/// The installed guard. Dropping it stops the inline blurring.
#[derive(Debug)]
pub struct EarlyBlurGuard {
    observer: MutationObserver,
}

impl EarlyBlurGuard {
    /// Installs the guard on `page` if it is an image-search surface.
    pub fn install(page: &Arc<Page>) -> Option<Self> {
        if !is_image_search_surface(page.url()) {
            return None;
        }
        log::info!("Early blur guard active on {}", page.hostname());

        // Subscribe before looking at the document so nothing slips between
        let observer = MutationObserver::observe(page, {
            let page = Arc::downgrade(page);
            move |records| {
                let flow = match page.upgrade() {
                    Some(page) => {
                        handle_records(&page, records);
                        ControlFlow::Continue(())
                    }
                    None => ControlFlow::Break(()),
                };
                std::future::ready(flow)
            }
        });

        insert_style(page);
        if page.has_body() {
            blur_all(page);
        }

        Some(Self { observer })
    }

    pub fn is_active(&self) -> bool {
        self.observer.is_connected()
    }

    pub fn stop(&self) {
        self.observer.disconnect();
    }
}

fn handle_records(page: &Page, records: Vec<MutationRecord>) {
    for record in records {
        match record {
            MutationRecord::HeadAttached => {
                insert_style(page);
            }
            MutationRecord::BodyAttached => {
                blur_all(page);
            }
            MutationRecord::ImagesAdded(images) => {
                for image in images {
                    blur_image(&image);
                }
            }
            MutationRecord::SourceChanged(_) => {}
        }
    }
}
