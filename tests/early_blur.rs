//! Early-blur guard on pages that are still loading.

use std::time::Duration;

use media_guard::config::{ATTR_PROCESSED, EARLY_BLUR_STYLE_ID};
use media_guard::dom::{Page, ReadyState};
use media_guard::early_blur::{is_early_blurred, EARLY_BLUR_CSS};
use media_guard::EarlyBlurGuard;

const IMAGE_SEARCH: &str = "https://www.google.com/search?q=beach&udm=2";

#[tokio::test]
async fn test_stylesheet_is_first_in_head() {
    let page = Page::loading(IMAGE_SEARCH).unwrap();
    page.attach_head();
    assert!(page.insert_stylesheet_first("site-css", "body { margin: 0 }"));

    let _guard = EarlyBlurGuard::install(&page).expect("image search page");

    assert_eq!(
        page.stylesheet_ids(),
        vec![EARLY_BLUR_STYLE_ID.to_string(), "site-css".to_string()]
    );
    assert_eq!(page.stylesheet(EARLY_BLUR_STYLE_ID).as_deref(), Some(EARLY_BLUR_CSS));
}

#[tokio::test]
async fn test_images_are_blurred_once_body_exists() {
    let page = Page::loading(IMAGE_SEARCH).unwrap();
    let guard = EarlyBlurGuard::install(&page).expect("image search page");

    page.attach_head();
    page.attach_body();
    let first = page.insert_html(r#"<div class="grid"><img src="/1.jpg"><img src="/2.jpg"></div>"#);
    page.set_ready_state(ReadyState::Interactive);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(page.count_elements(EARLY_BLUR_STYLE_ID), 1);
    assert!(first.iter().all(|img| is_early_blurred(img)));
    assert_eq!(first[0].style("filter").as_deref(), Some("blur(15px)"));

    guard.stop();
    let late = page.insert_html(r#"<img src="/3.jpg">"#);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!late[0].has_attribute(ATTR_PROCESSED));
}

#[tokio::test]
async fn test_guard_ignores_regular_pages() {
    let page = Page::loading("https://example.com/gallery").unwrap();
    assert!(EarlyBlurGuard::install(&page).is_none());
}

#[tokio::test]
async fn test_insertion_burst_blurs_every_image() {
    let page = Page::from_html(IMAGE_SEARCH, "<html><head></head><body></body></html>").unwrap();
    let _guard = EarlyBlurGuard::install(&page).expect("image search page");

    for i in 0..1100 {
        page.insert_html(&format!(r#"<img src="/thumb/{i}.jpg">"#));
    }
    let unblurred = || page.images().iter().filter(|img| !is_early_blurred(img)).count();
    for _ in 0..100 {
        if unblurred() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(page.images().len(), 1100);
    assert_eq!(unblurred(), 0);
}
