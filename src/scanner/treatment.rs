//! Visual treatment of classified images.

use crate::config::{
    ATTR_BLOCKED, ATTR_CLICKABLE, ATTR_PENDING, ATTR_REASON, ATTR_SAFE, ATTR_WARNED,
    BLOCKED_TITLE, UNSCANNED_TITLE, WARNED_TITLE,
};
use crate::detection::DetectionResult;
use crate::dom::{ClickHandler, ImageElement, ImageState};
use crate::early_blur::is_early_blurred;

fn reason(result: &DetectionResult) -> String {
    serde_json::to_string(&result.predictions).unwrap_or_else(|_| "null".to_string())
}

/// Lets the early-blur stylesheet release the image.
fn release(image: &ImageElement) {
    image.set_attribute(ATTR_SAFE, "true");
    image.remove_attribute(ATTR_PENDING);
    if is_early_blurred(image) {
        image.remove_style("filter");
    }
}

/// Strong blur, dimmed, with a confirm-to-reveal click handler.
pub fn mark_blocked(image: &ImageElement, result: &DetectionResult) {
    image.set_style("filter", "blur(20px)");
    image.set_style("opacity", "0.3");
    image.set_attribute(ATTR_BLOCKED, "true");
    image.set_attribute(ATTR_REASON, &reason(result));
    image.remove_attribute(ATTR_PENDING);
    image.set_title(BLOCKED_TITLE);
    image.set_style("cursor", "pointer");
    image.set_click_handler(ClickHandler::RevealBlocked);
    image.set_state(ImageState::Blocked);
}

/// Orange border and tooltip; the image stays visible.
pub fn mark_warned(image: &ImageElement, result: &DetectionResult) {
    image.set_attribute(ATTR_WARNED, "true");
    image.set_attribute(ATTR_REASON, &reason(result));
    image.set_title(WARNED_TITLE);
    image.set_style("border", "3px solid orange");
    release(image);
    image.set_state(ImageState::Warned);
}

/// Allowed images are left as they are, except for releasing the early blur.
pub fn mark_allowed(image: &ImageElement) {
    if is_early_blurred(image) || image.has_attribute(ATTR_PENDING) {
        release(image);
    }
    image.set_state(ImageState::Allowed);
}

/// Gives an image that could not be scanned a click-to-reveal affordance.
pub fn add_click_to_reveal(image: &ImageElement) {
    if image.has_attribute(ATTR_CLICKABLE) {
        return;
    }
    image.set_attribute(ATTR_CLICKABLE, "true");
    image.set_title(UNSCANNED_TITLE);
    image.set_style("cursor", "pointer");
    image.set_click_handler(ClickHandler::RevealUnscanned);
}
