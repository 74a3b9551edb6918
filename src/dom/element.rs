//! Image elements of the headless page.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use strum_macros::AsRefStr;
use tokio::sync::watch;

use crate::config::{
    ATTR_SAFE, REVEALED_TITLE, REVEAL_PROMPT, UNSCANNED_REVEALED_TITLE,
};

/// Loading progress of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Loading,
    Loaded,
    Failed,
}

/// Moderation state of an image.
///
/// `Unprocessed → Scanning → {Blocked, Warned, Allowed}`, and
/// `Blocked → Revealed` through a user click. Failed classifications end in
/// `Allowed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ImageState {
    Unprocessed,
    Scanning,
    Blocked,
    Warned,
    Allowed,
    Revealed,
}

/// The one-shot click handler an image can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickHandler {
    /// Asks for confirmation, then unblurs a blocked image.
    RevealBlocked,
    /// Releases an image that could not be scanned.
    RevealUnscanned,
}

/// What a click did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    /// No handler was installed (or it already fired).
    Ignored,
    /// The user declined the confirmation; the handler is spent anyway.
    Declined,
    Revealed,
}

/// A blocking yes/no question to the user.
pub trait ConfirmPrompt {
    fn confirm(&self, message: &str) -> bool;
}

impl<F> ConfirmPrompt for F
where
    F: Fn(&str) -> bool,
{
    fn confirm(&self, message: &str) -> bool {
        self(message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct StyleValue {
    value: String,
    important: bool,
}

#[derive(Debug)]
struct ElementData {
    attributes: BTreeMap<String, String>,
    styles: BTreeMap<String, StyleValue>,
    state: ImageState,
    click_handler: Option<ClickHandler>,
}

/// An `<img>` element.
///
/// Attributes, inline styles and state sit behind a mutex; no lock is held
/// across an await.
pub struct ImageElement {
    node_id: u64,
    data: Mutex<ElementData>,
    load: watch::Sender<LoadState>,
    anchor_href: Option<String>,
    container_id: Option<String>,
}

impl fmt::Debug for ImageElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageElement")
            .field("node_id", &self.node_id)
            .field("src", &self.attribute("src"))
            .field("state", &self.state())
            .finish()
    }
}

impl ImageElement {
    pub(crate) fn new(
        node_id: u64,
        attributes: BTreeMap<String, String>,
        anchor_href: Option<String>,
        container_id: Option<String>,
        load_state: LoadState,
    ) -> Self {
        let styles = attributes
            .get("style")
            .map(|style| parse_inline_style(style))
            .unwrap_or_default();
        let (load, _) = watch::channel(load_state);
        Self {
            node_id,
            data: Mutex::new(ElementData {
                attributes,
                styles,
                state: ImageState::Unprocessed,
                click_handler: None,
            }),
            load,
            anchor_href,
            container_id,
        }
    }

    fn data(&self) -> MutexGuard<'_, ElementData> {
        // A poisoned element is still a usable element
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Document-unique node identity.
    pub fn node_id(&self) -> u64 {
        self.node_id
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.data().attributes.get(name).cloned()
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.data().attributes.contains_key(name)
    }

    pub fn set_attribute(&self, name: &str, value: &str) {
        self.data()
            .attributes
            .insert(name.to_string(), value.to_string());
    }

    pub fn remove_attribute(&self, name: &str) {
        self.data().attributes.remove(name);
    }

    pub fn src(&self) -> Option<String> {
        self.attribute("src").filter(|s| !s.is_empty())
    }

    pub fn title(&self) -> Option<String> {
        self.attribute("title")
    }

    pub fn set_title(&self, title: &str) {
        self.set_attribute("title", title);
    }

    /// `href` of the closest enclosing link.
    pub fn anchor_href(&self) -> Option<&str> {
        self.anchor_href.as_deref()
    }

    /// `data-id` of the closest enclosing container.
    pub fn container_id(&self) -> Option<&str> {
        self.container_id.as_deref()
    }

    pub fn style(&self, property: &str) -> Option<String> {
        self.data().styles.get(property).map(|s| s.value.clone())
    }

    pub fn style_is_important(&self, property: &str) -> bool {
        self.data()
            .styles
            .get(property)
            .is_some_and(|s| s.important)
    }

    pub fn set_style(&self, property: &str, value: &str) {
        self.insert_style(property, value, false);
    }

    pub fn set_style_important(&self, property: &str, value: &str) {
        self.insert_style(property, value, true);
    }

    fn insert_style(&self, property: &str, value: &str, important: bool) {
        self.data().styles.insert(
            property.to_string(),
            StyleValue {
                value: value.to_string(),
                important,
            },
        );
    }

    pub fn remove_style(&self, property: &str) {
        self.data().styles.remove(property);
    }

    /// Serialized inline style, as the `style` attribute would read.
    pub fn style_text(&self) -> String {
        self.data()
            .styles
            .iter()
            .map(|(property, s)| {
                if s.important {
                    format!("{}: {} !important;", property, s.value)
                } else {
                    format!("{}: {};", property, s.value)
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn state(&self) -> ImageState {
        self.data().state
    }

    pub fn set_state(&self, state: ImageState) {
        self.data().state = state;
    }

    /// Intrinsic size, once known.
    ///
    /// Taken from `data-natural-width`/`data-natural-height` when the host
    /// reported them, else from the `width`/`height` attributes.
    pub fn natural_size(&self) -> Option<(u32, u32)> {
        let data = self.data();
        dimension_pair(&data.attributes, "data-natural-width", "data-natural-height")
            .or_else(|| dimension_pair(&data.attributes, "width", "height"))
    }

    /// Displayed size from the inline `width`/`height` styles.
    pub fn rendered_size(&self) -> Option<(u32, u32)> {
        let data = self.data();
        let width = data.styles.get("width").and_then(|s| parse_px(&s.value))?;
        let height = data.styles.get("height").and_then(|s| parse_px(&s.value))?;
        Some((width, height))
    }

    pub fn load_state(&self) -> LoadState {
        *self.load.borrow()
    }

    /// Loaded with a known intrinsic size.
    pub fn is_complete(&self) -> bool {
        self.load_state() == LoadState::Loaded && self.natural_size().is_some_and(|(w, h)| w > 0 && h > 0)
    }

    /// Marks the image loaded, recording its intrinsic size when given.
    pub fn finish_loading(&self, natural_size: Option<(u32, u32)>) {
        if let Some((width, height)) = natural_size {
            let mut data = self.data();
            data.attributes
                .insert("data-natural-width".to_string(), width.to_string());
            data.attributes
                .insert("data-natural-height".to_string(), height.to_string());
        }
        self.load.send_replace(LoadState::Loaded);
    }

    pub fn fail_loading(&self) {
        self.load.send_replace(LoadState::Failed);
    }

    /// Waits until the image stops loading, or `timeout` elapses.
    pub async fn wait_loaded(&self, timeout: Duration) -> LoadState {
        let mut rx = self.load.subscribe();
        let wait = rx.wait_for(|state| *state != LoadState::Loading);
        let state = match tokio::time::timeout(timeout, wait).await {
            Ok(Ok(state)) => *state,
            _ => self.load_state(),
        };
        state
    }

    /// Installs the one-shot click handler, replacing any previous one.
    pub fn set_click_handler(&self, handler: ClickHandler) {
        self.data().click_handler = Some(handler);
    }

    pub fn click_handler(&self) -> Option<ClickHandler> {
        self.data().click_handler
    }

    /// Simulates a user click.
    ///
    /// The handler is consumed by the first click whatever the answer to
    /// the confirmation prompt, so a second click never fires it again.
    pub fn click(&self, prompt: &dyn ConfirmPrompt) -> ClickOutcome {
        let handler = self.data().click_handler.take();
        match handler {
            None => ClickOutcome::Ignored,
            Some(ClickHandler::RevealBlocked) => {
                if !prompt.confirm(REVEAL_PROMPT) {
                    return ClickOutcome::Declined;
                }
                self.set_style("filter", "none");
                self.set_style("opacity", "1");
                self.set_title(REVEALED_TITLE);
                self.set_state(ImageState::Revealed);
                ClickOutcome::Revealed
            }
            Some(ClickHandler::RevealUnscanned) => {
                self.set_attribute(ATTR_SAFE, "true");
                self.set_title(UNSCANNED_REVEALED_TITLE);
                self.remove_style("cursor");
                ClickOutcome::Revealed
            }
        }
    }
}

fn dimension_pair(
    attributes: &BTreeMap<String, String>,
    width_key: &str,
    height_key: &str,
) -> Option<(u32, u32)> {
    let width = attributes.get(width_key).and_then(|v| parse_px(v))?;
    let height = attributes.get(height_key).and_then(|v| parse_px(v))?;
    Some((width, height))
}

/// `"120"`, `"120px"` or `"120.5px"` → 120.
fn parse_px(value: &str) -> Option<u32> {
    let number = value.trim().trim_end_matches("px").trim();
    number
        .parse::<u32>()
        .ok()
        .or_else(|| number.parse::<f64>().ok().filter(|n| *n >= 0.0).map(|n| n as u32))
}

fn parse_inline_style(style: &str) -> BTreeMap<String, StyleValue> {
    style
        .split(';')
        .filter_map(|declaration| {
            let (property, value) = declaration.split_once(':')?;
            let property = property.trim().to_ascii_lowercase();
            let value = value.trim();
            if property.is_empty() || value.is_empty() {
                return None;
            }
            let (value, important) = match value.strip_suffix("!important") {
                Some(rest) => (rest.trim(), true),
                None => (value, false),
            };
            Some((
                property,
                StyleValue {
                    value: value.to_string(),
                    important,
                },
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(attributes: &[(&str, &str)], load: LoadState) -> ImageElement {
        let attributes = attributes
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ImageElement::new(1, attributes, None, None, load)
    }

    #[test]
    fn test_inline_style_is_parsed() {
        let img = image(
            &[("style", "filter: blur(15px) !important; width: 80px")],
            LoadState::Loaded,
        );
        assert_eq!(img.style("filter").as_deref(), Some("blur(15px)"));
        assert!(img.style_is_important("filter"));
        assert_eq!(img.style("width").as_deref(), Some("80px"));
        assert!(!img.style_is_important("width"));
    }

    #[test]
    fn test_natural_size_prefers_reported_size() {
        let img = image(
            &[
                ("width", "300"),
                ("height", "200"),
                ("data-natural-width", "40"),
                ("data-natural-height", "40"),
            ],
            LoadState::Loaded,
        );
        assert_eq!(img.natural_size(), Some((40, 40)));

        let img = image(&[("width", "64px"), ("height", "64")], LoadState::Loaded);
        assert_eq!(img.natural_size(), Some((64, 64)));

        let img = image(&[("width", "auto")], LoadState::Loaded);
        assert_eq!(img.natural_size(), None);
    }

    #[test]
    fn test_blocked_click_fires_once() {
        let img = image(&[("src", "https://a/b.jpg")], LoadState::Loaded);
        img.set_style("filter", "blur(20px)");
        img.set_click_handler(ClickHandler::RevealBlocked);

        let asked = std::cell::Cell::new(0);
        let prompt = |message: &str| {
            assert_eq!(message, REVEAL_PROMPT);
            asked.set(asked.get() + 1);
            true
        };
        assert_eq!(img.click(&prompt), ClickOutcome::Revealed);
        assert_eq!(img.style("filter").as_deref(), Some("none"));
        assert_eq!(img.state(), ImageState::Revealed);

        img.set_style("filter", "blur(20px)");
        assert_eq!(img.click(&prompt), ClickOutcome::Ignored);
        assert_eq!(img.style("filter").as_deref(), Some("blur(20px)"));
        assert_eq!(asked.get(), 1);
    }

    #[test]
    fn test_declined_click_spends_handler() {
        let img = image(&[], LoadState::Loaded);
        img.set_click_handler(ClickHandler::RevealBlocked);
        assert_eq!(img.click(&|_: &str| false), ClickOutcome::Declined);
        assert_eq!(img.click_handler(), None);
        assert_eq!(img.click(&|_: &str| true), ClickOutcome::Ignored);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_loaded_times_out() {
        let img = image(&[], LoadState::Loading);
        let state = img.wait_loaded(Duration::from_secs(5)).await;
        assert_eq!(state, LoadState::Loading);
        assert!(!img.is_complete());
    }

    #[tokio::test]
    async fn test_wait_loaded_sees_completion() {
        let img = std::sync::Arc::new(image(&[], LoadState::Loading));
        let loader = std::sync::Arc::clone(&img);
        tokio::spawn(async move { loader.finish_loading(Some((120, 90))) });
        let state = img.wait_loaded(Duration::from_secs(5)).await;
        assert_eq!(state, LoadState::Loaded);
        assert!(img.is_complete());
        assert_eq!(img.natural_size(), Some((120, 90)));
    }
}
