//! Headless page model.
//!
//! The document the scanner and the early-blur guard act on: image elements
//! in document order, `<head>`/`<body>` presence, stylesheets, overlay
//! elements, document attributes, the ready state, and a mutation feed that
//! observers subscribe to. Pages and inserted fragments are parsed from HTML.

mod element;
mod observer;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use scraper::{ElementRef, Html, Selector};
use tokio::sync::{mpsc, watch};
use url::Url;

pub use element::{
    ClickHandler, ClickOutcome, ConfirmPrompt, ImageElement, ImageState, LoadState,
};
pub use observer::MutationObserver;

/// `document.readyState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    Loading,
    /// `DOMContentLoaded` has fired.
    Interactive,
    /// `load` has fired.
    Complete,
}

/// One change to the document.
#[derive(Debug, Clone)]
pub enum MutationRecord {
    /// Images inserted directly or inside an inserted subtree.
    ImagesAdded(Vec<Arc<ImageElement>>),
    HeadAttached,
    BodyAttached,
    /// A source attribute of an image changed.
    SourceChanged(Arc<ImageElement>),
}

#[derive(Debug, Default)]
struct Document {
    has_head: bool,
    has_body: bool,
    images: Vec<Arc<ImageElement>>,
    /// Head stylesheets in document order: `(id, css)`.
    stylesheets: Vec<(String, String)>,
    /// Body-level overlay elements: `(id, html)`.
    overlays: Vec<(String, String)>,
    attributes: BTreeMap<String, String>,
    styles: HashMap<String, String>,
}

/// A loaded web page.
pub struct Page {
    url: Url,
    document: RwLock<Document>,
    next_node_id: AtomicU64,
    /// One unbounded feed per observer, so a slow observer never loses records.
    observers: Mutex<Vec<mpsc::UnboundedSender<MutationRecord>>>,
    ready: watch::Sender<ReadyState>,
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("url", &self.url.as_str())
            .field("ready_state", &self.ready_state())
            .field("images", &self.images().len())
            .finish()
    }
}

impl Page {
    fn with_state(url: Url, ready_state: ReadyState) -> Self {
        let (ready, _) = watch::channel(ready_state);
        Self {
            url,
            document: RwLock::new(Document::default()),
            next_node_id: AtomicU64::new(0),
            observers: Mutex::new(Vec::new()),
            ready,
        }
    }

    /// A fully loaded page parsed from `html`.
    ///
    /// # Errors
    ///
    /// Returns an error if `url` is not an absolute URL.
    pub fn from_html(url: &str, html: &str) -> Result<Arc<Self>, url::ParseError> {
        let page = Self::with_state(Url::parse(url)?, ReadyState::Complete);
        let document = Html::parse_document(html);
        let images = page.extract_images(&document, LoadState::Loaded);
        {
            let mut doc = page.write();
            doc.has_head = true;
            doc.has_body = true;
            doc.images = images;
        }
        Ok(Arc::new(page))
    }

    /// A page that has just started loading: no head, no body, no images.
    pub fn loading(url: &str) -> Result<Arc<Self>, url::ParseError> {
        Ok(Arc::new(Self::with_state(
            Url::parse(url)?,
            ReadyState::Loading,
        )))
    }

    fn read(&self) -> RwLockReadGuard<'_, Document> {
        self.document.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Document> {
        self.document.write().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, record: MutationRecord) {
        let mut observers = self.observers.lock().unwrap_or_else(|e| e.into_inner());
        // Feeds whose observer stopped are closed
        observers.retain(|feed| feed.send(record.clone()).is_ok());
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn hostname(&self) -> &str {
        self.url.host_str().unwrap_or("")
    }

    /// Subscribes to the mutation feed.
    pub fn observe(&self) -> mpsc::UnboundedReceiver<MutationRecord> {
        let (feed, records) = mpsc::unbounded_channel();
        self.observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(feed);
        records
    }

    pub fn ready_state(&self) -> ReadyState {
        *self.ready.borrow()
    }

    pub fn set_ready_state(&self, state: ReadyState) {
        self.ready.send_replace(state);
    }

    /// Resolves once `DOMContentLoaded` has fired.
    pub async fn wait_for_dom_content_loaded(&self) {
        self.wait_for_ready_state(ReadyState::Interactive).await;
    }

    /// Resolves once the `load` event has fired.
    pub async fn wait_for_load(&self) {
        self.wait_for_ready_state(ReadyState::Complete).await;
    }

    async fn wait_for_ready_state(&self, target: ReadyState) {
        let mut rx = self.ready.subscribe();
        // The sender lives as long as the page, so this only ends on success
        let _ = rx.wait_for(|state| *state >= target).await;
    }

    pub fn has_head(&self) -> bool {
        self.read().has_head
    }

    pub fn has_body(&self) -> bool {
        self.read().has_body
    }

    pub fn attach_head(&self) {
        let attached = {
            let mut doc = self.write();
            !std::mem::replace(&mut doc.has_head, true)
        };
        if attached {
            self.emit(MutationRecord::HeadAttached);
        }
    }

    pub fn attach_body(&self) {
        let attached = {
            let mut doc = self.write();
            !std::mem::replace(&mut doc.has_body, true)
        };
        if attached {
            self.emit(MutationRecord::BodyAttached);
        }
    }

    /// All images in document order.
    pub fn images(&self) -> Vec<Arc<ImageElement>> {
        self.read().images.clone()
    }

    /// Appends an HTML fragment; its images are already loaded.
    pub fn insert_html(&self, fragment: &str) -> Vec<Arc<ImageElement>> {
        self.insert_fragment(fragment, LoadState::Loaded)
    }

    /// Appends an HTML fragment whose images are still loading.
    pub fn insert_pending_html(&self, fragment: &str) -> Vec<Arc<ImageElement>> {
        self.insert_fragment(fragment, LoadState::Loading)
    }

    fn insert_fragment(&self, fragment: &str, load_state: LoadState) -> Vec<Arc<ImageElement>> {
        let parsed = Html::parse_fragment(fragment);
        let images = self.extract_images(&parsed, load_state);
        if images.is_empty() {
            return images;
        }
        self.write().images.extend(images.iter().cloned());
        self.emit(MutationRecord::ImagesAdded(images.clone()));
        images
    }

    /// Changes the `src` of `image`, as lazy loaders do.
    pub fn set_image_source(&self, image: &Arc<ImageElement>, src: &str) {
        image.set_attribute("src", src);
        self.emit(MutationRecord::SourceChanged(Arc::clone(image)));
    }

    /// Inserts a stylesheet at the very start of `<head>`.
    ///
    /// Returns `false` when there is no head yet or a stylesheet with the
    /// same id exists.
    pub fn insert_stylesheet_first(&self, id: &str, css: &str) -> bool {
        let mut doc = self.write();
        if !doc.has_head || doc.stylesheets.iter().any(|(existing, _)| existing == id) {
            return false;
        }
        doc.stylesheets.insert(0, (id.to_string(), css.to_string()));
        true
    }

    /// Stylesheet ids in head order.
    pub fn stylesheet_ids(&self) -> Vec<String> {
        self.read()
            .stylesheets
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn stylesheet(&self, id: &str) -> Option<String> {
        self.read()
            .stylesheets
            .iter()
            .find(|(existing, _)| existing == id)
            .map(|(_, css)| css.clone())
    }

    /// Appends an element with `id` to `<body>`.
    ///
    /// Returns `false` when there is no body yet or the id is taken.
    pub fn append_overlay(&self, id: &str, html: &str) -> bool {
        let mut doc = self.write();
        if !doc.has_body || doc.overlays.iter().any(|(existing, _)| existing == id) {
            return false;
        }
        doc.overlays.push((id.to_string(), html.to_string()));
        true
    }

    pub fn overlay(&self, id: &str) -> Option<String> {
        self.read()
            .overlays
            .iter()
            .find(|(existing, _)| existing == id)
            .map(|(_, html)| html.clone())
    }

    /// Number of elements carrying `id`.
    pub fn count_elements(&self, id: &str) -> usize {
        let doc = self.read();
        doc.stylesheets.iter().filter(|(e, _)| e == id).count()
            + doc.overlays.iter().filter(|(e, _)| e == id).count()
    }

    pub fn has_element(&self, id: &str) -> bool {
        self.count_elements(id) > 0
    }

    pub fn set_document_attribute(&self, name: &str, value: &str) {
        self.write()
            .attributes
            .insert(name.to_string(), value.to_string());
    }

    pub fn document_attribute(&self, name: &str) -> Option<String> {
        self.read().attributes.get(name).cloned()
    }

    pub fn set_document_style(&self, property: &str, value: &str) {
        self.write()
            .styles
            .insert(property.to_string(), value.to_string());
    }

    pub fn document_style(&self, property: &str) -> Option<String> {
        self.read().styles.get(property).cloned()
    }

    fn extract_images(&self, html: &Html, load_state: LoadState) -> Vec<Arc<ImageElement>> {
        let Ok(selector) = Selector::parse("img") else {
            return Vec::new();
        };
        html.select(&selector)
            .map(|img| {
                let attributes = img
                    .value()
                    .attrs()
                    .map(|(name, value)| (name.to_string(), value.to_string()))
                    .collect();
                let node_id = self.next_node_id.fetch_add(1, Ordering::Relaxed);
                Arc::new(ImageElement::new(
                    node_id,
                    attributes,
                    closest_attribute(&img, "a", "href"),
                    closest_attribute(&img, "", "data-id"),
                    load_state,
                ))
            })
            .collect()
    }
}

/// Value of `attribute` on the closest ancestor (named `tag`, or any element
/// when `tag` is empty) that carries it.
fn closest_attribute(element: &ElementRef<'_>, tag: &str, attribute: &str) -> Option<String> {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .filter(|ancestor| tag.is_empty() || ancestor.value().name() == tag)
        .find_map(|ancestor| ancestor.value().attr(attribute).map(str::to_string))
}
