// Shared test helpers: a scripted detector, signed-in storage and connected contexts.
//
// This module provides common utilities used across multiple test files to reduce duplication.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::time::Instant;

use media_guard::detection::{
    Action, DetectionRequest, DetectionResult, Detector, MediaKind, PredictionDetail,
};
use media_guard::messaging::{ExtensionRuntime, MessageBus};
use media_guard::storage::{keys, MemoryStorage, Storage, StorageArea};
use media_guard::Thresholds;

/// What the fake detector answers for a URL.
#[derive(Debug, Clone, Copy)]
#[allow(dead_code)] // Not every test file uses every reply
pub enum Reply {
    Verdict(Action),
    Fail,
}

/// Detector that answers from a script and records every call.
#[derive(Default)]
pub struct FakeDetector {
    replies: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<(String, Instant)>>,
}

#[allow(dead_code)] // Used by other test files
impl FakeDetector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Scripts the reply for URLs ending with `suffix`; anything else is allowed.
    pub fn reply(&self, suffix: &str, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .insert(suffix.to_string(), reply);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }
}

#[async_trait]
impl Detector for FakeDetector {
    async fn analyze(&self, request: &DetectionRequest, _thresholds: Thresholds) -> DetectionResult {
        self.calls
            .lock()
            .unwrap()
            .push((request.url.clone(), Instant::now()));
        let reply = self
            .replies
            .lock()
            .unwrap()
            .iter()
            .find(|(suffix, _)| request.url.ends_with(suffix.as_str()))
            .map(|(_, reply)| *reply)
            .unwrap_or(Reply::Verdict(Action::Allow));
        match reply {
            Reply::Verdict(action) => DetectionResult::completed(
                request.url.clone(),
                MediaKind::Image,
                vec![PredictionDetail {
                    label: "3".to_string(),
                    score: match action {
                        Action::Block => 0.95,
                        Action::Warn => 0.6,
                        Action::Allow => 0.1,
                    },
                    active: action != Action::Allow,
                }],
                action,
                None,
            ),
            Reply::Fail => DetectionResult::failed(
                request.url.clone(),
                MediaKind::Image,
                "API error: 500",
            ),
        }
    }
}

/// In-memory storage with an auth token.
#[allow(dead_code)]
pub async fn signed_in_storage() -> Storage {
    let storage = Storage::new(Arc::new(MemoryStorage::new()));
    storage
        .write(keys::AUTH_TOKEN, "test-token", StorageArea::Local)
        .await
        .expect("Failed to store token");
    storage
}

/// A content bus and a background bus connected through one runtime.
#[allow(dead_code)]
pub fn connected_buses() -> (ExtensionRuntime, Arc<MessageBus>, Arc<MessageBus>) {
    let runtime = ExtensionRuntime::new();
    let background = MessageBus::new("background");
    let content = MessageBus::new("content");
    runtime.connect(&background);
    runtime.connect(&content);
    (runtime, content, background)
}

/// `<img>` markup with a known intrinsic size.
#[allow(dead_code)]
pub fn img(src: &str, size: u32) -> String {
    format!(r#"<img src="{src}" width="{size}" height="{size}">"#)
}

/// Wraps `body` into a complete document.
#[allow(dead_code)]
pub fn document(body: &str) -> String {
    format!("<html><head><title>t</title></head><body>{body}</body></html>")
}
