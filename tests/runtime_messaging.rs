//! Runtime messaging between contexts, the background router and the
//! aggregate counters.

mod helpers;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use helpers::{connected_buses, signed_in_storage};
use media_guard::detection::{Action, DetectionResult, MediaKind};
use media_guard::messaging::{
    ExtensionState, MessageBus, MessageKind, RuntimeMessage, RuntimeResponse, StatsSnapshot,
};
use media_guard::storage::{keys, StorageArea};
use media_guard::{
    BackgroundRouter, BlockCounters, DetectionClient, MessagingError, StatsService,
};

#[tokio::test]
async fn test_message_reaches_other_context_only() {
    let (_runtime, content, background) = connected_buses();
    let seen_by_content = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen_by_content);
    let _own = content.add_listener(MessageKind::ScanPage, move |_| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            None
        }
    });
    let _peer = background.add_listener(MessageKind::ScanPage, |_| async {
        Some(RuntimeResponse::ok())
    });

    let reply = content.send(RuntimeMessage::ScanPage).await;
    assert_eq!(reply, Ok(Some(RuntimeResponse::ok())));
    assert_eq!(seen_by_content.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_reload_invalidates_existing_contexts() {
    let (runtime, content, _background) = connected_buses();
    assert!(content.is_context_valid());

    runtime.reload();

    assert!(!content.is_context_valid());
    assert_eq!(
        content.send(RuntimeMessage::ScanPage).await,
        Err(MessagingError::ContextInvalidated)
    );

    // A context connected after the reload works again
    let fresh = MessageBus::new("content");
    runtime.connect(&fresh);
    assert!(fresh.is_context_valid());
    assert_eq!(fresh.send(RuntimeMessage::ScanPage).await, Ok(None));
}

#[tokio::test]
async fn test_unknown_messages_are_ignored_not_fatal() {
    let (_runtime, _content, background) = connected_buses();
    let _sub = background.add_listener(MessageKind::ScanPage, |_| async {
        Some(RuntimeResponse::ok())
    });
    assert_eq!(
        background
            .dispatch_raw(json!({"type": "OPEN_DASHBOARD", "tab": 2}))
            .await,
        None
    );
    assert_eq!(
        background.dispatch_raw(json!({"type": "SCAN_PAGE"})).await,
        Some(RuntimeResponse::ok())
    );
}

fn background_router(
    server_uri: &str,
    storage: media_guard::storage::Storage,
    background: &Arc<MessageBus>,
) -> (BackgroundRouter, Arc<StatsService>) {
    let http = reqwest::Client::new();
    let client = Arc::new(DetectionClient::new(http.clone(), server_uri, storage.clone()));
    let counters = Arc::new(StatsService::new(
        http,
        server_uri,
        storage.clone(),
        Arc::clone(background),
    ));
    let router = BackgroundRouter::install(background, client, Arc::clone(&counters), storage);
    (router, counters)
}

#[tokio::test]
async fn test_detection_results_update_counters_and_broadcast() {
    let storage = signed_in_storage().await;
    let (_runtime, content, background) = connected_buses();
    let (_router, counters) = background_router("http://127.0.0.1:9", storage.clone(), &background);

    let snapshots = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&snapshots);
    let _sub = content.add_listener(MessageKind::StatsUpdated, move |message| {
        let sink = Arc::clone(&sink);
        async move {
            if let RuntimeMessage::StatsUpdated { data } = message {
                sink.lock().unwrap().push(data);
            }
            None
        }
    });

    let blocked = DetectionResult::completed(
        "https://example.com/a.jpg",
        MediaKind::Image,
        Vec::new(),
        Action::Block,
        None,
    );
    let reply = content
        .send(RuntimeMessage::DetectionResult { data: blocked })
        .await;
    assert_eq!(reply, Ok(Some(RuntimeResponse::ok())));

    assert_eq!(
        counters.load().await.unwrap(),
        BlockCounters {
            total: 1,
            today: 1,
            weekly: 1
        }
    );
    tokio::task::yield_now().await;
    for _ in 0..10 {
        if !snapshots.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(
        snapshots.lock().unwrap().as_slice(),
        &[StatsSnapshot {
            total: 1,
            today: 1,
            weekly: 1
        }]
    );
    assert_eq!(
        storage
            .read::<u64>(keys::WEEKLY_BLOCKED, StorageArea::Sync)
            .await
            .unwrap(),
        Some(1)
    );
}

#[tokio::test]
async fn test_update_state_is_rebroadcast() {
    let storage = signed_in_storage().await;
    let (_runtime, content, background) = connected_buses();
    let (_router, _counters) = background_router("http://127.0.0.1:9", storage, &background);

    let received = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&received);
    let _sub = content.add_listener(MessageKind::StateUpdated, move |message| {
        let counter = Arc::clone(&counter);
        async move {
            if let RuntimeMessage::StateUpdated { payload } = message {
                assert!(!payload.is_enabled);
                counter.fetch_add(1, Ordering::SeqCst);
            }
            None
        }
    });

    let state = ExtensionState {
        is_enabled: false,
        ..Default::default()
    };
    let reply = content
        .send(RuntimeMessage::UpdateState { payload: state })
        .await;
    assert_eq!(reply, Ok(Some(RuntimeResponse::ok())));

    for _ in 0..10 {
        if received.load(Ordering::SeqCst) > 0 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(received.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_refresh_overwrites_counters_from_server() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/users/statistics"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {"totalBlocked": 120, "todayBlocked": 3, "weeklyBlocked": 17}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let storage = signed_in_storage().await;
    storage
        .write(keys::TOTAL_BLOCKED, &5u64, StorageArea::Sync)
        .await
        .unwrap();
    let bus = MessageBus::new("background");
    let counters = StatsService::new(reqwest::Client::new(), server.uri(), storage, bus);

    let refreshed = counters.refresh().await.unwrap();
    let expected = BlockCounters {
        total: 120,
        today: 3,
        weekly: 17,
    };
    assert_eq!(refreshed, Some(expected));
    assert_eq!(counters.load().await.unwrap(), expected);
}

#[tokio::test]
async fn test_refresh_error_keeps_local_counters() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/users/statistics"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let storage = signed_in_storage().await;
    storage
        .write(keys::TOTAL_BLOCKED, &5u64, StorageArea::Sync)
        .await
        .unwrap();
    let counters = StatsService::new(
        reqwest::Client::new(),
        server.uri(),
        storage,
        MessageBus::new("background"),
    );

    assert!(counters.refresh().await.is_err());
    assert_eq!(counters.load().await.unwrap().total, 5);
}
