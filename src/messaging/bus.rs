//! Per-context message bus.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use tokio::task::JoinHandle;

use super::types::{MessageKind, RuntimeMessage, RuntimeResponse};
use crate::error_handling::MessagingError;

/// The physical channel a bus sends through.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Delivers `message` to the other contexts and resolves with the first
    /// response, if any.
    async fn send(&self, message: RuntimeMessage)
        -> Result<Option<RuntimeResponse>, MessagingError>;

    /// Whether the transport is still connected to a living runtime.
    fn is_attached(&self) -> bool;
}

type Handler = Arc<dyn Fn(RuntimeMessage) -> BoxFuture<'static, Option<RuntimeResponse>> + Send + Sync>;

/// Typed request/response channel of one execution context.
///
/// A bus owns a single physical listener and routes inbound messages to the
/// logical handlers registered for their `type` tag.
pub struct MessageBus {
    name: String,
    transport: RwLock<Option<Arc<dyn Transport>>>,
    listeners: Mutex<HashMap<MessageKind, Vec<(u64, Handler)>>>,
    next_listener_id: AtomicU64,
}

impl fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBus")
            .field("name", &self.name)
            .field("context_valid", &self.is_context_valid())
            .finish()
    }
}

impl MessageBus {
    /// Creates a bus with no transport attached.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            transport: RwLock::new(None),
            listeners: Mutex::new(HashMap::new()),
            next_listener_id: AtomicU64::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_transport(&self, transport: Arc<dyn Transport>) {
        if let Ok(mut slot) = self.transport.write() {
            *slot = Some(transport);
        }
    }

    fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.transport.read().ok().and_then(|slot| slot.clone())
    }

    /// Sends `message` to the other contexts.
    ///
    /// Resolves `Ok(None)` when no transport is attached or nobody answered.
    ///
    /// # Errors
    ///
    /// [`MessagingError::ContextInvalidated`] when the runtime behind the
    /// transport went away.
    pub async fn send(
        &self,
        message: RuntimeMessage,
    ) -> Result<Option<RuntimeResponse>, MessagingError> {
        match self.transport() {
            Some(transport) => transport.send(message).await,
            None => {
                log::debug!(
                    "[{}] No transport, dropping {} message",
                    self.name,
                    message.kind().as_ref()
                );
                Ok(None)
            }
        }
    }

    /// Sends without waiting for the outcome. Failures are only logged.
    pub fn notify(self: &Arc<Self>, message: RuntimeMessage) -> JoinHandle<()> {
        let bus = Arc::clone(self);
        tokio::spawn(async move {
            let kind = message.kind();
            if let Err(e) = bus.send(message).await {
                log::warn!("[{}] Failed to send {}: {}", bus.name, kind.as_ref(), e);
            }
        })
    }

    /// Whether the transport is attached to a living runtime.
    pub fn is_context_valid(&self) -> bool {
        self.transport().is_some_and(|t| t.is_attached())
    }

    /// Registers `handler` for messages of `kind`.
    ///
    /// The handler stays registered until the returned [`Subscription`] is
    /// unsubscribed or dropped.
    pub fn add_listener<F, Fut>(self: &Arc<Self>, kind: MessageKind, handler: F) -> Subscription
    where
        F: Fn(RuntimeMessage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<RuntimeResponse>> + Send + 'static,
    {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        let handler: Handler = Arc::new(move |message| handler(message).boxed());
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.entry(kind).or_default().push((id, handler));
        }
        Subscription {
            bus: Arc::downgrade(self),
            kind,
            id,
        }
    }

    fn remove_listener(&self, kind: MessageKind, id: u64) {
        if let Ok(mut listeners) = self.listeners.lock() {
            if let Some(handlers) = listeners.get_mut(&kind) {
                handlers.retain(|(listener_id, _)| *listener_id != id);
            }
        }
    }

    pub fn listener_count(&self, kind: MessageKind) -> usize {
        self.listeners
            .lock()
            .map(|listeners| listeners.get(&kind).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    /// Routes an inbound message to its handlers.
    ///
    /// Every handler runs; the first response wins. A message nobody listens
    /// for resolves `None`.
    pub async fn dispatch(&self, message: RuntimeMessage) -> Option<RuntimeResponse> {
        let kind = message.kind();
        let handlers: Vec<Handler> = match self.listeners.lock() {
            Ok(listeners) => listeners
                .get(&kind)
                .map(|handlers| handlers.iter().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default(),
            Err(_) => Vec::new(),
        };

        if handlers.is_empty() {
            log::debug!("[{}] Unhandled runtime message {}", self.name, kind.as_ref());
            return None;
        }

        let mut response = None;
        for handler in handlers {
            let reply = handler(message.clone()).await;
            if response.is_none() {
                response = reply;
            }
        }
        response
    }

    /// Routes a raw JSON message. Unknown or malformed messages are logged
    /// and ignored.
    pub async fn dispatch_raw(&self, raw: Value) -> Option<RuntimeResponse> {
        match serde_json::from_value::<RuntimeMessage>(raw.clone()) {
            Ok(message) => self.dispatch(message).await,
            Err(e) => {
                let tag = raw.get("type").and_then(Value::as_str).unwrap_or("<missing>");
                log::debug!("[{}] Ignoring message of type {}: {}", self.name, tag, e);
                None
            }
        }
    }
}

/// Handle of a registered listener.
#[must_use = "dropping a Subscription removes the listener"]
pub struct Subscription {
    bus: Weak<MessageBus>,
    kind: MessageKind,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.remove_listener(self.kind, self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .finish()
    }
}
