//! In-process extension runtime.
//!
//! Connects the buses of several execution contexts (background, content
//! scripts, UI pages). A message sent from one context is delivered to every
//! other connected context and resolves with the first response.
//!
//! [`ExtensionRuntime::reload`] models an extension reload: every existing
//! connection is severed, so a content script that outlives it sees
//! [`MessagingError::ContextInvalidated`] on its next send.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;

use super::bus::{MessageBus, Transport};
use super::types::{RuntimeMessage, RuntimeResponse};
use crate::error_handling::MessagingError;

struct Connection {
    id: u64,
    generation: u64,
    bus: Weak<MessageBus>,
}

#[derive(Default)]
struct RuntimeInner {
    generation: AtomicU64,
    next_id: AtomicU64,
    connections: Mutex<Vec<Connection>>,
}

/// Handle of the in-process runtime. Cheap to clone.
#[derive(Clone, Default)]
pub struct ExtensionRuntime {
    inner: Arc<RuntimeInner>,
}

impl ExtensionRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches `bus` to the runtime.
    pub fn connect(&self, bus: &Arc<MessageBus>) {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let generation = self.inner.generation.load(Ordering::SeqCst);
        if let Ok(mut connections) = self.inner.connections.lock() {
            connections.push(Connection {
                id,
                generation,
                bus: Arc::downgrade(bus),
            });
        }
        bus.set_transport(Arc::new(RuntimeTransport {
            runtime: Arc::clone(&self.inner),
            id,
            generation,
        }));
        log::debug!("Connected context '{}' to runtime", bus.name());
    }

    /// Severs every existing connection.
    pub fn reload(&self) {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut connections) = self.inner.connections.lock() {
            connections.clear();
        }
        log::info!("Extension runtime reloaded (generation {})", generation);
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.inner
            .connections
            .lock()
            .map(|connections| {
                connections
                    .iter()
                    .filter(|c| c.bus.strong_count() > 0)
                    .count()
            })
            .unwrap_or(0)
    }
}

struct RuntimeTransport {
    runtime: Arc<RuntimeInner>,
    id: u64,
    generation: u64,
}

impl RuntimeTransport {
    fn peers(&self) -> Vec<Arc<MessageBus>> {
        let Ok(mut connections) = self.runtime.connections.lock() else {
            return Vec::new();
        };
        connections.retain(|c| c.bus.strong_count() > 0);
        connections
            .iter()
            .filter(|c| c.id != self.id && c.generation == self.generation)
            .filter_map(|c| c.bus.upgrade())
            .collect()
    }
}

#[async_trait]
impl Transport for RuntimeTransport {
    async fn send(
        &self,
        message: RuntimeMessage,
    ) -> Result<Option<RuntimeResponse>, MessagingError> {
        if !self.is_attached() {
            return Err(MessagingError::ContextInvalidated);
        }
        let mut response = None;
        for peer in self.peers() {
            let reply = peer.dispatch(message.clone()).await;
            if response.is_none() {
                response = reply;
            }
        }
        Ok(response)
    }

    fn is_attached(&self) -> bool {
        self.runtime.generation.load(Ordering::SeqCst) == self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::MessageKind;

    #[tokio::test]
    async fn test_message_reaches_other_context() {
        let runtime = ExtensionRuntime::new();
        let background = MessageBus::new("background");
        let content = MessageBus::new("content");
        runtime.connect(&background);
        runtime.connect(&content);

        let _sub = background.add_listener(MessageKind::ScanPage, |_| async {
            Some(RuntimeResponse::ok())
        });
        // The sender's own listeners are not invoked
        let _own = content.add_listener(MessageKind::ScanPage, |_| async {
            Some(RuntimeResponse::error("self"))
        });

        let reply = content.send(RuntimeMessage::ScanPage).await;
        assert_eq!(reply, Ok(Some(RuntimeResponse::ok())));
        assert!(content.is_context_valid());
    }

    #[tokio::test]
    async fn test_reload_invalidates_existing_contexts() {
        let runtime = ExtensionRuntime::new();
        let background = MessageBus::new("background");
        let content = MessageBus::new("content");
        runtime.connect(&background);
        runtime.connect(&content);

        runtime.reload();
        assert!(!content.is_context_valid());
        assert_eq!(
            content.send(RuntimeMessage::ScanPage).await,
            Err(MessagingError::ContextInvalidated)
        );

        // A context connected after the reload works again
        let fresh = MessageBus::new("content-2");
        runtime.connect(&fresh);
        assert!(fresh.is_context_valid());
        assert_eq!(fresh.send(RuntimeMessage::ScanPage).await, Ok(None));
    }

    #[tokio::test]
    async fn test_dropped_bus_is_forgotten() {
        let runtime = ExtensionRuntime::new();
        let a = MessageBus::new("a");
        let b = MessageBus::new("b");
        runtime.connect(&a);
        runtime.connect(&b);
        assert_eq!(runtime.connection_count(), 2);
        drop(b);
        assert_eq!(runtime.connection_count(), 1);
    }
}
