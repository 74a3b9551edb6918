//! Runtime messaging between execution contexts.
//!
//! This module provides:
//! - The closed, tagged message schema ([`RuntimeMessage`], [`RuntimeResponse`])
//! - A per-context [`MessageBus`] with tag-based listener routing
//! - The in-process [`ExtensionRuntime`] that connects buses
//!
//! Sending without a transport is not an error: it resolves to no response.
//! Only a severed runtime ([`crate::MessagingError::ContextInvalidated`]) is.

mod bus;
mod runtime;
mod types;

pub use bus::{MessageBus, Subscription, Transport};
pub use runtime::ExtensionRuntime;
pub use types::{ExtensionState, MessageKind, RuntimeMessage, RuntimeResponse, StatsSnapshot};
