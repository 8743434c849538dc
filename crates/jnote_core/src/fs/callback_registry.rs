//! Callback registry for vault event subscriptions.
//!
//! This module provides a thread-safe registry for managing event callbacks.
//! Subscribers receive [`VaultEvent`](super::VaultEvent) notifications emitted
//! by the state layer. Events are emitted from watcher, timer and reload
//! threads, so callbacks must be cheap and must not block.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use super::events::VaultEvent;

/// A unique identifier for a subscription.
pub type SubscriptionId = u64;

/// Callback function type for vault events.
pub type EventCallback = Arc<dyn Fn(&VaultEvent) + Send + Sync>;

/// Thread-safe registry for managing event subscriptions.
///
/// # Example
///
/// ```ignore
/// use jnote_core::fs::{CallbackRegistry, VaultEvent};
/// use std::sync::Arc;
///
/// let registry = CallbackRegistry::new();
///
/// let id = registry.subscribe(Arc::new(|event| {
///     println!("Event: {:?}", event);
/// }));
///
/// registry.emit(&VaultEvent::tree_changed("/vault".into()));
///
/// registry.unsubscribe(id);
/// ```
pub struct CallbackRegistry {
    callbacks: RwLock<HashMap<SubscriptionId, EventCallback>>,
    next_id: AtomicU64,
}

impl CallbackRegistry {
    /// Create a new empty callback registry.
    pub fn new() -> Self {
        Self {
            callbacks: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Subscribe to vault events.
    ///
    /// Returns a subscription ID that can be used to unsubscribe later.
    pub fn subscribe(&self, callback: EventCallback) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut callbacks = self.callbacks.write().unwrap();
        callbacks.insert(id, callback);
        id
    }

    /// Unsubscribe from vault events.
    ///
    /// Returns `true` if the subscription was found and removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut callbacks = self.callbacks.write().unwrap();
        callbacks.remove(&id).is_some()
    }

    /// Emit an event to all registered callbacks.
    ///
    /// Callbacks are invoked synchronously in an undefined order.
    /// If a callback panics, it does not affect other callbacks.
    pub fn emit(&self, event: &VaultEvent) {
        // Clone the handles so a callback may subscribe/unsubscribe without deadlocking.
        let callbacks: Vec<EventCallback> = {
            let callbacks = self.callbacks.read().unwrap();
            callbacks.values().cloned().collect()
        };
        for callback in callbacks {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                callback(event);
            }));
            if result.is_err() {
                log::warn!("Event subscriber panicked on {}", event.event_type());
            }
        }
    }

    /// Get the number of active subscriptions.
    pub fn subscriber_count(&self) -> usize {
        let callbacks = self.callbacks.read().unwrap();
        callbacks.len()
    }

    /// Check if there are any active subscriptions.
    pub fn has_subscribers(&self) -> bool {
        let callbacks = self.callbacks.read().unwrap();
        !callbacks.is_empty()
    }

    /// Clear all subscriptions.
    pub fn clear(&self) {
        let mut callbacks = self.callbacks.write().unwrap();
        callbacks.clear();
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let callbacks = self.callbacks.read().unwrap();
        f.debug_struct("CallbackRegistry")
            .field("subscriber_count", &callbacks.len())
            .field("next_id", &self.next_id.load(Ordering::SeqCst))
            .finish()
    }
}
