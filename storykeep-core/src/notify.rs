//! Per-key publish/subscribe used to signal node changes to views.
//!
//! Dispatch is synchronous and single-threaded. There is no bubbling: a
//! notify for a node reaches only that node's subscribers.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::node::NodeId;

type Callback<P> = Rc<dyn Fn(&NodeId, Option<&P>)>;

struct Registry<P> {
    next_token: u64,
    listeners: HashMap<NodeId, Vec<(u64, Callback<P>)>>,
}

impl<P> Default for Registry<P> {
    fn default() -> Self {
        Self {
            next_token: 0,
            listeners: HashMap::new(),
        }
    }
}

/// Observer registry keyed by node id.
///
/// Cloning yields another handle to the same registry.
pub struct NotificationBus<P> {
    registry: Rc<RefCell<Registry<P>>>,
}

impl<P> Clone for NotificationBus<P> {
    fn clone(&self) -> Self {
        Self {
            registry: Rc::clone(&self.registry),
        }
    }
}

impl<P> Default for NotificationBus<P> {
    fn default() -> Self {
        Self {
            registry: Rc::new(RefCell::new(Registry::default())),
        }
    }
}

impl<P> fmt::Debug for NotificationBus<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.borrow();
        f.debug_struct("NotificationBus")
            .field("keys", &registry.listeners.len())
            .finish()
    }
}

impl<P: 'static> NotificationBus<P> {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for `key`.
    ///
    /// Callbacks for one key run in registration order. The returned handle
    /// removes exactly this registration.
    pub fn subscribe(
        &self,
        key: NodeId,
        callback: impl Fn(&NodeId, Option<&P>) + 'static,
    ) -> Subscription<P> {
        let mut registry = self.registry.borrow_mut();
        let token = registry.next_token;
        registry.next_token += 1;
        registry
            .listeners
            .entry(key.clone())
            .or_default()
            .push((token, Rc::new(callback)));
        Subscription {
            registry: Rc::downgrade(&self.registry),
            key,
            token,
        }
    }

    /// Invoke every callback registered for `key`, once each.
    ///
    /// The callback list is snapshotted first: callbacks subscribed during
    /// dispatch wait for the next notify. A callback unsubscribed by an
    /// earlier one in the same dispatch is skipped.
    pub fn notify(&self, key: &NodeId, payload: Option<&P>) {
        let callbacks: Vec<(u64, Callback<P>)> = self
            .registry
            .borrow()
            .listeners
            .get(key)
            .map(|list| list.iter().map(|(t, cb)| (*t, Rc::clone(cb))).collect())
            .unwrap_or_default();
        for (token, callback) in callbacks {
            if self.is_registered(key, token) {
                callback(key, payload);
            }
        }
    }

    fn is_registered(&self, key: &NodeId, token: u64) -> bool {
        self.registry
            .borrow()
            .listeners
            .get(key)
            .is_some_and(|list| list.iter().any(|(t, _)| *t == token))
    }

    /// Number of callbacks registered for `key`.
    #[must_use]
    pub fn subscriber_count(&self, key: &NodeId) -> usize {
        self.registry
            .borrow()
            .listeners
            .get(key)
            .map_or(0, Vec::len)
    }

    /// Drop every registration.
    pub fn clear(&self) {
        self.registry.borrow_mut().listeners.clear();
    }
}

/// Handle returned by [`NotificationBus::subscribe`].
///
/// Dropping the handle leaves the callback registered; call
/// [`Subscription::unsubscribe`] to remove it.
pub struct Subscription<P> {
    registry: Weak<RefCell<Registry<P>>>,
    key: NodeId,
    token: u64,
}

impl<P> Subscription<P> {
    /// Key this subscription listens on.
    #[must_use]
    pub fn key(&self) -> &NodeId {
        &self.key
    }

    /// Remove the registration. A no-op if the bus is gone or was cleared.
    pub fn unsubscribe(self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut registry = registry.borrow_mut();
        if let Some(list) = registry.listeners.get_mut(&self.key) {
            list.retain(|(token, _)| *token != self.token);
            if list.is_empty() {
                registry.listeners.remove(&self.key);
            }
        }
    }
}

impl<P> fmt::Debug for Subscription<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("token", &self.token)
            .finish()
    }
}
