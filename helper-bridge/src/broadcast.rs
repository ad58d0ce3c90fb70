//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Delivery of helper broadcasts.
//!
//! A broadcast frame carries a key instead of a call id. The connection hands
//! each key to a [`BroadcastRouter`], which forwards it to the application's
//! [`EventDispatch`] collaborator. Broadcasts never enter the correlation
//! table and can never satisfy a request.
//!
//! # Example
//!
//! ```rust
//! use helper_bridge::broadcast::{EventDispatch, HandlerRegistry};
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU64, Ordering};
//!
//! let registry = HandlerRegistry::new();
//! let landed = Arc::new(AtomicU64::new(0));
//! let counter = landed.clone();
//!
//! registry.on("landed", move |_key| {
//!     counter.fetch_add(1, Ordering::Relaxed);
//! });
//!
//! assert!(registry.trigger("landed"));
//! assert!(!registry.trigger("crashed"));
//! assert_eq!(landed.load(Ordering::Relaxed), 1);
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

/// Receives broadcast keys from the helper.
pub trait EventDispatch: Send + Sync {
    /// Fire whatever is registered for `key`.
    ///
    /// Returns `false` if nothing is registered under that key.
    fn trigger(&self, key: &str) -> bool;
}

/// Discards every broadcast.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDispatch;

impl EventDispatch for NoDispatch {
    fn trigger(&self, _key: &str) -> bool {
        false
    }
}

/// Forwards every key into a channel.
impl EventDispatch for mpsc::UnboundedSender<String> {
    fn trigger(&self, key: &str) -> bool {
        self.send(key.to_string()).is_ok()
    }
}

type BroadcastCallback = dyn Fn(&str) + Send + Sync;

/// Key-indexed broadcast callbacks.
///
/// Clones share the same registrations.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: Arc<Mutex<HashMap<String, Vec<Arc<BroadcastCallback>>>>>,
}

impl HandlerRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for broadcasts named `key`.
    pub fn on<F>(&self, key: impl Into<String>, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.lock()
            .entry(key.into())
            .or_default()
            .push(Arc::new(callback));
    }

    /// Remove every callback for `key`. Returns `true` if any existed.
    pub fn remove(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    /// Whether any callback is registered for `key`.
    pub fn is_registered(&self, key: &str) -> bool {
        self.lock().get(key).is_some_and(|callbacks| !callbacks.is_empty())
    }

    /// Remove every callback.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<Arc<BroadcastCallback>>>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventDispatch for HandlerRegistry {
    fn trigger(&self, key: &str) -> bool {
        // Callbacks run outside the lock so they may register more handlers.
        let callbacks = match self.lock().get(key) {
            Some(callbacks) if !callbacks.is_empty() => callbacks.clone(),
            _ => return false,
        };
        for callback in &callbacks {
            callback(key);
        }
        true
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.lock();
        let mut keys: Vec<&String> = handlers.keys().collect();
        keys.sort();
        f.debug_struct("HandlerRegistry")
            .field("keys", &keys)
            .finish()
    }
}

/// Forwards broadcast keys from the connection to an [`EventDispatch`].
#[derive(Clone)]
pub struct BroadcastRouter {
    dispatch: Arc<dyn EventDispatch>,
}

impl BroadcastRouter {
    /// Route through `dispatch`.
    pub fn new(dispatch: Arc<dyn EventDispatch>) -> Self {
        Self { dispatch }
    }

    /// Trigger `key`. Unregistered keys are logged and otherwise ignored.
    pub fn route(&self, key: &str) -> bool {
        let handled = self.dispatch.trigger(key);
        if handled {
            tracing::debug!(key, "broadcast routed");
        } else {
            tracing::info!(key, "broadcast has no registered handler");
        }
        handled
    }
}

impl Default for BroadcastRouter {
    fn default() -> Self {
        Self::new(Arc::new(NoDispatch))
    }
}

impl std::fmt::Debug for BroadcastRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastRouter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn test_registry_multiple_callbacks() {
        let registry = HandlerRegistry::new();
        let hits = Arc::new(AtomicU64::new(0));
        for _ in 0..3 {
            let hits = hits.clone();
            registry.on("takeoff", move |_| {
                hits.fetch_add(1, Ordering::Relaxed);
            });
        }

        assert!(registry.is_registered("takeoff"));
        assert!(registry.trigger("takeoff"));
        assert_eq!(hits.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_registry_remove_and_clear() {
        let registry = HandlerRegistry::new();
        registry.on("a", |_| {});
        registry.on("b", |_| {});

        assert!(registry.remove("a"));
        assert!(!registry.remove("a"));
        assert!(!registry.trigger("a"));

        registry.clear();
        assert!(!registry.is_registered("b"));
    }

    #[test]
    fn test_registry_callback_may_register() {
        let registry = HandlerRegistry::new();
        let inner = registry.clone();
        registry.on("first", move |_| inner.on("second", |_| {}));

        assert!(registry.trigger("first"));
        assert!(registry.is_registered("second"));
    }

    #[test]
    fn test_router_unregistered_is_noop() {
        let router = BroadcastRouter::default();
        assert!(!router.route("anything"));
    }

    #[tokio::test]
    async fn test_channel_dispatch() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let router = BroadcastRouter::new(Arc::new(tx));

        assert!(router.route("land"));
        assert_eq!(rx.recv().await.as_deref(), Some("land"));

        rx.close();
        assert!(!router.route("land"));
    }
}
