//! Reactive key/value store with per-key subscriptions and loading flags
//!
//! The store is a cheap, clonable handle: every clone observes and mutates the
//! same state. Mutations notify subscribers synchronously, before the mutating
//! call returns. Callbacks run without the internal lock held, so they may read
//! or write the store themselves.
//!
//! # Example
//!
//! ```
//! use dash_dispatch_core::{Change, Store};
//! use serde_json::json;
//!
//! let store = Store::new();
//! let sub = store.subscribe("theme", |change: &Change| {
//!     println!("theme is now {:?}", change.value());
//! });
//!
//! store.set("theme", json!("dark"));
//! assert_eq!(store.get("theme"), Some(json!("dark")));
//!
//! sub.unsubscribe();
//! ```

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::Value;

use crate::action::ActionName;
use crate::key::{StateKey, Topic};
use crate::snapshot::{ActionSlot, ComponentSnapshot};

/// Payload delivered to a subscriber
#[derive(Clone, Debug, PartialEq)]
pub enum Change {
    /// New value of a key (`None` once deleted)
    Value(Option<Value>),
    /// Current loading flag of a key
    Loading(bool),
}

impl Change {
    /// The value carried by a [`Change::Value`]
    pub fn value(&self) -> Option<&Value> {
        match self {
            Change::Value(value) => value.as_ref(),
            Change::Loading(_) => None,
        }
    }

    /// The flag carried by a [`Change::Loading`]
    pub fn loading(&self) -> Option<bool> {
        match self {
            Change::Loading(loading) => Some(*loading),
            Change::Value(_) => None,
        }
    }
}

type Callback = Arc<dyn Fn(&Change) + Send + Sync>;

/// Identifies one registration of a callback
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

#[derive(Default)]
struct StoreInner {
    state: HashMap<StateKey, Value>,
    loading: HashSet<StateKey>,
    subscribers: HashMap<Topic, Vec<(SubscriberId, Callback)>>,
    components: HashMap<String, BTreeSet<StateKey>>,
    next_id: u64,
}

impl StoreInner {
    fn register(&mut self, topic: Topic, callback: Callback) -> SubscriberId {
        let id = SubscriberId(self.next_id);
        self.next_id += 1;
        self.subscribers.entry(topic).or_default().push((id, callback));
        id
    }

    /// Queue a change for every subscriber of `topic`, in registration order
    fn collect(&self, topic: &Topic, change: Change, pending: &mut Pending) {
        if let Some(subscribers) = self.subscribers.get(topic) {
            for (id, callback) in subscribers {
                pending.0.push(Notification {
                    topic: topic.clone(),
                    id: *id,
                    callback: callback.clone(),
                    change: change.clone(),
                });
            }
        }
    }

    fn is_registered(&self, topic: &Topic, id: SubscriberId) -> bool {
        self.subscribers
            .get(topic)
            .is_some_and(|subscribers| subscribers.iter().any(|(registered, _)| *registered == id))
    }

    /// Notifications fired by a write to `key`: its value, then its loading flag
    fn key_changed(&self, key: &StateKey) -> Pending {
        let mut pending = Pending::default();
        self.collect(
            &Topic::Value(key.clone()),
            Change::Value(self.state.get(key).cloned()),
            &mut pending,
        );
        self.collect(
            &Topic::Loading(key.clone()),
            Change::Loading(self.loading.contains(key)),
            &mut pending,
        );
        pending
    }
}

struct Notification {
    topic: Topic,
    id: SubscriberId,
    callback: Callback,
    change: Change,
}

/// Notifications gathered under the lock and delivered after releasing it
#[derive(Default)]
struct Pending(Vec<Notification>);

impl Pending {
    /// Run each callback, skipping registrations removed since collection
    ///
    /// An earlier callback may unsubscribe a later one; the removed callback
    /// then does not see the change.
    fn deliver(self, store: &Store) {
        for notification in self.0 {
            if !store.lock().is_registered(&notification.topic, notification.id) {
                continue;
            }
            let Notification {
                topic,
                callback,
                change,
                ..
            } = notification;
            if catch_unwind(AssertUnwindSafe(|| callback(&change))).is_err() {
                tracing::warn!(topic = %topic, "Subscriber panicked during notification");
            }
        }
    }
}

/// Reactive key/value store
///
/// See the [module documentation](self) for an overview.
#[derive(Clone, Default)]
pub struct Store {
    inner: Arc<Mutex<StoreInner>>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("Store")
            .field("keys", &inner.state.len())
            .field("loading", &inner.loading.len())
            .field("topics", &inner.subscribers.len())
            .field("components", &inner.components.len())
            .finish()
    }
}

impl Store {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        // Callbacks never run under the lock, so a poisoned mutex still holds
        // consistent state.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current value of a key
    pub fn get(&self, key: impl Into<StateKey>) -> Option<Value> {
        self.lock().state.get(&key.into()).cloned()
    }

    /// Whether a key is present (a stored `null` counts as present)
    pub fn has(&self, key: impl Into<StateKey>) -> bool {
        self.lock().state.contains_key(&key.into())
    }

    /// Write a value and notify the key's value and loading subscribers
    pub fn set(&self, key: impl Into<StateKey>, value: Value) {
        let key = key.into();
        let pending = {
            let mut inner = self.lock();
            inner.state.insert(key.clone(), value);
            inner.key_changed(&key)
        };
        tracing::trace!(key = %key, subscribers = pending.0.len(), "State set");
        pending.deliver(self);
    }

    /// Replace a key's value with `f(current)`
    ///
    /// `f` sees `None` when the key is absent. The write goes through
    /// [`set`](Self::set), so subscribers are notified the same way.
    pub fn update<F>(&self, key: impl Into<StateKey>, f: F)
    where
        F: FnOnce(Option<&Value>) -> Value,
    {
        let key = key.into();
        let current = self.get(&key);
        let updated = f(current.as_ref());
        self.set(key, updated);
    }

    /// Remove a key and its loading flag
    ///
    /// Subscribers are notified as for [`set`](Self::set), with the value now
    /// absent. Returns whether the key was present.
    pub fn delete(&self, key: impl Into<StateKey>) -> bool {
        let key = key.into();
        let (deleted, pending) = {
            let mut inner = self.lock();
            let deleted = inner.state.remove(&key).is_some();
            inner.loading.remove(&key);
            (deleted, inner.key_changed(&key))
        };
        tracing::trace!(key = %key, deleted, "State deleted");
        pending.deliver(self);
        deleted
    }

    /// Register a callback for a topic
    ///
    /// Strings are parsed as topics, so `"x"` observes the value of `x` and
    /// `"x_loading"` observes its loading flag.
    pub fn subscribe<F>(&self, topic: impl Into<Topic>, callback: F) -> Subscription
    where
        F: Fn(&Change) + Send + Sync + 'static,
    {
        let topic = topic.into();
        let id = self.lock().register(topic.clone(), Arc::new(callback));
        Subscription {
            store: Arc::downgrade(&self.inner),
            entries: vec![(topic, id)],
        }
    }

    /// Observe an action's result, error and loading flag as one [`ActionSlot`]
    ///
    /// The callback receives a fresh slot each time any of the three changes.
    pub fn subscribe_slot<F>(&self, action: &ActionName, callback: F) -> Subscription
    where
        F: Fn(&ActionSlot) + Send + Sync + 'static,
    {
        let callback = Arc::new(callback);
        let topics = [
            Topic::Value(StateKey::result(action)),
            Topic::Value(StateKey::error(action)),
            Topic::Loading(StateKey::action(action)),
        ];

        let mut inner = self.lock();
        let entries = topics
            .into_iter()
            .map(|topic| {
                let store = Arc::downgrade(&self.inner);
                let action = action.clone();
                let callback = callback.clone();
                let relay: Callback = Arc::new(move |_: &Change| {
                    if let Some(inner) = store.upgrade() {
                        callback(&Store { inner }.slot(&action));
                    }
                });
                let id = inner.register(topic.clone(), relay);
                (topic, id)
            })
            .collect();

        Subscription {
            store: Arc::downgrade(&self.inner),
            entries,
        }
    }

    /// Mark a key as loading (or not) and notify its loading subscribers
    pub fn set_loading(&self, key: impl Into<StateKey>, loading: bool) {
        let key = key.into();
        let pending = {
            let mut inner = self.lock();
            if loading {
                inner.loading.insert(key.clone());
            } else {
                inner.loading.remove(&key);
            }
            let mut pending = Pending::default();
            inner.collect(
                &Topic::Loading(key.clone()),
                Change::Loading(loading),
                &mut pending,
            );
            pending
        };
        tracing::trace!(key = %key, loading, "Loading flag set");
        pending.deliver(self);
    }

    pub fn is_loading(&self, key: impl Into<StateKey>) -> bool {
        self.lock().loading.contains(&key.into())
    }

    /// Keys currently marked as loading, sorted
    pub fn loading_keys(&self) -> Vec<StateKey> {
        let mut keys: Vec<_> = self.lock().loading.iter().cloned().collect();
        keys.sort();
        keys
    }

    /// Track additional keys for a component
    ///
    /// Keys are not required to exist in the store.
    pub fn register_component<I, K>(&self, id: impl Into<String>, keys: I)
    where
        I: IntoIterator<Item = K>,
        K: Into<StateKey>,
    {
        let mut inner = self.lock();
        inner
            .components
            .entry(id.into())
            .or_default()
            .extend(keys.into_iter().map(Into::into));
    }

    /// Snapshot of the keys a component registered
    ///
    /// Result and error keys also contribute the loading flag of their action.
    /// Unknown components yield an empty snapshot.
    pub fn get_component_state(&self, id: &str) -> ComponentSnapshot {
        let inner = self.lock();
        let mut snapshot = ComponentSnapshot::default();
        let Some(keys) = inner.components.get(id) else {
            return snapshot;
        };

        for key in keys {
            snapshot.insert(Topic::Value(key.clone()), inner.state.get(key).cloned());
            if key.is_derived() {
                let base = key.base_key();
                let loading = inner.loading.contains(&base);
                snapshot.insert(Topic::Loading(base), Some(Value::Bool(loading)));
            }
        }
        snapshot
    }

    /// Structured view of an action's result, error and loading flag
    pub fn slot(&self, action: &ActionName) -> ActionSlot {
        let inner = self.lock();
        ActionSlot {
            result: inner.state.get(&StateKey::result(action)).cloned(),
            error: inner
                .state
                .get(&StateKey::error(action))
                .map(|value| match value {
                    Value::String(message) => message.clone(),
                    other => other.to_string(),
                }),
            loading: inner.loading.contains(&StateKey::action(action)),
        }
    }

    /// All keys with a value, sorted
    pub fn keys(&self) -> Vec<StateKey> {
        let mut keys: Vec<_> = self.lock().state.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.lock().state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().state.is_empty()
    }

    /// Number of live registrations on a topic
    pub fn subscriber_count(&self, topic: impl Into<Topic>) -> usize {
        self.lock()
            .subscribers
            .get(&topic.into())
            .map_or(0, Vec::len)
    }

    /// Drop all values, loading flags and subscriptions
    ///
    /// Component registrations survive, and the store keeps working for new
    /// subscriptions. No notifications are sent.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.state.clear();
        inner.loading.clear();
        for subscribers in inner.subscribers.values_mut() {
            subscribers.clear();
        }
        tracing::debug!("Store cleared");
    }

    /// Tear the store down to its initial state, including components
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state.clear();
        inner.loading.clear();
        inner.subscribers.clear();
        inner.components.clear();
        tracing::debug!("Store reset");
    }
}

/// Handle returned by [`Store::subscribe`] and [`Store::subscribe_slot`]
///
/// Dropping the handle does not unsubscribe.
#[derive(Debug)]
pub struct Subscription {
    store: Weak<Mutex<StoreInner>>,
    entries: Vec<(Topic, SubscriberId)>,
}

impl Subscription {
    /// Remove exactly the registrations made by this handle
    ///
    /// Calling it again, or after the store is cleared or dropped, does nothing.
    pub fn unsubscribe(&self) {
        let Some(inner) = self.store.upgrade() else {
            return;
        };
        let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
        for (topic, id) in &self.entries {
            if let Some(subscribers) = inner.subscribers.get_mut(topic) {
                subscribers.retain(|(registered, _)| registered != id);
            }
        }
    }

    /// Topics covered by this handle
    pub fn topics(&self) -> impl Iterator<Item = &Topic> {
        self.entries.iter().map(|(topic, _)| topic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ChangeRecorder;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn action(name: &str) -> ActionName {
        ActionName::new(name).unwrap()
    }

    #[test]
    fn test_set_get_has() {
        let store = Store::new();
        assert_eq!(store.get("k"), None);
        assert!(!store.has("k"));

        store.set("k", json!({"a": 1}));
        assert_eq!(store.get("k"), Some(json!({"a": 1})));
        assert!(store.has("k"));

        store.set("k", json!(2));
        assert_eq!(store.get("k"), Some(json!(2)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_null_is_present() {
        let store = Store::new();
        store.set("k", Value::Null);
        assert!(store.has("k"));
        assert_eq!(store.get("k"), Some(Value::Null));
    }

    #[test]
    fn test_set_notifies_value_and_loading() {
        let store = Store::new();
        let values = ChangeRecorder::new();
        let loading = ChangeRecorder::new();
        store.subscribe("k", values.callback());
        store.subscribe("k_loading", loading.callback());

        store.set_loading("k", true);
        store.set("k", json!("v"));

        assert_eq!(values.changes(), vec![Change::Value(Some(json!("v")))]);
        assert_eq!(loading.loading_values(), vec![true, true]);
    }

    #[test]
    fn test_update_composes_set() {
        let store = Store::new();
        let recorder = ChangeRecorder::new();
        store.subscribe("count", recorder.callback());

        store.update("count", |current| {
            assert!(current.is_none());
            json!(1)
        });
        store.update("count", |current| {
            json!(current.and_then(Value::as_i64).unwrap_or(0) + 1)
        });

        assert_eq!(store.get("count"), Some(json!(2)));
        assert_eq!(recorder.values(), vec![Some(json!(1)), Some(json!(2))]);
    }

    #[test]
    fn test_unsubscribe_is_exact_and_idempotent() {
        let store = Store::new();
        let kept = ChangeRecorder::new();
        let removed = ChangeRecorder::new();
        store.subscribe("k", kept.callback());
        let sub = store.subscribe("k", removed.callback());
        let other = store.subscribe("other", removed.callback());

        sub.unsubscribe();
        sub.unsubscribe();
        store.set("k", json!(1));

        assert_eq!(kept.len(), 1);
        assert!(removed.is_empty());

        // The same callback under another key is untouched
        store.set("other", json!(2));
        assert_eq!(removed.len(), 1);
        other.unsubscribe();
    }

    #[test]
    fn test_notification_order_is_registration_order() {
        let store = Store::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            store.subscribe("k", move |_: &Change| order.lock().unwrap().push(i));
        }

        store.set("k", json!(true));
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_set_loading_notifies_loading_topic_only() {
        let store = Store::new();
        let values = ChangeRecorder::new();
        let loading = ChangeRecorder::new();
        store.subscribe("k", values.callback());
        store.subscribe("k_loading", loading.callback());

        store.set_loading("k", true);
        assert!(store.is_loading("k"));
        store.set_loading("k", false);
        assert!(!store.is_loading("k"));

        assert!(values.is_empty());
        assert_eq!(loading.loading_values(), vec![true, false]);
    }

    #[test]
    fn test_set_loading_is_idempotent() {
        let store = Store::new();
        store.set_loading("k", true);
        store.set_loading("k", true);
        assert_eq!(store.loading_keys(), vec![StateKey::new("k")]);

        store.set_loading("k", false);
        assert!(!store.is_loading("k"));
    }

    #[test]
    fn test_delete() {
        let store = Store::new();
        let recorder = ChangeRecorder::new();
        let loading = ChangeRecorder::new();
        store.subscribe("k", recorder.callback());
        store.subscribe("k_loading", loading.callback());

        assert!(!store.delete("k"));

        store.set("k", json!(1));
        store.set_loading("k", true);
        assert!(store.delete("k"));
        assert!(!store.has("k"));
        assert!(!store.is_loading("k"));

        assert_eq!(
            recorder.values(),
            vec![None, Some(json!(1)), None],
            "delete notifies like set, with the value absent"
        );
        assert_eq!(loading.loading_values(), vec![false, false, true, false]);
    }

    #[test]
    fn test_component_state_synthesizes_loading() {
        let store = Store::new();
        store.register_component("panel", ["x_result", "x_error"]);

        let snapshot = store.get_component_state("panel");
        assert_eq!(snapshot.loading("x"), Some(false));
        assert!(snapshot.contains("x_result"));
        assert_eq!(snapshot.get("x_result"), None);

        store.set_loading("x", true);
        store.set("x_result", json!({"ok": true}));
        let snapshot = store.get_component_state("panel");
        assert_eq!(snapshot.loading("x"), Some(true));
        assert_eq!(snapshot.get("x_result"), Some(&json!({"ok": true})));
        assert_eq!(snapshot.len(), 3);
    }

    #[test]
    fn test_component_state_plain_keys_and_union() {
        let store = Store::new();
        store.register_component("header", ["theme"]);
        store.register_component("header", ["user", "theme"]);
        store.set("theme", json!("dark"));

        let snapshot = store.get_component_state("header");
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.get("theme"), Some(&json!("dark")));
        assert_eq!(snapshot.loading("theme"), None);

        assert!(store.get_component_state("missing").is_empty());
    }

    #[test]
    fn test_component_snapshot_is_point_in_time() {
        let store = Store::new();
        store.register_component("c", ["a"]);
        store.set("a", json!(1));
        let snapshot = store.get_component_state("c");
        store.set("a", json!(2));
        assert_eq!(snapshot.get("a"), Some(&json!(1)));
    }

    #[test]
    fn test_clear_keeps_components_and_drops_callbacks() {
        let store = Store::new();
        let recorder = ChangeRecorder::new();
        let sub = store.subscribe("k", recorder.callback());
        store.register_component("c", ["k"]);
        store.set("k", json!(1));
        store.set_loading("k", true);

        store.clear();
        assert!(store.is_empty());
        assert!(!store.is_loading("k"));
        assert_eq!(store.subscriber_count("k"), 0);

        store.set("k", json!(2));
        assert_eq!(recorder.len(), 1);
        assert!(store.get_component_state("c").contains("k"));

        // Still usable for new subscriptions
        let late = ChangeRecorder::new();
        store.subscribe("k", late.callback());
        store.set("k", json!(3));
        assert_eq!(late.len(), 1);
        sub.unsubscribe();
    }

    #[test]
    fn test_reset_drops_components() {
        let store = Store::new();
        store.register_component("c", ["k"]);
        store.subscribe("k", |_: &Change| {});
        store.reset();
        assert!(store.get_component_state("c").is_empty());
        assert_eq!(store.subscriber_count("k"), 0);
    }

    #[test]
    fn test_panicking_subscriber_does_not_block_others() {
        let store = Store::new();
        let recorder = ChangeRecorder::new();
        store.subscribe("k", |_: &Change| panic!("subscriber failure"));
        store.subscribe("k", recorder.callback());

        store.set("k", json!(1));
        store.set("k", json!(2));

        assert_eq!(recorder.len(), 2);
        assert_eq!(store.get("k"), Some(json!(2)));
    }

    #[test]
    fn test_unsubscribe_during_notification_skips_removed_callback() {
        let store = Store::new();
        let removed = ChangeRecorder::new();
        let victim: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let slot = victim.clone();
        store.subscribe("k", move |_: &Change| {
            if let Some(sub) = slot.lock().unwrap().take() {
                sub.unsubscribe();
            }
        });
        *victim.lock().unwrap() = Some(store.subscribe("k", removed.callback()));
        let survivor = ChangeRecorder::new();
        store.subscribe("k", survivor.callback());

        store.set("k", json!(1));
        store.set("k", json!(2));

        assert!(removed.is_empty());
        assert_eq!(survivor.values(), vec![Some(json!(1)), Some(json!(2))]);
        assert_eq!(store.subscriber_count("k"), 2);
    }

    #[test]
    fn test_subscriber_can_reenter_store() {
        let store = Store::new();
        let mirror = store.clone();
        store.subscribe("source", move |change: &Change| {
            if let Some(value) = change.value() {
                mirror.set("copy", value.clone());
            }
        });

        store.set("source", json!("hello"));
        assert_eq!(store.get("copy"), Some(json!("hello")));
    }

    #[test]
    fn test_subscribe_slot() {
        let store = Store::new();
        let name = action("fetch");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let sub = store.subscribe_slot(&name, move |slot: &ActionSlot| {
            seen_clone.lock().unwrap().push(slot.clone());
        });
        assert_eq!(sub.topics().count(), 3);

        store.set_loading(StateKey::action(&name), true);
        store.set(StateKey::result(&name), json!(42));
        store.set_loading(StateKey::action(&name), false);

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 3);
        assert!(seen[0].loading);
        assert_eq!(seen[1].result, Some(json!(42)));
        assert!(seen[1].loading);
        assert!(!seen[2].loading);

        sub.unsubscribe();
        store.set(StateKey::error(&name), json!("late"));
        assert_eq!(store.slot(&name).error.as_deref(), Some("late"));
    }

    #[test]
    fn test_slot_reads_derived_keys() {
        let store = Store::new();
        let name = action("x");
        store.set("x_result", json!({"n": 1}));
        store.set("x_error", json!("bad token"));
        store.set_loading("x", true);

        let slot = store.slot(&name);
        assert_eq!(slot.result, Some(json!({"n": 1})));
        assert_eq!(slot.error.as_deref(), Some("bad token"));
        assert!(slot.loading);
    }

    #[test]
    fn test_unsubscribe_after_store_dropped() {
        let calls = Arc::new(AtomicUsize::new(0));
        let sub = {
            let store = Store::new();
            let calls = calls.clone();
            store.subscribe("k", move |_: &Change| {
                calls.fetch_add(1, Ordering::SeqCst);
            })
        };
        sub.unsubscribe();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
