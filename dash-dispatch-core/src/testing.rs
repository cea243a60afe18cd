//! Test utilities for dash-dispatch applications
//!
//! - [`ChangeRecorder`]: a subscriber callback that remembers what it saw
//! - [`MockTransport`]: scripted gateway replies, optionally held back
//! - Assertion macros for action slots in a [`Store`](crate::Store)
//!
//! # Example
//!
//! ```
//! use dash_dispatch_core::testing::{ChangeRecorder, MockTransport};
//! use dash_dispatch_core::{assert_result, ActionResult, Dispatcher, Store};
//! use serde_json::json;
//!
//! # tokio_test_block(async {
//! let store = Store::new();
//! let transport = MockTransport::new();
//! transport.reply("flip-resource", ActionResult::success(json!({"newState": "enabled"})));
//!
//! let loading = ChangeRecorder::new();
//! store.subscribe("flip-resource_loading", loading.callback());
//!
//! let dispatcher = Dispatcher::new(store.clone(), transport);
//! dispatcher.execute_action("flip-resource", json!({})).await;
//!
//! assert_result!(store, "flip-resource", json!({"newState": "enabled"}));
//! assert_eq!(loading.loading_values(), vec![true, false]);
//! # });
//! # fn tokio_test_block(f: impl std::future::Future<Output = ()>) {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::action::ActionName;
use crate::result::ActionResult;
use crate::store::Change;
use crate::transport::{Transport, TransportError};

/// Records every [`Change`] delivered to its callbacks
///
/// Clones share the same record.
#[derive(Clone, Debug, Default)]
pub struct ChangeRecorder {
    changes: Arc<Mutex<Vec<Change>>>,
}

impl ChangeRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A callback to pass to [`Store::subscribe`](crate::Store::subscribe)
    pub fn callback(&self) -> impl Fn(&Change) + Send + Sync + 'static {
        let changes = self.changes.clone();
        move |change: &Change| {
            changes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(change.clone());
        }
    }

    /// All changes so far, in delivery order
    pub fn changes(&self) -> Vec<Change> {
        self.lock().clone()
    }

    /// Values carried by [`Change::Value`] entries
    pub fn values(&self) -> Vec<Option<Value>> {
        self.lock()
            .iter()
            .filter_map(|change| match change {
                Change::Value(value) => Some(value.clone()),
                Change::Loading(_) => None,
            })
            .collect()
    }

    /// Flags carried by [`Change::Loading`] entries
    pub fn loading_values(&self) -> Vec<bool> {
        self.lock().iter().filter_map(Change::loading).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Change>> {
        self.changes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Scripted {
    reply: Result<ActionResult, TransportError>,
    gate: Option<oneshot::Receiver<()>>,
}

#[derive(Default)]
struct MockState {
    scripts: HashMap<String, VecDeque<Scripted>>,
    requests: Vec<(ActionName, Value)>,
}

/// Transport answering from per-action FIFO scripts
///
/// Actions without a remaining script are rejected with status 404 and
/// `"Unknown action: <name>"`, the way the gateway answers. Clones share the
/// scripts and the request record, so a test can keep one and hand the other
/// to a [`Dispatcher`](crate::Dispatcher).
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("MockTransport")
            .field("scripted_actions", &state.scripts.len())
            .field("requests", &state.requests.len())
            .finish()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, action: &str, scripted: Scripted) {
        self.lock()
            .scripts
            .entry(action.to_string())
            .or_default()
            .push_back(scripted);
    }

    /// Queue a well-formed gateway reply
    pub fn reply(&self, action: &str, result: ActionResult) {
        self.push(
            action,
            Scripted {
                reply: Ok(result),
                gate: None,
            },
        );
    }

    /// Queue a non-2xx answer carrying `message`
    pub fn reject(&self, action: &str, status: u16, message: impl Into<String>) {
        self.fail(
            action,
            TransportError::Rejected {
                status,
                message: message.into(),
            },
        );
    }

    /// Queue an arbitrary transport failure
    pub fn fail(&self, action: &str, error: TransportError) {
        self.push(
            action,
            Scripted {
                reply: Err(error),
                gate: None,
            },
        );
    }

    /// Queue a reply that is held back until the returned sender fires
    ///
    /// Dropping the sender releases the reply as well.
    pub fn enqueue_gated(&self, action: &str, result: ActionResult) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.push(
            action,
            Scripted {
                reply: Ok(result),
                gate: Some(rx),
            },
        );
        tx
    }

    /// Every request received so far, in arrival order
    pub fn requests(&self) -> Vec<(ActionName, Value)> {
        self.lock().requests.clone()
    }

    /// Number of scripted replies not consumed yet
    pub fn remaining(&self) -> usize {
        self.lock().scripts.values().map(VecDeque::len).sum()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(
        &self,
        action: &ActionName,
        payload: &Value,
    ) -> Result<ActionResult, TransportError> {
        let scripted = {
            let mut state = self.lock();
            state.requests.push((action.clone(), payload.clone()));
            state
                .scripts
                .get_mut(action.as_str())
                .and_then(VecDeque::pop_front)
        };

        let Some(scripted) = scripted else {
            return Err(TransportError::Rejected {
                status: 404,
                message: format!("Unknown action: {}", action),
            });
        };

        if let Some(gate) = scripted.gate {
            let _ = gate.await;
        }
        scripted.reply
    }
}

/// Assert that an action's `_result` key holds a value.
///
/// # Example
///
/// ```ignore
/// assert_result!(store, "flip-resource", json!({"newState": "enabled"}));
/// ```
#[macro_export]
macro_rules! assert_result {
    ($store:expr, $action:expr, $expected:expr) => {{
        let key = ::std::format!("{}_result", $action);
        let actual = $store.get(key.as_str());
        assert_eq!(
            actual,
            Some($expected),
            "Expected `{}` to hold the given result, store has keys {:?}",
            key,
            $store.keys()
        );
    }};
}

/// Assert that an action's `_error` key holds a message.
///
/// # Example
///
/// ```ignore
/// assert_action_error!(store, "toggle-cache-rule", "bad token");
/// ```
#[macro_export]
macro_rules! assert_action_error {
    ($store:expr, $action:expr, $message:expr) => {{
        let key = ::std::format!("{}_error", $action);
        let actual = $store.get(key.as_str());
        assert_eq!(
            actual.as_ref().and_then(|v| v.as_str()),
            Some($message),
            "Expected `{}` to hold error {:?}, got {:?}",
            key,
            $message,
            actual
        );
    }};
}

/// Assert that no action is in flight.
///
/// # Example
///
/// ```ignore
/// assert_idle!(store);
/// ```
#[macro_export]
macro_rules! assert_idle {
    ($store:expr) => {
        assert!(
            $store.loading_keys().is_empty(),
            "Expected no loading actions, but got: {:?}",
            $store.loading_keys()
        );
    };
}
