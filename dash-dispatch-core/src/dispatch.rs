//! Dispatcher: runs actions through the gateway and records their outcome
//!
//! Each execution marks the action loading, sends the payload through a
//! [`Transport`], writes the outcome under the action's derived keys and
//! clears the loading flag. Subscribers of `<name>_result`, `<name>_error` and
//! `<name>_loading` see every step.
//!
//! ```no_run
//! use dash_dispatch_core::{Dispatcher, DispatcherConfig, Store};
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), dash_dispatch_core::TransportError> {
//! let store = Store::new();
//! let dispatcher = Dispatcher::http(store.clone(), &DispatcherConfig::default())?;
//!
//! let result = dispatcher
//!     .execute_action("flip-resource", json!({"resourceId": "r1", "state": "enabled"}))
//!     .await;
//! if result.success {
//!     println!("{:?}", store.get("flip-resource_result"));
//! }
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;

use crate::action::{ActionName, ActionPayload};
use crate::config::OutcomePolicy;
use crate::key::StateKey;
use crate::middleware::{ExecutionId, Middleware, NoopMiddleware};
use crate::result::ActionResult;
use crate::store::Store;
use crate::transport::Transport;

/// Clears an action's loading flag when execution ends, however it ends
struct LoadingGuard {
    store: Store,
    key: StateKey,
}

impl LoadingGuard {
    fn start(store: &Store, action: &ActionName) -> Self {
        let key = StateKey::action(action);
        store.set_loading(&key, true);
        Self {
            store: store.clone(),
            key,
        }
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.store.set_loading(&self.key, false);
    }
}

/// Reports an execution as abandoned if it is dropped before completing
struct AbandonGuard<'a, M: Middleware> {
    middleware: &'a M,
    execution: ExecutionId,
    action: &'a ActionName,
    armed: bool,
}

impl<M: Middleware> AbandonGuard<'_, M> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<M: Middleware> Drop for AbandonGuard<'_, M> {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!(
                action = %self.action,
                execution = %self.execution,
                "Action dropped before completion"
            );
            self.middleware.abandoned(self.execution, self.action);
        }
    }
}

/// Executes actions against the gateway and mirrors them into a [`Store`]
///
/// The dispatcher never fails: every problem ends up as an
/// [`ActionResult`] with `success == false` and in `<name>_error`.
#[derive(Clone)]
pub struct Dispatcher<M = NoopMiddleware> {
    store: Store,
    transport: Arc<dyn Transport>,
    policy: OutcomePolicy,
    middleware: M,
    executions: Arc<AtomicU64>,
}

impl<M: fmt::Debug> fmt::Debug for Dispatcher<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("store", &self.store)
            .field("policy", &self.policy)
            .field("middleware", &self.middleware)
            .finish_non_exhaustive()
    }
}

impl Dispatcher<NoopMiddleware> {
    /// Create a dispatcher writing into `store`
    pub fn new(store: Store, transport: impl Transport + 'static) -> Self {
        Self {
            store,
            transport: Arc::new(transport),
            policy: OutcomePolicy::default(),
            middleware: NoopMiddleware,
            executions: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Create a dispatcher talking HTTP to the gateway described by `config`
    #[cfg(feature = "http")]
    pub fn http(
        store: Store,
        config: &crate::config::DispatcherConfig,
    ) -> Result<Self, crate::transport::TransportError> {
        let transport = crate::transport::HttpTransport::new(config)?;
        Ok(Self::new(store, transport).with_policy(config.outcome_policy))
    }
}

impl<M: Middleware> Dispatcher<M> {
    /// Replace the middleware
    pub fn with_middleware<N: Middleware>(self, middleware: N) -> Dispatcher<N> {
        Dispatcher {
            store: self.store,
            transport: self.transport,
            policy: self.policy,
            middleware,
            executions: self.executions,
        }
    }

    pub fn with_policy(mut self, policy: OutcomePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn middleware(&self) -> &M {
        &self.middleware
    }

    pub fn policy(&self) -> OutcomePolicy {
        self.policy
    }

    /// Execute an action by name
    ///
    /// A `null` payload is sent as `{}`. An invalid name yields a failure
    /// result without touching the store.
    pub async fn execute_action(&self, name: &str, payload: Value) -> ActionResult {
        match ActionName::new(name) {
            Ok(action) => self.execute(&action, payload).await,
            Err(e) => {
                tracing::warn!(action = %name, error = %e, "Rejected action name");
                ActionResult::failure(e.to_string())
            }
        }
    }

    /// Execute a typed action
    ///
    /// A payload that cannot be encoded fails the action without contacting
    /// the gateway.
    pub async fn dispatch<A: ActionPayload>(&self, action: &A) -> ActionResult {
        match action.payload() {
            Ok(payload) => self.execute_action(action.name(), payload).await,
            Err(e) => {
                let message = format!("Failed to encode payload for {}: {}", action.name(), e);
                tracing::warn!(action = %action.name(), error = %e, "Payload encoding failed");
                let result = ActionResult::failure(message);
                if let Ok(name) = ActionName::new(action.name()) {
                    self.record(&name, &result);
                }
                result
            }
        }
    }

    /// Execute an action with an already validated name
    pub async fn execute(&self, action: &ActionName, payload: Value) -> ActionResult {
        let payload = match payload {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };

        let execution = ExecutionId::new(self.executions.fetch_add(1, Ordering::Relaxed));
        let guard = LoadingGuard::start(&self.store, action);
        self.middleware.before(execution, action, &payload);
        let pending = AbandonGuard {
            middleware: &self.middleware,
            execution,
            action,
            armed: true,
        };
        tracing::debug!(action = %action, %execution, "Dispatching action");

        let result = match self.transport.send(action, &payload).await {
            Ok(result) => result.normalized(),
            Err(e) => ActionResult::failure(e.to_string()),
        };

        self.record(action, &result);
        pending.disarm();
        drop(guard);

        if let Some(error) = result.error_message() {
            tracing::warn!(action = %action, error = %error, "Action failed");
        }
        self.middleware.after(execution, action, &result);
        result
    }

    fn record(&self, action: &ActionName, result: &ActionResult) {
        let (key, value, sibling) = match result.error_message() {
            None => (
                StateKey::result(action),
                result.data.clone().unwrap_or(Value::Null),
                StateKey::error(action),
            ),
            Some(message) => (
                StateKey::error(action),
                Value::String(message.to_string()),
                StateKey::result(action),
            ),
        };

        self.store.set(key, value);
        if self.policy == OutcomePolicy::ClearSibling && self.store.has(&sibling) {
            self.store.delete(sibling);
        }
    }
}
