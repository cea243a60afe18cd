//! Core store, dispatcher and transport types for dash-dispatch
//!
//! This crate provides the state layer of a dashboard that runs its backend
//! work as named actions behind an HTTP gateway.
//!
//! # Core Concepts
//!
//! - **Store**: reactive key/value container with per-key subscriptions and
//!   loading flags
//! - **Dispatcher**: executes an action through a [`Transport`] and records
//!   its outcome under derived keys
//! - **Action**: typed action enums, usually `#[derive(Action)]`
//! - **Middleware**: hooks around every execution
//!
//! # Derived keys
//!
//! An action `name` owns three topics in the store:
//!
//! | Topic | Written when |
//! |-------|--------------|
//! | `name_result` | the gateway answers with `success: true` |
//! | `name_error` | anything fails, with a message |
//! | `name_loading` | the action starts and finishes |
//!
//! # Basic Example
//!
//! ```
//! use dash_dispatch_core::testing::MockTransport;
//! use dash_dispatch_core::{ActionName, ActionResult, Dispatcher, Store};
//! use serde_json::json;
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let store = Store::new();
//! let transport = MockTransport::new();
//! transport.reply("get-analytics", ActionResult::success(json!({"requests": 42})));
//!
//! let action = ActionName::new("get-analytics").unwrap();
//! let watch = store.subscribe_slot(&action, |slot| {
//!     if !slot.loading {
//!         println!("analytics: {:?}", slot.result);
//!     }
//! });
//!
//! let dispatcher = Dispatcher::new(store.clone(), transport);
//! let result = dispatcher.execute_action("get-analytics", json!({})).await;
//! assert!(result.success);
//! assert_eq!(store.slot(&action).result, Some(json!({"requests": 42})));
//!
//! watch.unsubscribe();
//! # });
//! ```

pub mod action;
pub mod action_log;
pub mod config;
pub mod dispatch;
pub mod global;
pub mod key;
pub mod middleware;
pub mod result;
pub mod snapshot;
pub mod store;
pub mod testing;
pub mod transport;

// Core trait exports
pub use action::{Action, ActionName, ActionNameError, ActionPayload, ActionSummary, DecodeError};

// Store exports
pub use key::{KeyKind, StateKey, Topic};
pub use snapshot::{ActionSlot, ComponentSnapshot};
pub use store::{Change, Store, SubscriberId, Subscription};

// Dispatch exports
pub use config::{
    normalize_base_path, DispatcherConfig, OutcomePolicy, DEFAULT_BASE_PATH, DEFAULT_GATEWAY_URL,
};
pub use dispatch::Dispatcher;
pub use result::{ActionResult, UNKNOWN_ERROR};
#[cfg(feature = "http")]
pub use transport::HttpTransport;
pub use transport::{decode_reply, Transport, TransportError};

// Middleware exports
pub use action_log::{
    glob_match, ActionLog, ActionLogConfig, ActionLogEntry, ActionLogFilter,
    ActionLogMiddleware, ActionOutcome,
};
pub use middleware::{
    ComposedMiddleware, ExecutionId, LoggingMiddleware, Middleware, NoopMiddleware,
};

pub use global::default_store;

#[doc(hidden)]
pub use serde_json;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::action::{Action, ActionName, ActionPayload, ActionSummary};
    pub use crate::action_log::{ActionLogConfig, ActionLogFilter, ActionLogMiddleware};
    pub use crate::config::{DispatcherConfig, OutcomePolicy};
    pub use crate::dispatch::Dispatcher;
    pub use crate::key::{StateKey, Topic};
    pub use crate::middleware::{
        ComposedMiddleware, ExecutionId, LoggingMiddleware, Middleware, NoopMiddleware,
    };
    pub use crate::result::ActionResult;
    pub use crate::snapshot::{ActionSlot, ComponentSnapshot};
    pub use crate::store::{Change, Store, Subscription};
    pub use crate::transport::{Transport, TransportError};
}
