//! dash-dispatch: reactive state and action dispatch for dashboards
//!
//! Components subscribe to keys in a shared [`Store`]; all backend work runs
//! as named actions through a [`Dispatcher`], which mirrors each action's
//! result, error and loading flag into the store.
//!
//! # Example
//! ```ignore
//! use dash_dispatch::prelude::*;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Clone, Debug, Serialize, Deserialize)]
//! #[serde(rename_all = "camelCase")]
//! struct FlipResourceInput {
//!     resource_id: String,
//!     state: String,
//! }
//!
//! #[derive(Action, Clone, Debug)]
//! enum DashboardAction {
//!     FlipResource(FlipResourceInput),
//!     GetAnalytics,
//! }
//!
//! let store = Store::new();
//! let dispatcher = Dispatcher::http(store.clone(), &DispatcherConfig::default())?;
//! dispatcher.dispatch(&DashboardAction::GetAnalytics).await;
//! ```

// Re-export everything from core
pub use dash_dispatch_core::*;

// Re-export derive macros
pub use dash_dispatch_macros::Action;

/// Prelude for convenient imports
pub mod prelude {
    pub use dash_dispatch_core::prelude::*;

    // Derive macros
    pub use dash_dispatch_macros::Action;
}
