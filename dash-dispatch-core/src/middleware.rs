//! Middleware hooks around action execution

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::action::ActionName;
use crate::result::ActionResult;

/// Identifies one execution of an action within a dispatcher
///
/// Overlapping executions of the same action get distinct ids, so `after`
/// can be matched to the `before` that started it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExecutionId(u64);

impl ExecutionId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Middleware trait for intercepting action executions
///
/// Implement this trait to add logging, metrics, or other cross-cutting
/// concerns to a [`Dispatcher`](crate::Dispatcher). Executions may overlap,
/// so hooks take `&self`; keep any bookkeeping behind interior mutability.
///
/// Every `before` is followed by exactly one `after` or `abandoned` with the
/// same [`ExecutionId`].
pub trait Middleware: Send + Sync {
    /// Called after the action is marked loading, before the request is sent
    fn before(&self, execution: ExecutionId, action: &ActionName, payload: &Value);

    /// Called once the outcome has been written to the store
    fn after(&self, execution: ExecutionId, action: &ActionName, result: &ActionResult);

    /// Called when the execution is dropped before it produced an outcome
    fn abandoned(&self, _execution: ExecutionId, _action: &ActionName) {}
}

impl<M: Middleware + ?Sized> Middleware for Arc<M> {
    fn before(&self, execution: ExecutionId, action: &ActionName, payload: &Value) {
        (**self).before(execution, action, payload);
    }

    fn after(&self, execution: ExecutionId, action: &ActionName, result: &ActionResult) {
        (**self).after(execution, action, result);
    }

    fn abandoned(&self, execution: ExecutionId, action: &ActionName) {
        (**self).abandoned(execution, action);
    }
}

/// A no-op middleware that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMiddleware;

impl Middleware for NoopMiddleware {
    fn before(&self, _execution: ExecutionId, _action: &ActionName, _payload: &Value) {}
    fn after(&self, _execution: ExecutionId, _action: &ActionName, _result: &ActionResult) {}
}

/// Middleware that logs executions through `tracing`
#[derive(Debug, Clone)]
pub struct LoggingMiddleware {
    /// Whether to log before the request
    pub log_before: bool,
    /// Whether to log the outcome
    pub log_after: bool,
}

impl Default for LoggingMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggingMiddleware {
    /// Create a new logging middleware with default settings (log after only)
    pub fn new() -> Self {
        Self {
            log_before: false,
            log_after: true,
        }
    }

    /// Create a logging middleware that logs both before and after
    pub fn verbose() -> Self {
        Self {
            log_before: true,
            log_after: true,
        }
    }
}

impl Middleware for LoggingMiddleware {
    fn before(&self, execution: ExecutionId, action: &ActionName, payload: &Value) {
        if self.log_before {
            tracing::debug!(%execution, action = %action, payload = %payload, "Executing action");
        }
    }

    fn after(&self, execution: ExecutionId, action: &ActionName, result: &ActionResult) {
        if !self.log_after {
            return;
        }
        match result.error_message() {
            None => tracing::info!(%execution, action = %action, "Action succeeded"),
            Some(error) => {
                tracing::warn!(%execution, action = %action, error = %error, "Action failed")
            }
        }
    }

    fn abandoned(&self, execution: ExecutionId, action: &ActionName) {
        if self.log_after {
            tracing::info!(%execution, action = %action, "Action abandoned");
        }
    }
}

/// Compose multiple middleware into a single middleware
#[derive(Clone, Default)]
pub struct ComposedMiddleware {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl std::fmt::Debug for ComposedMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComposedMiddleware")
            .field("middlewares_count", &self.middlewares.len())
            .finish()
    }
}

impl ComposedMiddleware {
    /// Create a new composed middleware
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a middleware to the composition
    pub fn add<M: Middleware + 'static>(&mut self, middleware: M) {
        self.middlewares.push(Arc::new(middleware));
    }

    /// Builder form of [`add`](Self::add)
    pub fn with<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.add(middleware);
        self
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }
}

impl Middleware for ComposedMiddleware {
    fn before(&self, execution: ExecutionId, action: &ActionName, payload: &Value) {
        for middleware in &self.middlewares {
            middleware.before(execution, action, payload);
        }
    }

    fn after(&self, execution: ExecutionId, action: &ActionName, result: &ActionResult) {
        // Call in reverse order for proper nesting
        for middleware in self.middlewares.iter().rev() {
            middleware.after(execution, action, result);
        }
    }

    fn abandoned(&self, execution: ExecutionId, action: &ActionName) {
        for middleware in self.middlewares.iter().rev() {
            middleware.abandoned(execution, action);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Clone)]
    struct Tagged {
        tag: &'static str,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl Middleware for Tagged {
        fn before(&self, execution: ExecutionId, action: &ActionName, _payload: &Value) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{}:before:{}#{}", self.tag, action, execution));
        }

        fn after(&self, execution: ExecutionId, action: &ActionName, _result: &ActionResult) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{}:after:{}#{}", self.tag, action, execution));
        }

        fn abandoned(&self, execution: ExecutionId, action: &ActionName) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{}:abandoned:{}#{}", self.tag, action, execution));
        }
    }

    #[test]
    fn test_composed_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let composed = ComposedMiddleware::new()
            .with(Tagged {
                tag: "outer",
                calls: calls.clone(),
            })
            .with(Tagged {
                tag: "inner",
                calls: calls.clone(),
            });
        assert_eq!(composed.len(), 2);

        let action = ActionName::new("a").unwrap();
        composed.before(ExecutionId::new(0), &action, &Value::Null);
        composed.after(ExecutionId::new(0), &action, &ActionResult::success(Value::Null));
        composed.before(ExecutionId::new(1), &action, &Value::Null);
        composed.abandoned(ExecutionId::new(1), &action);

        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                "outer:before:a#0",
                "inner:before:a#0",
                "inner:after:a#0",
                "outer:after:a#0",
                "outer:before:a#1",
                "inner:before:a#1",
                "inner:abandoned:a#1",
                "outer:abandoned:a#1",
            ]
        );
    }

    #[test]
    fn test_arc_middleware_delegates() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let shared = Arc::new(Tagged {
            tag: "shared",
            calls: calls.clone(),
        });
        let action = ActionName::new("b").unwrap();
        shared.before(ExecutionId::new(3), &action, &Value::Null);
        shared.abandoned(ExecutionId::new(3), &action);
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["shared:before:b#3", "shared:abandoned:b#3"]
        );
    }
}
