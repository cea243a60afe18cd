//! Action handlers and the registry the gateway looks them up in

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{GatewayError, HandlerError};

/// Backend implementation of one action
#[async_trait]
pub trait ActionHandler: Send + Sync + 'static {
    type Input: DeserializeOwned + Send;
    type Output: Serialize;

    async fn handle(&self, input: Self::Input) -> Result<Self::Output, HandlerError>;
}

/// Handler with its input and output types erased to JSON
#[async_trait]
trait ErasedHandler: Send + Sync {
    async fn call(&self, action: &str, input: Value) -> Result<Value, GatewayError>;
}

struct Typed<H>(H);

#[async_trait]
impl<H: ActionHandler> ErasedHandler for Typed<H> {
    async fn call(&self, action: &str, input: Value) -> Result<Value, GatewayError> {
        let input = serde_json::from_value::<H::Input>(input).map_err(|source| {
            GatewayError::InvalidPayload {
                action: action.to_string(),
                source,
            }
        })?;
        let output = self.0.handle(input).await?;
        serde_json::to_value(output).map_err(|e| HandlerError::Encode(e).into())
    }
}

/// Lookup table from action name to handler, built once at startup
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<String, Arc<dyn ErasedHandler>>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("actions", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`, replacing any previous one
    pub fn register<H: ActionHandler>(&mut self, name: impl Into<String>, handler: H) {
        self.handlers.insert(name.into(), Arc::new(Typed(handler)));
    }

    /// Builder form of [`register`](Self::register)
    pub fn with<H: ActionHandler>(mut self, name: impl Into<String>, handler: H) -> Self {
        self.register(name, handler);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered action names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Decode `input` for the named action and run its handler
    pub async fn execute(&self, name: &str, input: Value) -> Result<Value, GatewayError> {
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| GatewayError::UnknownAction(name.to_string()))?;
        handler.call(name, input).await
    }
}
