//! Action traits and validated action names

use std::fmt::{self, Debug};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::key::DERIVED_SUFFIXES;

/// Marker trait for actions that can be dispatched through the gateway
///
/// Actions represent intents to run work on the backend. They should be:
/// - Clone: Actions may be logged, replayed, or sent to multiple handlers
/// - Debug: For debugging and logging
/// - Send + 'static: For async dispatch across tasks
///
/// Use `#[derive(Action)]` from `dash-dispatch-macros` to auto-implement this trait.
pub trait Action: Clone + Debug + Send + 'static {
    /// Get the action name as it appears in the gateway URL
    fn name(&self) -> &'static str;
}

/// An action that carries a JSON payload and can be rebuilt from one
///
/// This is the typed side of the gateway contract: the client serializes an
/// action with [`payload`](ActionPayload::payload), the gateway rebuilds it
/// with [`decode`](ActionPayload::decode) and gets a typed error for unknown
/// names or malformed inputs.
///
/// Derived together with [`Action`] by `#[derive(Action)]` for enums whose
/// variants are either unit variants or newtype variants wrapping a
/// `Serialize + DeserializeOwned` input struct.
pub trait ActionPayload: Action + Sized {
    /// JSON body sent to the gateway for this action
    ///
    /// Fails when the input cannot be represented as JSON, e.g. a map with
    /// non-string keys.
    fn payload(&self) -> Result<Value, serde_json::Error>;

    /// Rebuild an action from its gateway name and JSON input
    fn decode(name: &str, data: Value) -> Result<Self, DecodeError>;

    /// All action names this type can decode
    fn names() -> &'static [&'static str];
}

/// Errors produced when decoding an action from the wire
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Invalid payload for {action}: {source}")]
    InvalidPayload {
        action: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors produced when validating an [`ActionName`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionNameError {
    #[error("Action name is required")]
    Empty,

    #[error("Invalid character {ch:?} in action name {name:?}")]
    InvalidChar { name: String, ch: char },

    #[error("Action name {name:?} ends with the reserved suffix {suffix:?}")]
    ReservedSuffix { name: String, suffix: &'static str },
}

/// A validated action identifier
///
/// Names are otherwise opaque. Only three shapes are refused: the empty name,
/// names containing `/` (they would leave their URL path segment), and names
/// ending in `_result`, `_error` or `_loading` (they would read as a derived
/// key of another action).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ActionName(String);

impl ActionName {
    /// Validate and wrap an action name
    pub fn new(name: impl Into<String>) -> Result<Self, ActionNameError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ActionNameError::Empty);
        }
        if name.contains('/') {
            return Err(ActionNameError::InvalidChar { name, ch: '/' });
        }
        if let Some(suffix) = DERIVED_SUFFIXES.into_iter().find(|s| name.ends_with(*s)) {
            return Err(ActionNameError::ReservedSuffix { name, suffix });
        }
        Ok(Self(name))
    }

    /// Get the name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ActionName {
    type Err = ActionNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ActionName {
    type Error = ActionNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ActionName> for String {
    fn from(name: ActionName) -> Self {
        name.0
    }
}

impl AsRef<str> for ActionName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Short human-readable description of an action for logs
///
/// The default implementation uses the action name; override it to include
/// the interesting part of the payload.
pub trait ActionSummary: Action {
    fn summary(&self) -> String {
        self.name().to_string()
    }
}
