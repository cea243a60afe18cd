//! Uniform action outcome shared by the gateway and the dispatcher

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message used when a failure carries no description
pub const UNKNOWN_ERROR: &str = "Unknown error occurred";

/// Outcome of one action execution
///
/// This is both the gateway's response body and the value returned by
/// [`Dispatcher::execute_action`](crate::Dispatcher::execute_action):
/// `{"success": true, "data": ...}` or `{"success": false, "error": "..."}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResult {
    /// A successful outcome carrying `data`
    pub fn success(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// A failed outcome with a message
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }

    /// The failure message, falling back to [`UNKNOWN_ERROR`]
    ///
    /// Returns `None` for successful outcomes.
    pub fn error_message(&self) -> Option<&str> {
        if self.success {
            None
        } else {
            Some(
                self.error
                    .as_deref()
                    .filter(|message| !message.is_empty())
                    .unwrap_or(UNKNOWN_ERROR),
            )
        }
    }

    /// Fill in the default message on failures that have none
    pub fn normalized(mut self) -> Self {
        if let Some(message) = self.error_message() {
            self.error = Some(message.to_string());
        }
        self
    }

    /// Deserialize `data` into a typed output
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<Option<T>, serde_json::Error> {
        self.data.clone().map(serde_json::from_value).transpose()
    }

    /// Convert into a standard `Result`
    pub fn into_result(self) -> Result<Option<Value>, String> {
        if self.success {
            Ok(self.data)
        } else {
            Err(self
                .error
                .filter(|message| !message.is_empty())
                .unwrap_or_else(|| UNKNOWN_ERROR.to_string()))
        }
    }
}
