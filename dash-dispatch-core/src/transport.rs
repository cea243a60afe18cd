//! Transports carry an action to the gateway and bring back its outcome
//!
//! The [`Dispatcher`](crate::Dispatcher) only sees the [`Transport`] trait.
//! [`HttpTransport`] talks to a real gateway over HTTP; tests use
//! [`MockTransport`](crate::testing::MockTransport).

use async_trait::async_trait;
use serde_json::Value;

use crate::action::ActionName;
use crate::result::ActionResult;

/// Failures between sending a request and having a well-formed reply
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The request could not be sent or its body could not be read
    #[cfg(feature = "http")]
    #[error("{0}")]
    Request(#[from] reqwest::Error),

    /// The gateway answered with a non-success status
    #[error("{message}")]
    Rejected { status: u16, message: String },

    /// A success status with a body that is not an action result
    #[error("invalid gateway response: {0}")]
    Decode(String),

    /// The gateway URL cannot carry an action path
    #[cfg(feature = "http")]
    #[error("invalid gateway endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
}

/// Sends one action to the gateway
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, action: &ActionName, payload: &Value)
        -> Result<ActionResult, TransportError>;
}

/// Turn a raw gateway reply into an [`ActionResult`]
///
/// Non-2xx statuses become [`TransportError::Rejected`] with the message taken
/// from `error`, then `errors[0].message`, then `"API Error: <status>"`.
/// A 2xx body must parse as an action result.
pub fn decode_reply(status: u16, body: &str) -> Result<ActionResult, TransportError> {
    let parsed = serde_json::from_str::<Value>(body);

    if !(200..300).contains(&status) {
        let message = parsed
            .ok()
            .as_ref()
            .and_then(error_message_from_body)
            .unwrap_or_else(|| format!("API Error: {}", status));
        return Err(TransportError::Rejected { status, message });
    }

    let value = parsed.map_err(|e| TransportError::Decode(e.to_string()))?;
    serde_json::from_value(value).map_err(|e| TransportError::Decode(e.to_string()))
}

/// Extract a human-readable message from an error body
///
/// Understands both `{"error": "..."}` and `{"errors": [{"message": "..."}]}`.
pub fn error_message_from_body(body: &Value) -> Option<String> {
    if let Some(message) = body.get("error").and_then(Value::as_str) {
        return Some(message.to_string());
    }
    body.get("errors")
        .and_then(|errors| errors.get(0))
        .and_then(|first| first.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(feature = "http")]
pub use http::HttpTransport;

#[cfg(feature = "http")]
mod http {
    use reqwest::Url;

    use super::*;
    use crate::config::DispatcherConfig;

    /// Transport posting JSON to `<gateway><base-path>/api/actions/<name>`
    #[derive(Clone, Debug)]
    pub struct HttpTransport {
        client: reqwest::Client,
        endpoint: Url,
    }

    impl HttpTransport {
        /// Build a transport with its own client
        pub fn new(config: &DispatcherConfig) -> Result<Self, TransportError> {
            let mut builder = reqwest::Client::builder();
            if let Some(timeout) = config.timeout() {
                builder = builder.timeout(timeout);
            }
            Self::with_client(builder.build()?, config)
        }

        /// Build a transport sharing an existing client
        pub fn with_client(
            client: reqwest::Client,
            config: &DispatcherConfig,
        ) -> Result<Self, TransportError> {
            let endpoint = config.actions_endpoint();
            let invalid = |reason: String| TransportError::InvalidEndpoint {
                endpoint: endpoint.clone(),
                reason,
            };
            let url = Url::parse(&endpoint).map_err(|e| invalid(e.to_string()))?;
            if url.cannot_be_a_base() {
                return Err(invalid("URL cannot have path segments".to_string()));
            }
            Ok(Self {
                client,
                endpoint: url,
            })
        }

        /// URL an action is posted to
        ///
        /// The name becomes a single percent-encoded path segment.
        pub fn action_url(&self, action: &ActionName) -> String {
            let mut url = self.endpoint.clone();
            if let Ok(mut segments) = url.path_segments_mut() {
                segments.pop_if_empty().push(action.as_str());
            }
            url.into()
        }
    }

    #[async_trait]
    impl Transport for HttpTransport {
        async fn send(
            &self,
            action: &ActionName,
            payload: &Value,
        ) -> Result<ActionResult, TransportError> {
            let url = self.action_url(action);
            tracing::debug!(action = %action, url = %url, "Posting action");

            let response = self.client.post(&url).json(payload).send().await?;
            let status = response.status().as_u16();
            let body = response.text().await?;

            tracing::debug!(action = %action, status, "Gateway replied");
            decode_reply(status, &body)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_action_url() {
            let config = DispatcherConfig::new("http://gw:1/").with_base_path("/app/");
            let transport = HttpTransport::new(&config).unwrap();
            let name = ActionName::new("flip-resource").unwrap();
            assert_eq!(
                transport.action_url(&name),
                "http://gw:1/app/api/actions/flip-resource"
            );
        }

        #[test]
        fn test_action_url_encodes_name() {
            let transport = HttpTransport::new(&DispatcherConfig::new("http://gw:1")).unwrap();
            let name = ActionName::new("my action?").unwrap();
            assert_eq!(
                transport.action_url(&name),
                "http://gw:1/api/actions/my%20action%3F"
            );

            let name = ActionName::new("getAnalytics").unwrap();
            assert_eq!(
                transport.action_url(&name),
                "http://gw:1/api/actions/getAnalytics"
            );
        }

        #[test]
        fn test_rejects_unusable_endpoint() {
            let err = HttpTransport::new(&DispatcherConfig::new("not a url")).unwrap_err();
            assert!(matches!(err, TransportError::InvalidEndpoint { .. }));
        }
    }
}
