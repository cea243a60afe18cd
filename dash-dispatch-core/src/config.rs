//! Dispatcher configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default gateway origin for local development
pub const DEFAULT_GATEWAY_URL: &str = "http://127.0.0.1:4321";

/// Path prefix the dashboard is deployed under
pub const DEFAULT_BASE_PATH: &str = "/firewall-for-ai";

/// What happens to the opposite outcome field when an action completes
///
/// A success writes `<action>_result` and a failure writes `<action>_error`.
/// With [`KeepStale`](OutcomePolicy::KeepStale) the other field keeps whatever
/// an earlier run left there, so a stale error can sit next to a fresh result.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutcomePolicy {
    /// Leave the sibling field untouched
    #[default]
    KeepStale,
    /// Delete the sibling field on every new outcome
    ClearSibling,
}

/// Settings for [`Dispatcher`](crate::Dispatcher) and its HTTP transport
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Origin of the action gateway, e.g. `http://127.0.0.1:4321`
    pub gateway_url: String,
    /// Path prefix in front of `/api/actions`
    pub base_path: String,
    /// Per-request timeout; `None` waits indefinitely
    pub timeout_ms: Option<u64>,
    pub outcome_policy: OutcomePolicy,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            base_path: DEFAULT_BASE_PATH.to_string(),
            timeout_ms: Some(30_000),
            outcome_policy: OutcomePolicy::default(),
        }
    }
}

impl DispatcherConfig {
    /// Config pointing at a gateway origin with the default base path
    pub fn new(gateway_url: impl Into<String>) -> Self {
        Self {
            gateway_url: gateway_url.into(),
            ..Default::default()
        }
    }

    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout_ms = timeout.map(|t| t.as_millis() as u64);
        self
    }

    pub fn with_outcome_policy(mut self, policy: OutcomePolicy) -> Self {
        self.outcome_policy = policy;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Full URL of the action collection, without a trailing slash
    ///
    /// ```
    /// use dash_dispatch_core::DispatcherConfig;
    ///
    /// let config = DispatcherConfig::new("http://localhost:4321/");
    /// assert_eq!(
    ///     config.actions_endpoint(),
    ///     "http://localhost:4321/firewall-for-ai/api/actions"
    /// );
    /// ```
    pub fn actions_endpoint(&self) -> String {
        format!(
            "{}{}/api/actions",
            self.gateway_url.trim_end_matches('/'),
            normalize_base_path(&self.base_path)
        )
    }
}

/// Normalize a path prefix to `""` or `"/segment[/segment..]"`
pub fn normalize_base_path(base_path: &str) -> String {
    let trimmed = base_path.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}
