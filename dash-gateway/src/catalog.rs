//! Actions the dashboard gateway understands, with their typed inputs and outputs
//!
//! Field names are camelCase on the wire.

use std::fmt;

use dash_dispatch::{Action, ActionSummary};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Every action served by the dashboard gateway
#[derive(Action, Clone, Debug, PartialEq)]
pub enum DashboardAction {
    FlipResource(FlipResourceInput),
    UpdateConfig(UpdateConfigInput),
    TestApiConnection(TestApiConnectionInput),
    GetAnalytics(GetAnalyticsInput),
    SaveResourceState(SaveResourceStateInput),
    GetCacheRuleStatus(CacheRuleRef),
    ToggleCacheRule(ToggleCacheRuleInput),
}

impl ActionSummary for DashboardAction {
    fn summary(&self) -> String {
        match self {
            Self::FlipResource(i) => format!("flip-resource {} -> {}", i.resource_id, i.state),
            Self::UpdateConfig(i) => format!("update-config {}", i.config_path),
            Self::TestApiConnection(i) => format!("test-api-connection {}", i.endpoint),
            Self::GetAnalytics(i) => format!("get-analytics {}", i.timeframe),
            Self::SaveResourceState(i) => {
                format!("save-resource-state ({} resources)", i.resources.len())
            }
            Self::GetCacheRuleStatus(r) => format!("get-cache-rule-status {}", r.rule_id),
            Self::ToggleCacheRule(i) => {
                format!("toggle-cache-rule {} enabled={}", i.rule.rule_id, i.enabled)
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceState {
    Enabled,
    Disabled,
}

impl ResourceState {
    pub fn opposite(self) -> Self {
        match self {
            Self::Enabled => Self::Disabled,
            Self::Disabled => Self::Enabled,
        }
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlipResourceInput {
    pub resource_id: String,
    pub state: ResourceState,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlipResourceOutput {
    pub resource_id: String,
    pub previous_state: ResourceState,
    pub new_state: ResourceState,
    pub timestamp: String,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateConfigInput {
    pub config_path: String,
    #[serde(default)]
    pub value: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateConfigOutput {
    pub success: bool,
    pub config_path: String,
    pub old_value: Value,
    pub new_value: Value,
    pub updated_at: String,
    pub message: String,
}

fn default_endpoint() -> String {
    "https://api.cloudflare.com".to_string()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestApiConnectionInput {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

impl Default for TestApiConnectionInput {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestApiConnectionOutput {
    pub endpoint: String,
    pub status: String,
    /// Milliseconds
    pub latency: u32,
    pub message: String,
}

fn default_timeframe() -> String {
    "24h".to_string()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetAnalyticsInput {
    #[serde(default = "default_timeframe")]
    pub timeframe: String,
}

impl Default for GetAnalyticsInput {
    fn default() -> Self {
        Self {
            timeframe: default_timeframe(),
        }
    }
}

/// Rates are decimal strings with two fraction digits
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsMetrics {
    pub requests: u64,
    pub errors: u64,
    pub success_rate: String,
    pub avg_latency: u64,
    pub cache_hit_rate: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetAnalyticsOutput {
    pub timeframe: String,
    pub metrics: AnalyticsMetrics,
    pub timestamp: String,
}

/// A resource as sent by the dashboard; unknown fields are carried through
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceEntry {
    pub id: String,
    pub state: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveResourceStateInput {
    pub resources: Vec<ResourceEntry>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedResource {
    #[serde(flatten)]
    pub resource: ResourceEntry,
    pub saved_at: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveResourceStateOutput {
    pub saved: usize,
    pub resources: Vec<SavedResource>,
    pub message: String,
}

/// Identifies one rule in a Cloudflare ruleset
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheRuleRef {
    pub zone_id: String,
    pub ruleset_id: String,
    pub rule_id: String,
    pub api_token: String,
}

impl fmt::Debug for CacheRuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheRuleRef")
            .field("zone_id", &self.zone_id)
            .field("ruleset_id", &self.ruleset_id)
            .field("rule_id", &self.rule_id)
            .field("api_token", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheRuleStatus {
    pub rule_id: String,
    pub enabled: bool,
    pub description: Option<String>,
    pub last_updated: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleCacheRuleInput {
    #[serde(flatten)]
    pub rule: CacheRuleRef,
    pub enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use dash_dispatch::ActionPayload;
    use serde_json::json;

    #[test]
    fn catalog_names() {
        assert_eq!(
            DashboardAction::names(),
            &[
                "flip-resource",
                "update-config",
                "test-api-connection",
                "get-analytics",
                "save-resource-state",
                "get-cache-rule-status",
                "toggle-cache-rule",
            ]
        );
    }

    #[test]
    fn optional_inputs_have_defaults() {
        let action = DashboardAction::decode("get-analytics", json!({})).unwrap();
        assert_eq!(action, DashboardAction::GetAnalytics(GetAnalyticsInput::default()));

        let action = DashboardAction::decode("test-api-connection", json!({})).unwrap();
        assert_eq!(
            action,
            DashboardAction::TestApiConnection(TestApiConnectionInput {
                endpoint: "https://api.cloudflare.com".to_string()
            })
        );
    }

    #[test]
    fn toggle_input_is_flat() {
        let payload = json!({
            "zoneId": "z", "rulesetId": "rs", "ruleId": "r", "apiToken": "t", "enabled": true
        });
        let action = DashboardAction::decode("toggle-cache-rule", payload.clone()).unwrap();
        assert_eq!(action.payload().unwrap(), payload);
        assert_eq!(action.summary(), "toggle-cache-rule r enabled=true");
    }

    #[test]
    fn resource_entries_keep_extra_fields() {
        let entry: ResourceEntry =
            serde_json::from_value(json!({"id": "a", "state": "on", "name": "A"})).unwrap();
        assert_eq!(entry.extra.get("name"), Some(&json!("A")));
    }

    #[test]
    fn debug_hides_api_token() {
        let rule = CacheRuleRef {
            zone_id: "z".into(),
            ruleset_id: "rs".into(),
            rule_id: "r".into(),
            api_token: "secret".into(),
        };
        assert!(!format!("{rule:?}").contains("secret"));
    }
}
