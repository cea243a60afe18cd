//! Handlers for the dashboard action catalog
//!
//! The resource, config and analytics handlers are simulations that answer
//! after a short delay. The cache rule handlers call the Cloudflare API.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use rand::Rng;
use serde_json::Value;

use crate::catalog::*;
use crate::cloudflare::CloudflareClient;
use crate::config::GatewayConfig;
use crate::error::{CloudflareError, HandlerError};
use crate::handler::{ActionHandler, HandlerRegistry};

/// Current time in the `2024-01-31T12:00:00.000Z` form
fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Artificial processing time of the simulated handlers
#[derive(Clone, Copy, Debug)]
pub struct Latency {
    enabled: bool,
}

impl Latency {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    async fn wait(self, millis: u64) {
        if self.enabled {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
    }
}

pub struct FlipResource(pub Latency);

#[async_trait]
impl ActionHandler for FlipResource {
    type Input = FlipResourceInput;
    type Output = FlipResourceOutput;

    async fn handle(&self, input: FlipResourceInput) -> Result<FlipResourceOutput, HandlerError> {
        self.0.wait(500).await;
        Ok(FlipResourceOutput {
            message: format!("Resource {} has been {}", input.resource_id, input.state),
            previous_state: input.state.opposite(),
            new_state: input.state,
            resource_id: input.resource_id,
            timestamp: now(),
        })
    }
}

pub struct UpdateConfig(pub Latency);

#[async_trait]
impl ActionHandler for UpdateConfig {
    type Input = UpdateConfigInput;
    type Output = UpdateConfigOutput;

    async fn handle(&self, input: UpdateConfigInput) -> Result<UpdateConfigOutput, HandlerError> {
        self.0.wait(300).await;
        Ok(UpdateConfigOutput {
            success: true,
            message: format!("Configuration {} updated successfully", input.config_path),
            config_path: input.config_path,
            old_value: Value::String("previous-value".to_string()),
            new_value: input.value,
            updated_at: now(),
        })
    }
}

pub struct TestApiConnection(pub Latency);

#[async_trait]
impl ActionHandler for TestApiConnection {
    type Input = TestApiConnectionInput;
    type Output = TestApiConnectionOutput;

    async fn handle(
        &self,
        input: TestApiConnectionInput,
    ) -> Result<TestApiConnectionOutput, HandlerError> {
        self.0.wait(1000).await;
        Ok(TestApiConnectionOutput {
            status: "connected".to_string(),
            latency: rand::thread_rng().gen_range(50..150),
            message: format!("Successfully connected to {}", input.endpoint),
            endpoint: input.endpoint,
        })
    }
}

pub struct GetAnalytics(pub Latency);

#[async_trait]
impl ActionHandler for GetAnalytics {
    type Input = GetAnalyticsInput;
    type Output = GetAnalyticsOutput;

    async fn handle(&self, input: GetAnalyticsInput) -> Result<GetAnalyticsOutput, HandlerError> {
        self.0.wait(400).await;
        Ok(GetAnalyticsOutput {
            timeframe: input.timeframe,
            metrics: sample_metrics(),
            timestamp: now(),
        })
    }
}

fn sample_metrics() -> AnalyticsMetrics {
    let mut rng = rand::thread_rng();
    AnalyticsMetrics {
        requests: rng.gen_range(50_000..150_000),
        errors: rng.gen_range(0..1_000),
        success_rate: format!("{:.2}", 99.0 + rng.gen::<f64>()),
        avg_latency: rng.gen_range(20..120),
        cache_hit_rate: format!("{:.2}", 80.0 + rng.gen::<f64>() * 15.0),
    }
}

pub struct SaveResourceState(pub Latency);

#[async_trait]
impl ActionHandler for SaveResourceState {
    type Input = SaveResourceStateInput;
    type Output = SaveResourceStateOutput;

    async fn handle(
        &self,
        input: SaveResourceStateInput,
    ) -> Result<SaveResourceStateOutput, HandlerError> {
        self.0.wait(600).await;
        let saved_at = now();
        let saved = input.resources.len();
        Ok(SaveResourceStateOutput {
            saved,
            resources: input
                .resources
                .into_iter()
                .map(|resource| SavedResource {
                    resource,
                    saved_at: saved_at.clone(),
                })
                .collect(),
            message: format!("{} resource(s) state saved successfully", saved),
        })
    }
}

pub struct GetCacheRuleStatus(pub CloudflareClient);

#[async_trait]
impl ActionHandler for GetCacheRuleStatus {
    type Input = CacheRuleRef;
    type Output = CacheRuleStatus;

    async fn handle(&self, input: CacheRuleRef) -> Result<CacheRuleStatus, HandlerError> {
        Ok(self.0.rule_status(&input).await?)
    }
}

pub struct ToggleCacheRule(pub CloudflareClient);

#[async_trait]
impl ActionHandler for ToggleCacheRule {
    type Input = ToggleCacheRuleInput;
    type Output = Value;

    async fn handle(&self, input: ToggleCacheRuleInput) -> Result<Value, HandlerError> {
        Ok(self.0.set_rule_enabled(&input.rule, input.enabled).await?)
    }
}

impl HandlerRegistry {
    /// Registry serving every [`DashboardAction`]
    pub fn dashboard(config: &GatewayConfig) -> Result<Self, CloudflareError> {
        let latency = Latency::new(config.simulate_latency);
        let cloudflare = CloudflareClient::new(&config.cloudflare_api_base)?;

        Ok(Self::new()
            .with("flip-resource", FlipResource(latency))
            .with("update-config", UpdateConfig(latency))
            .with("test-api-connection", TestApiConnection(latency))
            .with("get-analytics", GetAnalytics(latency))
            .with("save-resource-state", SaveResourceState(latency))
            .with("get-cache-rule-status", GetCacheRuleStatus(cloudflare.clone()))
            .with("toggle-cache-rule", ToggleCacheRule(cloudflare)))
    }
}
