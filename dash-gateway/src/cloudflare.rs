//! Minimal client for Cloudflare ruleset rules

use std::time::Duration;

use reqwest::{Method, Response, Url};
use serde_json::{json, Value};

use crate::catalog::{CacheRuleRef, CacheRuleStatus};
use crate::error::CloudflareError;

#[derive(Clone, Debug)]
pub struct CloudflareClient {
    http: reqwest::Client,
    api_base: Url,
}

impl CloudflareClient {
    pub fn new(api_base: &str) -> Result<Self, CloudflareError> {
        let api_base = Url::parse(api_base)
            .map_err(|e| CloudflareError::InvalidUrl(format!("{api_base:?}: {e}")))?;
        if api_base.cannot_be_a_base() {
            return Err(CloudflareError::InvalidUrl(format!(
                "{api_base} cannot have path segments"
            )));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { http, api_base })
    }

    /// `<base>/zones/<zone>/rulesets/<ruleset>/rules/<rule>`
    ///
    /// Each identifier is percent-encoded into its own path segment.
    pub fn rule_url(&self, rule: &CacheRuleRef) -> Result<Url, CloudflareError> {
        let ids = [
            ("zoneId", &rule.zone_id),
            ("rulesetId", &rule.ruleset_id),
            ("ruleId", &rule.rule_id),
        ];
        for (field, id) in ids {
            if id.is_empty() || id == "." || id == ".." {
                return Err(CloudflareError::InvalidUrl(format!(
                    "{field} {id:?} is not a valid identifier"
                )));
            }
        }

        let mut url = self.api_base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend([
                "zones",
                rule.zone_id.as_str(),
                "rulesets",
                rule.ruleset_id.as_str(),
                "rules",
                rule.rule_id.as_str(),
            ]);
        }
        Ok(url)
    }

    /// Fetch a rule and reduce it to its status fields
    pub async fn rule_status(&self, rule: &CacheRuleRef) -> Result<CacheRuleStatus, CloudflareError> {
        let body = self.send(Method::GET, rule, None).await?;
        let result = body
            .get("result")
            .ok_or_else(|| CloudflareError::Decode("missing `result`".to_string()))?;

        let text = |field: &str| result.get(field).and_then(Value::as_str).map(str::to_string);
        Ok(CacheRuleStatus {
            rule_id: text("id").unwrap_or_else(|| rule.rule_id.clone()),
            enabled: result
                .get("enabled")
                .and_then(Value::as_bool)
                .ok_or_else(|| CloudflareError::Decode("missing `result.enabled`".to_string()))?,
            description: text("description"),
            last_updated: text("last_updated"),
        })
    }

    /// Enable or disable a rule, returning Cloudflare's response unchanged
    pub async fn set_rule_enabled(
        &self,
        rule: &CacheRuleRef,
        enabled: bool,
    ) -> Result<Value, CloudflareError> {
        self.send(Method::PATCH, rule, Some(json!({ "enabled": enabled })))
            .await
    }

    async fn send(
        &self,
        method: Method,
        rule: &CacheRuleRef,
        body: Option<Value>,
    ) -> Result<Value, CloudflareError> {
        let url = self.rule_url(rule)?;
        tracing::debug!(%method, rule_id = %rule.rule_id, "Calling Cloudflare");

        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(&rule.api_token);
        if let Some(body) = body {
            request = request.json(&body);
        }
        read_response(request.send().await?).await
    }
}

async fn read_response(response: Response) -> Result<Value, CloudflareError> {
    let status = response.status();
    let text = response.text().await?;
    let body = serde_json::from_str::<Value>(&text);

    if !status.is_success() {
        let message = body
            .ok()
            .as_ref()
            .and_then(first_error_message)
            .unwrap_or_else(|| format!("API Error: {}", status.as_u16()));
        return Err(CloudflareError::Api {
            status: status.as_u16(),
            message,
        });
    }

    body.map_err(|e| CloudflareError::Decode(e.to_string()))
}

/// `errors[0].message` of a Cloudflare error envelope
pub fn first_error_message(body: &Value) -> Option<String> {
    body.get("errors")?
        .get(0)?
        .get("message")?
        .as_str()
        .map(str::to_string)
}
