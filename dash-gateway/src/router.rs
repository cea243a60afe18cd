use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use dash_dispatch::{normalize_base_path, ActionResult};
use serde_json::{json, Map, Value};
use tower_http::trace::TraceLayer;

use crate::error::GatewayError;
use crate::handler::HandlerRegistry;

type SharedRegistry = Arc<HandlerRegistry>;

/// Build the axum router with the action endpoints mounted under `base_path`
pub fn build_router(registry: HandlerRegistry, base_path: &str) -> Router {
    let actions = Router::new()
        .route("/api/actions", get(list_actions).post(missing_action_name))
        .route("/api/actions/", post(missing_action_name))
        .route("/api/actions/:action_name", post(execute_action))
        .with_state(Arc::new(registry));

    let base_path = normalize_base_path(base_path);
    let app = if base_path.is_empty() {
        actions
    } else {
        Router::new().nest(&base_path, actions)
    };
    app.layer(TraceLayer::new_for_http())
}

async fn list_actions(State(registry): State<SharedRegistry>) -> Json<ActionResult> {
    let names: Vec<&str> = registry.names().collect();
    Json(ActionResult::success(json!({ "actions": names })))
}

async fn missing_action_name() -> GatewayError {
    GatewayError::MissingActionName
}

async fn execute_action(
    State(registry): State<SharedRegistry>,
    Path(action_name): Path<String>,
    body: Bytes,
) -> Result<Json<ActionResult>, GatewayError> {
    let outcome = match action_input(&body) {
        Ok(input) => registry.execute(&action_name, input).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(data) => {
            tracing::debug!(action = %action_name, "Action handled");
            Ok(Json(ActionResult::success(data)))
        }
        Err(e) => {
            tracing::warn!(action = %action_name, error = %e, "Action rejected");
            Err(e)
        }
    }
}

/// Extract the action input from a request body
///
/// `{"data": x}` yields `x`; any other JSON body is the input itself. Empty
/// bodies and `null` become `{}`.
pub fn action_input(body: &[u8]) -> Result<Value, GatewayError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(empty_object());
    }

    let value: Value =
        serde_json::from_slice(body).map_err(|e| GatewayError::MalformedBody(e.to_string()))?;

    let input = match value {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    };

    Ok(match input {
        Value::Null => empty_object(),
        other => other,
    })
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt;

    fn app(base_path: &str) -> Router {
        let config = GatewayConfig {
            simulate_latency: false,
            ..Default::default()
        };
        build_router(HandlerRegistry::dashboard(&config).unwrap(), base_path)
    }

    async fn post(app: Router, uri: &str, body: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn input_extraction() {
        assert_eq!(action_input(b"").unwrap(), json!({}));
        assert_eq!(action_input(b"  \n").unwrap(), json!({}));
        assert_eq!(action_input(b"null").unwrap(), json!({}));
        assert_eq!(action_input(br#"{"data": null}"#).unwrap(), json!({}));
        assert_eq!(action_input(br#"{"data": {"a": 1}}"#).unwrap(), json!({"a": 1}));
        assert_eq!(action_input(br#"{"a": 1}"#).unwrap(), json!({"a": 1}));
        assert!(matches!(
            action_input(b"{oops"),
            Err(GatewayError::MalformedBody(_))
        ));
    }

    #[tokio::test]
    async fn executes_action_under_base_path() {
        let (status, body) = post(
            app("/firewall-for-ai"),
            "/firewall-for-ai/api/actions/flip-resource",
            r#"{"resourceId": "r1", "state": "disabled"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["newState"], "disabled");
        assert!(body.get("error").is_none());
    }

    #[tokio::test]
    async fn accepts_data_envelope() {
        let (status, body) = post(
            app(""),
            "/api/actions/get-analytics",
            r#"{"data": {"timeframe": "7d"}}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["timeframe"], "7d");
    }

    #[tokio::test]
    async fn unknown_action_is_bad_request() {
        let (status, body) = post(app(""), "/api/actions/nope", "{}").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"success": false, "error": "Unknown action: nope"}));
    }

    #[tokio::test]
    async fn missing_action_name_is_bad_request() {
        for uri in ["/api/actions", "/api/actions/"] {
            let (status, body) = post(app(""), uri, "{}").await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error"], "Action name is required");
        }
    }

    #[tokio::test]
    async fn invalid_payload_is_bad_request() {
        let (status, body) =
            post(app(""), "/api/actions/flip-resource", r#"{"resourceId": "r1"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("Invalid payload for flip-resource"));
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let (status, body) = post(app(""), "/api/actions/get-analytics", "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("Malformed request body"));
    }

    #[tokio::test]
    async fn lists_actions() {
        let response = app("/dash")
            .oneshot(
                Request::builder()
                    .uri("/dash/api/actions")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["data"]["actions"].as_array().unwrap().len(), 7);
    }

    #[tokio::test]
    async fn routes_outside_base_path_are_not_found() {
        let response = app("/firewall-for-ai")
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/actions/get-analytics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
