use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use dash_dispatch::ActionResult;
use thiserror::Error;

/// Errors talking to the Cloudflare API
#[derive(Debug, Error)]
pub enum CloudflareError {
    #[error("{0}")]
    Request(#[from] reqwest::Error),

    /// Non-success status; the message comes from `errors[0].message`
    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("unexpected Cloudflare response: {0}")]
    Decode(String),

    /// The API base or a rule identifier cannot form a request URL
    #[error("invalid Cloudflare URL: {0}")]
    InvalidUrl(String),
}

/// Errors raised by an action handler
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Cloudflare(#[from] CloudflareError),

    #[error("{0}")]
    Invalid(String),

    #[error("failed to encode output: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Everything that turns a gateway request into a `400 {success:false}` reply
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Action name is required")]
    MissingActionName,

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Invalid payload for {action}: {source}")]
    InvalidPayload {
        action: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Malformed request body: {0}")]
    MalformedBody(String),

    #[error(transparent)]
    Handler(#[from] HandlerError),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = ActionResult::failure(self.to_string());
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}

/// Errors starting or running the gateway server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to build Cloudflare client: {0}")]
    Client(#[from] CloudflareError),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServerResult<T> = Result<T, ServerError>;
