//! HTTP action gateway for dash-dispatch dashboards
//!
//! Serves `POST <base-path>/api/actions/<name>` and answers with the
//! `{success, data?, error?}` shape the dispatcher expects. Handlers are
//! looked up in a [`HandlerRegistry`] built at startup.

pub mod catalog;
pub mod cloudflare;
pub mod config;
pub mod error;
pub mod handler;
pub mod handlers;
pub mod router;
pub mod server;

pub use catalog::DashboardAction;
pub use cloudflare::CloudflareClient;
pub use config::GatewayConfig;
pub use error::{CloudflareError, GatewayError, HandlerError, ServerError, ServerResult};
pub use handler::{ActionHandler, HandlerRegistry};
pub use router::build_router;
pub use server::{GatewayServer, RunningGateway};
