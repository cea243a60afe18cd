//! Scripted session against a private in-process gateway

use std::net::SocketAddr;

use anyhow::Context;
use clap::Args;
use dash_dispatch::{
    ActionLogConfig, ActionLogFilter, ActionLogMiddleware, ActionName, ActionSummary,
    ComposedMiddleware, Dispatcher, DispatcherConfig, LoggingMiddleware, Middleware, Store,
};
use dash_gateway::catalog::{
    FlipResourceInput, GetAnalyticsInput, ResourceState, UpdateConfigInput,
};
use dash_gateway::{DashboardAction, GatewayConfig, GatewayServer};
use serde_json::json;

const PANEL: &str = "resource-panel";

#[derive(Args, Debug)]
pub struct DemoArgs {
    /// Keep the simulated backend latency (makes overlap visible)
    #[arg(long)]
    latency: bool,

    /// Only log actions matching these globs (comma separated)
    #[arg(long)]
    include: Option<String>,

    /// Skip actions matching these globs (comma separated)
    #[arg(long)]
    exclude: Option<String>,
}

pub async fn run(args: DemoArgs) -> anyhow::Result<()> {
    let config = GatewayConfig {
        bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        simulate_latency: args.latency,
        ..Default::default()
    };
    let gateway = GatewayServer::new(config)
        .context("building gateway")?
        .spawn()
        .await
        .context("starting gateway")?;
    println!("gateway on {}{}", gateway.url(), gateway.base_path());

    let action_log = ActionLogMiddleware::new(ActionLogConfig::new(
        64,
        ActionLogFilter::new(args.include.as_deref(), args.exclude.as_deref()),
    ));
    let store = Store::new();
    let dispatcher_config = DispatcherConfig::new(gateway.url()).with_base_path(gateway.base_path());
    let dispatcher = Dispatcher::http(store.clone(), &dispatcher_config)?.with_middleware(
        ComposedMiddleware::new()
            .with(LoggingMiddleware::new())
            .with(action_log.clone()),
    );

    session(&store, &dispatcher).await?;

    println!("\naction log:");
    for entry in action_log.snapshot() {
        println!("  {}", entry);
    }

    gateway.shutdown().await?;
    Ok(())
}

async fn session<M: Middleware>(store: &Store, dispatcher: &Dispatcher<M>) -> anyhow::Result<()> {
    let flip = ActionName::new("flip-resource")?;
    store.register_component(PANEL, ["flip-resource_result", "flip-resource_error"]);
    let watch = store.subscribe_slot(&flip, |slot| {
        let state = if slot.loading { "loading" } else { "idle" };
        println!("  [{}] {} result={:?}", PANEL, state, slot.result);
    });

    let action = DashboardAction::FlipResource(FlipResourceInput {
        resource_id: "waf-1".to_string(),
        state: ResourceState::Enabled,
    });
    println!("-> {}", action.summary());
    dispatcher.dispatch(&action).await;
    println!(
        "  panel snapshot: {}",
        store.get_component_state(PANEL).to_json()
    );
    watch.unsubscribe();

    let update = DashboardAction::UpdateConfig(UpdateConfigInput {
        config_path: "rules.rateLimit".to_string(),
        value: json!(200),
    });
    println!("-> {}", update.summary());
    dispatcher.dispatch(&update).await;

    // Both run at once; whichever resolves last owns get-analytics_result.
    println!("-> get-analytics 24h and 7d in parallel");
    let day = DashboardAction::GetAnalytics(GetAnalyticsInput::default());
    let week = DashboardAction::GetAnalytics(GetAnalyticsInput {
        timeframe: "7d".to_string(),
    });
    let (a, b) = tokio::join!(dispatcher.dispatch(&day), dispatcher.dispatch(&week));
    println!(
        "  finished: {} / {}, stored timeframe {}",
        a.success,
        b.success,
        store
            .get("get-analytics_result")
            .and_then(|v| v.get("timeframe").cloned())
            .unwrap_or_default()
    );

    println!("-> launch-rockets (not served)");
    let missing = dispatcher.execute_action("launch-rockets", json!({})).await;
    println!(
        "  error: {}",
        missing.error_message().unwrap_or("<none>")
    );

    if !store.loading_keys().is_empty() {
        anyhow::bail!("actions still loading: {:?}", store.loading_keys());
    }
    Ok(())
}
