//! `dash`: run the action gateway, fire single actions, or watch a demo session
//!
//! ```sh
//! # Serve the gateway on the default address
//! dash serve
//!
//! # Execute one action against a running gateway
//! dash exec get-analytics --data '{"timeframe":"7d"}'
//!
//! # Spin up a private gateway and run a scripted session
//! dash demo -v
//! ```

mod demo;
mod logging;

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use dash_dispatch::testing::ChangeRecorder;
use dash_dispatch::{
    Change, Dispatcher, DispatcherConfig, OutcomePolicy, Store, Topic, DEFAULT_BASE_PATH,
    DEFAULT_GATEWAY_URL,
};
use dash_gateway::{GatewayConfig, GatewayServer};
use serde_json::Value;

use crate::logging::{init_logging, LogConfig, LogFormat};

#[derive(Parser, Debug)]
#[command(name = "dash")]
#[command(about = "Reactive dashboard actions over an HTTP gateway")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace with event targets)
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log line layout
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn log_config(&self) -> LogConfig {
        LogConfig::from_verbosity(self.verbose)
            .with_format(self.log_format)
            .with_target(self.verbose >= 2)
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the action gateway until interrupted
    Serve(ServeArgs),
    /// Execute one action and print its outcome
    Exec(ExecArgs),
    /// Start a private gateway and run a scripted session against it
    Demo(demo::DemoArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:4321")]
    bind: SocketAddr,

    /// Path prefix for the action routes
    #[arg(long, default_value = DEFAULT_BASE_PATH)]
    base_path: String,

    /// Answer immediately instead of simulating backend latency
    #[arg(long)]
    no_latency: bool,

    /// Cloudflare API origin used by the cache rule actions
    #[arg(long)]
    cloudflare_api: Option<String>,
}

#[derive(Args, Debug)]
struct ExecArgs {
    /// Action name, e.g. `flip-resource`
    action: String,

    /// JSON payload; defaults to `{}`
    #[arg(long, short)]
    data: Option<String>,

    /// Gateway origin
    #[arg(long, default_value = DEFAULT_GATEWAY_URL)]
    gateway: String,

    /// Path prefix the gateway is mounted under
    #[arg(long, default_value = DEFAULT_BASE_PATH)]
    base_path: String,

    /// Request timeout in milliseconds (0 waits forever)
    #[arg(long, default_value_t = 30_000)]
    timeout_ms: u64,

    /// Delete the opposite outcome key when the action completes
    #[arg(long)]
    clear_stale: bool,
}

impl ServeArgs {
    fn gateway_config(&self) -> GatewayConfig {
        let mut config = GatewayConfig {
            bind_addr: self.bind,
            base_path: self.base_path.clone(),
            simulate_latency: !self.no_latency,
            ..Default::default()
        };
        if let Some(api) = &self.cloudflare_api {
            config.cloudflare_api_base = api.clone();
        }
        config
    }
}

impl ExecArgs {
    fn dispatcher_config(&self) -> DispatcherConfig {
        let policy = if self.clear_stale {
            OutcomePolicy::ClearSibling
        } else {
            OutcomePolicy::KeepStale
        };
        DispatcherConfig::new(&self.gateway)
            .with_base_path(&self.base_path)
            .with_timeout((self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms)))
            .with_outcome_policy(policy)
    }

    fn payload(&self) -> anyhow::Result<Value> {
        match &self.data {
            None => Ok(Value::Object(Default::default())),
            Some(raw) => serde_json::from_str(raw).context("--data is not valid JSON"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_config())?;

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Exec(args) => exec(args).await,
        Command::Demo(args) => demo::run(args).await,
    }
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let server = GatewayServer::new(args.gateway_config()).context("building gateway")?;
    let running = server.spawn().await.context("starting gateway")?;
    tracing::info!(url = %running.url(), base_path = %running.base_path(), "Serving actions");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for ctrl-c")?;
    tracing::info!("Shutting down");
    running.shutdown().await?;
    Ok(())
}

async fn exec(args: ExecArgs) -> anyhow::Result<()> {
    let payload = args.payload()?;
    let store = Store::new();
    let dispatcher = Dispatcher::http(store.clone(), &args.dispatcher_config())
        .context("building HTTP transport")?;

    let topics: Vec<Topic> = ["_result", "_error", "_loading"]
        .iter()
        .map(|suffix| Topic::parse(&format!("{}{}", args.action, suffix)))
        .collect();
    let watchers: Vec<(Topic, ChangeRecorder)> = topics
        .into_iter()
        .map(|topic| (topic, ChangeRecorder::new()))
        .collect();
    let subscriptions: Vec<_> = watchers
        .iter()
        .map(|(topic, recorder)| store.subscribe(topic.clone(), recorder.callback()))
        .collect();

    let result = dispatcher.execute_action(&args.action, payload).await;
    subscriptions.iter().for_each(|sub| sub.unsubscribe());

    println!("{}", serde_json::to_string_pretty(&result)?);
    for (topic, recorder) in &watchers {
        for change in recorder.changes() {
            println!("  {} <- {}", topic, describe(&change));
        }
    }

    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

fn describe(change: &Change) -> String {
    match change {
        Change::Value(Some(value)) => value.to_string(),
        Change::Value(None) => "(deleted)".to_string(),
        Change::Loading(loading) => format!("loading={}", loading),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_args_map_onto_dispatcher_config() {
        let cli = Cli::parse_from([
            "dash",
            "exec",
            "get-analytics",
            "--gateway",
            "http://gw:9",
            "--base-path",
            "/app",
            "--timeout-ms",
            "0",
            "--clear-stale",
        ]);
        let Command::Exec(args) = cli.command else {
            panic!("expected exec");
        };
        let config = args.dispatcher_config();
        assert_eq!(config.actions_endpoint(), "http://gw:9/app/api/actions");
        assert_eq!(config.timeout(), None);
        assert_eq!(config.outcome_policy, OutcomePolicy::ClearSibling);
        assert_eq!(args.payload().unwrap(), serde_json::json!({}));
    }

    #[test]
    fn exec_rejects_bad_json() {
        let cli = Cli::parse_from(["dash", "exec", "flip-resource", "--data", "{nope"]);
        let Command::Exec(args) = cli.command else {
            panic!("expected exec");
        };
        assert!(args.payload().is_err());
    }

    #[test]
    fn serve_args_map_onto_gateway_config() {
        let cli = Cli::parse_from(["dash", "-v", "serve", "--bind", "0.0.0.0:8080", "--no-latency"]);
        assert_eq!(cli.verbose, 1);
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        let config = args.gateway_config();
        assert_eq!(config.bind_addr.port(), 8080);
        assert!(!config.simulate_latency);
        assert_eq!(config.base_path, DEFAULT_BASE_PATH);
    }

    #[test]
    fn log_config_follows_flags() {
        let cli = Cli::parse_from(["dash", "--log-format", "compact", "demo"]);
        let config = cli.log_config();
        assert_eq!(config.format, LogFormat::Compact);
        assert!(!config.with_target);

        let cli = Cli::parse_from(["dash", "-vv", "demo"]);
        let config = cli.log_config();
        assert_eq!(config.format, LogFormat::Pretty);
        assert!(config.with_target);
    }

    #[test]
    fn describe_changes() {
        assert_eq!(describe(&Change::Loading(true)), "loading=true");
        assert_eq!(describe(&Change::Value(None)), "(deleted)");
        assert_eq!(describe(&Change::Value(Some(serde_json::json!(1)))), "1");
    }
}
