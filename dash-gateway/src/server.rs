use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::GatewayConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::HandlerRegistry;
use crate::router::build_router;

/// Action gateway server
pub struct GatewayServer {
    config: GatewayConfig,
    registry: HandlerRegistry,
}

impl GatewayServer {
    /// Server with the dashboard handler registry
    pub fn new(config: GatewayConfig) -> ServerResult<Self> {
        let registry = HandlerRegistry::dashboard(&config)?;
        Ok(Self::with_registry(config, registry))
    }

    pub fn with_registry(config: GatewayConfig, registry: HandlerRegistry) -> Self {
        Self { config, registry }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.registry.clone(), &self.config.base_path)
    }

    /// Serve on the configured address until the process ends
    pub async fn serve(self) -> ServerResult<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(
            "Gateway listening on http://{}{}",
            listener.local_addr()?,
            self.config.normalized_base_path()
        );
        axum::serve(listener, self.router())
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }

    /// Bind and serve in a background task
    ///
    /// Binding to port 0 picks a free port; see [`RunningGateway::local_addr`].
    pub async fn spawn(self) -> ServerResult<RunningGateway> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        let addr = listener.local_addr()?;
        let app = self.router();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });
        tracing::info!("Gateway listening on http://{}", addr);

        Ok(RunningGateway {
            addr,
            base_path: self.config.normalized_base_path(),
            shutdown: shutdown_tx,
            task,
        })
    }
}

/// Handle to a gateway started with [`GatewayServer::spawn`]
pub struct RunningGateway {
    addr: SocketAddr,
    base_path: String,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<std::io::Result<()>>,
}

impl RunningGateway {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Origin to point an HTTP transport at, e.g. `http://127.0.0.1:54321`
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Stop accepting connections and wait for the server task
    pub async fn shutdown(self) -> ServerResult<()> {
        let _ = self.shutdown.send(());
        self.task
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))??;
        Ok(())
    }
}
