use axum::Router;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::GatewayConfig;
use crate::metrics::GatewayMetrics;
use crate::relay::Gateway;
use crate::sqlite_store::SqliteStore;
use crate::store::{MemoryStore, Store};
use crate::ws::AppState;

pub struct GatewayServer {
    config: GatewayConfig,
    gateway: Arc<Gateway>,
    metrics: Arc<GatewayMetrics>,
    shutdown_tx: watch::Sender<bool>,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig) -> anyhow::Result<Self> {
        config.validate()?;

        let store: Arc<dyn Store> = match &config.database_path {
            Some(path) => {
                info!("opening session database at {}", path.display());
                Arc::new(SqliteStore::new(path)?)
            }
            None => {
                info!("no database path configured, using in-memory store");
                Arc::new(MemoryStore::new())
            }
        };

        let metrics = Arc::new(GatewayMetrics::new()?);
        let gateway = Arc::new(Gateway::new(store, config.clone(), Arc::clone(&metrics)));
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            gateway,
            metrics,
            shutdown_tx,
        })
    }

    pub async fn start(&self) -> anyhow::Result<()> {
        let state = AppState {
            gateway: Arc::clone(&self.gateway),
            metrics: Arc::clone(&self.metrics),
            shutdown: self.shutdown_tx.subscribe(),
        };

        let app = Router::new()
            .route("/ws", axum::routing::get(crate::ws::ws_handler))
            .route("/health", axum::routing::get(crate::ws::get_health))
            .route("/metrics", axum::routing::get(crate::ws::get_metrics))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state);

        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        info!("screenlink-gateway listening on {}", self.config.bind_addr);

        // Once a shutdown trigger fires, flip the watch channel so every
        // websocket read loop closes its connection; long-lived sockets
        // would otherwise hold the graceful drain open forever.
        let shutdown_rx = self.shutdown_tx.subscribe();
        let shutdown_tx = self.shutdown_tx.clone();
        let graceful = async move {
            Self::shutdown_signal(shutdown_rx).await;
            let _ = shutdown_tx.send(true);
        };

        let serve = axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(graceful);

        let mut drain_rx = self.shutdown_tx.subscribe();
        let drain_timeout = self.config.shutdown_timeout();
        tokio::select! {
            res = serve => res?,
            _ = async {
                while drain_rx.changed().await.is_ok() {
                    if *drain_rx.borrow() {
                        break;
                    }
                }
                tokio::time::sleep(drain_timeout).await;
            } => {
                warn!("graceful drain exceeded {:?}, exiting", drain_timeout);
            }
        }

        Ok(())
    }

    async fn shutdown_signal(mut shutdown: watch::Receiver<bool>) {
        #[cfg(unix)]
        let mut sigterm = {
            use tokio::signal::unix::{signal, SignalKind};
            signal(SignalKind::terminate()).ok()
        };

        tokio::select! {
            _ = async {
                #[cfg(unix)]
                {
                    if let Some(ref mut sigterm) = sigterm {
                        sigterm.recv().await;
                    }
                }
                #[cfg(not(unix))]
                {
                    std::future::pending::<()>().await;
                }
            } => {
                info!("Received SIGTERM, starting graceful shutdown");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, starting graceful shutdown");
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("Shutdown requested");
                }
            }
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}
