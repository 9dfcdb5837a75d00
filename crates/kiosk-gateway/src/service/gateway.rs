//! Gateway service - assembles routers and runs the listeners.
//!
//! Provides the REST + push server and the localhost admin server.

use crate::domain::config::{GatewayConfig, WebSocketConfig};
use crate::domain::error::GatewayError;
use crate::middleware::{
    create_cors_layer, GatewayMetrics, MetricsLayer, TimeoutLayer, TracingLayer,
};
use crate::ports::outbound::{BottleClassifier, UserStore, VoucherNotifier};
use crate::rest;
use crate::service::kiosk::KioskService;
use crate::ws::ConnectionRegistry;
use axum::{routing::get, Json, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tracing::{error, info};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub kiosk: Arc<KioskService>,
    pub metrics: Arc<GatewayMetrics>,
    pub ws_config: WebSocketConfig,
    /// Flips to `true` once shutdown starts; push sessions watch it
    pub shutdown: watch::Receiver<bool>,
}

/// Kiosk gateway service
pub struct GatewayService {
    config: GatewayConfig,
    kiosk: Arc<KioskService>,
    registry: Arc<ConnectionRegistry>,
    metrics: Arc<GatewayMetrics>,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl GatewayService {
    /// Create a new gateway service around the given collaborators
    pub fn new(
        config: GatewayConfig,
        store: Arc<dyn UserStore>,
        classifier: Arc<dyn BottleClassifier>,
        notifier: Arc<dyn VoucherNotifier>,
    ) -> Result<Self, GatewayError> {
        config
            .validate()
            .map_err(|e| GatewayError::Config(e.to_string()))?;

        let registry = Arc::new(ConnectionRegistry::new());
        let metrics = Arc::new(GatewayMetrics::new());
        let kiosk = Arc::new(KioskService::new(
            store,
            classifier,
            notifier,
            Arc::clone(&registry),
            Arc::clone(&metrics),
        ));
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            kiosk,
            registry,
            metrics,
            shutdown_tx: Arc::new(shutdown_tx),
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn kiosk(&self) -> Arc<KioskService> {
        Arc::clone(&self.kiosk)
    }

    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn metrics(&self) -> Arc<GatewayMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Handle that can stop a running gateway from another task
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(Arc::clone(&self.shutdown_tx))
    }

    /// Trigger graceful shutdown
    pub fn shutdown(&self) {
        self.shutdown_handle().trigger();
    }

    /// Build the REST + push router
    pub fn http_router(&self) -> Router {
        let state = AppState {
            kiosk: Arc::clone(&self.kiosk),
            metrics: Arc::clone(&self.metrics),
            ws_config: self.config.websocket.clone(),
            shutdown: self.shutdown_tx.subscribe(),
        };

        let middleware = ServiceBuilder::new()
            .layer(create_cors_layer(&self.config.cors))
            .layer(TracingLayer::new())
            .layer(MetricsLayer::new(Arc::clone(&self.metrics)))
            .layer(TimeoutLayer::new(self.config.timeouts.clone()));

        rest::routes(&self.config.websocket.path)
            .layer(middleware)
            .with_state(state)
    }

    /// Build Admin router
    pub fn admin_router(&self) -> Router {
        let metrics = Arc::clone(&self.metrics);
        let registry = Arc::clone(&self.registry);

        Router::new()
            .route("/health", get(health_check))
            .route(
                "/metrics",
                get(move || {
                    let metrics = Arc::clone(&metrics);
                    async move { Json(metrics.to_json()) }
                }),
            )
            .route(
                "/registry",
                get(move || {
                    let registry = Arc::clone(&registry);
                    async move { Json(registry.stats()) }
                }),
            )
    }

    /// Bind the configured listeners and serve until shutdown
    pub async fn run(&self) -> Result<(), GatewayError> {
        let http = if self.config.http.enabled {
            Some(bind(self.config.http_addr()).await?)
        } else {
            None
        };
        let admin = if self.config.admin.enabled {
            Some(bind(self.config.admin_addr()).await?)
        } else {
            None
        };
        self.serve(http, admin).await
    }

    /// Serve on already-bound listeners until shutdown
    pub async fn serve(
        &self,
        http: Option<TcpListener>,
        admin: Option<TcpListener>,
    ) -> Result<(), GatewayError> {
        info!("Starting kiosk gateway...");
        let mut servers: Vec<(&'static str, JoinHandle<std::io::Result<()>>)> = Vec::new();

        if let Some(listener) = http {
            log_listener("REST", &listener);
            servers.push(("REST", self.spawn_server(listener, self.http_router())));
        }
        if let Some(listener) = admin {
            log_listener("Admin", &listener);
            servers.push(("Admin", self.spawn_server(listener, self.admin_router())));
        }

        info!("Kiosk gateway started successfully");

        let mut outcome = Ok(());
        for (name, handle) in servers {
            let result = match handle.await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(GatewayError::Serve(format!("{} server: {}", name, e))),
                Err(e) => Err(GatewayError::Serve(format!("{} server task: {}", name, e))),
            };
            if let Err(e) = result {
                error!(error = %e, "Server stopped with error");
                // Take the other listener down with it
                self.shutdown();
                outcome = Err(e);
            }
        }

        info!(
            remaining_connections = self.registry.connection_count(),
            "Kiosk gateway stopped"
        );
        outcome
    }

    fn spawn_server(
        &self,
        listener: TcpListener,
        router: Router,
    ) -> JoinHandle<std::io::Result<()>> {
        let mut stop = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = stop.wait_for(|stopping| *stopping).await;
                })
                .await
        })
    }
}

/// Cloneable trigger for [`GatewayService::shutdown`]
#[derive(Clone)]
pub struct ShutdownHandle(Arc<watch::Sender<bool>>);

impl ShutdownHandle {
    pub fn trigger(&self) {
        if !self.0.send_replace(true) {
            info!("Shutdown requested");
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.0.borrow()
    }
}

async fn bind(addr: std::net::SocketAddr) -> Result<TcpListener, GatewayError> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| GatewayError::Bind(format!("{}: {}", addr, e)))
}

fn log_listener(name: &str, listener: &TcpListener) {
    match listener.local_addr() {
        Ok(addr) => info!(addr = %addr, "Starting {} server", name),
        Err(_) => info!("Starting {} server", name),
    }
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryUserStore, LogMailer, OpenAiClassifier};
    use crate::domain::config::ClassifierConfig;
    use axum::{body::Body, http::Request, http::StatusCode};
    use tower::ServiceExt;

    fn gateway(config: GatewayConfig) -> Result<GatewayService, GatewayError> {
        GatewayService::new(
            config,
            Arc::new(InMemoryUserStore::new()),
            Arc::new(OpenAiClassifier::new(ClassifierConfig::default())?),
            Arc::new(LogMailer),
        )
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = GatewayConfig::default();
        config.websocket.outbound_buffer = 0;
        assert!(matches!(gateway(config), Err(GatewayError::Config(_))));
    }

    #[tokio::test]
    async fn test_admin_endpoints() {
        let service = gateway(GatewayConfig::default()).unwrap();
        let admin = service.admin_router();

        let health = admin
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);

        let registry = admin
            .oneshot(Request::builder().uri("/registry").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(registry.into_body(), 4096).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["identities"], 0);
        assert_eq!(body["connections"], 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_serving() {
        let service = Arc::new(gateway(GatewayConfig::default()).unwrap());
        let http = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let running = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.serve(Some(http), None).await })
        };

        let handle = service.shutdown_handle();
        handle.trigger();
        assert!(handle.is_triggered());

        let result = tokio::time::timeout(std::time::Duration::from_secs(5), running)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
