//! Relay service - router assembly, server loop and background sweeps.

use crate::domain::config::RelayConfig;
use crate::domain::error::ServiceError;
use crate::http::handlers::{self, AppState};
use crate::middleware::{create_cors_layer, TracingLayer};
use crate::relay::RelayCore;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{debug, info};

/// Relay service state
pub struct RelayService {
    config: Arc<RelayConfig>,
    core: Arc<RelayCore>,
    shutdown_tx: watch::Sender<bool>,
}

impl RelayService {
    /// Create a new relay service
    pub fn new(config: RelayConfig) -> Result<Self, ServiceError> {
        config
            .validate()
            .map_err(|e| ServiceError::Config(e.to_string()))?;

        let core = Arc::new(RelayCore::new(&config));
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config: Arc::new(config),
            core,
            shutdown_tx,
        })
    }

    /// Shared relay core
    pub fn core(&self) -> Arc<RelayCore> {
        Arc::clone(&self.core)
    }

    /// Bind the configured address and serve until shutdown
    pub async fn start(&self) -> Result<(), ServiceError> {
        let addr = self.config.http_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServiceError::Bind(format!("{}: {}", addr, e)))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServiceError> {
        let addr = listener.local_addr()?;
        info!(
            addr = %addr,
            policy = ?self.core.policy(),
            shift = self.config.cipher.shift,
            rotate_digits = self.config.cipher.rotate_digits,
            "Starting relay server"
        );

        tokio::spawn(cleanup_task(
            Arc::clone(&self.core),
            self.config.pending.cleanup_interval,
            self.shutdown_tx.subscribe(),
        ));

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                while !*shutdown_rx.borrow_and_update() {
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
                info!("Received shutdown signal");
            })
            .await?;

        info!("Relay server stopped");
        Ok(())
    }

    /// Trigger graceful shutdown
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Build the HTTP router
    pub fn router(&self) -> Router {
        build_router(AppState {
            core: Arc::clone(&self.core),
            config: Arc::clone(&self.config),
        })
    }
}

/// Assemble routes and middleware around `state`
pub fn build_router(state: AppState) -> Router {
    let cors = create_cors_layer(&state.config.cors);
    let body_limit = RequestBodyLimitLayer::new(state.config.limits.max_request_size);

    Router::new()
        .route("/", get(handlers::index))
        .route("/send_data", post(handlers::send_data))
        .route(
            "/set_response",
            get(handlers::set_response_form).post(handlers::set_response),
        )
        .route("/pending/:pending_id", get(handlers::await_pending))
        .route("/admin/pending", get(handlers::pending_stats))
        .route("/health", get(handlers::health_check))
        // each layer wraps the previous: cors → tracing → body limit → handler
        .layer(body_limit)
        .layer(TracingLayer::new())
        .layer(cors)
        .with_state(state)
}

/// Background task expiring stale pending requests and idle sessions
pub async fn cleanup_task(core: Arc<RelayCore>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut cleanup_interval = tokio::time::interval(interval);
    cleanup_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cleanup_interval.tick() => {
                let (pending, sessions) = core.sweep();
                if pending > 0 || sessions > 0 {
                    debug!(pending = pending, sessions = sessions, "Swept expired relay state");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}
