//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router for the three transport routes
//! - Wire up middleware (tracing, request ID, no-cache headers, send limits)
//! - Apply configuration reloads
//! - Close every session on graceful shutdown

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue},
    routing::post,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::AppConfig;
use crate::http::handlers;
use crate::session::{SessionHandler, SessionRegistry};

const NO_CACHE: &str = "no-store, no-cache, no-transform, must-revalidate, max-age=0";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: SessionRegistry,
    pub config: Arc<ArcSwap<AppConfig>>,
}

/// HTTP server exposing the XHR transports.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server; `handler` receives every session's messages.
    pub fn new(config: AppConfig, handler: Arc<dyn SessionHandler>) -> Self {
        let state = AppState {
            registry: SessionRegistry::new(handler),
            config: Arc::new(ArcSwap::from_pointee(config.clone())),
        };
        let router = Self::build_router(&config, state.clone());
        Self { router, state }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &AppConfig, state: AppState) -> Router {
        let send = post(handlers::xhr_send).layer(
            ServiceBuilder::new()
                .layer(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
                .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.send_secs))),
        );

        let transports = Router::new()
            .route("/{server}/{session}/xhr", post(handlers::xhr_poll))
            .route("/{server}/{session}/xhr_streaming", post(handlers::xhr_streaming))
            .route("/{server}/{session}/xhr_send", send);

        Router::new()
            .nest(&config.sockjs.prefix, transports)
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(SetResponseHeaderLayer::overriding(
                        header::CACHE_CONTROL,
                        HeaderValue::from_static(NO_CACHE),
                    )),
            )
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.state.registry
    }

    /// Run the server until `shutdown` fires, then close all sessions and drain.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<AppConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        let prefix = self.state.config.load().sockjs.prefix.clone();
        tracing::info!(address = %addr, prefix = %prefix, "HTTP server starting");

        let live_config = Arc::clone(&self.state.config);
        tokio::spawn(async move {
            while let Some(new_config) = config_updates.recv().await {
                apply_reload(&live_config, new_config);
            }
        });

        let registry = self.state.registry.clone();
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                // A dropped sender counts as a shutdown request too.
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
                registry.shutdown();
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Swap in a reloaded configuration. Listener-level settings only take effect
/// after a restart.
fn apply_reload(live: &ArcSwap<AppConfig>, new_config: AppConfig) {
    let current = live.load();
    if current.listener.bind_address != new_config.listener.bind_address {
        tracing::warn!(
            current = %current.listener.bind_address,
            requested = %new_config.listener.bind_address,
            "Bind address change requires a restart"
        );
    }
    if current.sockjs.prefix != new_config.sockjs.prefix
        || current.security.max_body_size != new_config.security.max_body_size
        || current.timeouts.send_secs != new_config.timeouts.send_secs
    {
        tracing::warn!("Route prefix and send limits change only after a restart");
    }

    live.store(Arc::new(new_config));
    tracing::info!("Configuration reloaded; applies to new sessions and exchanges");
}
