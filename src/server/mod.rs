pub mod api;
pub mod dtos;
pub mod error;
pub mod extractors;
pub mod services;
pub mod utils;

use std::{net::SocketAddr, sync::Arc, time::Instant};

use anyhow::Context;
use axum::{
    Extension, Router,
    http::{HeaderValue, Method},
    routing::get,
};
use once_cell::sync::Lazy;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::config::AppConfig;
use api::{
    channels_controller::ChannelsController, health_controller::health_endpoint,
    proxy_controller::ProxyController,
};

pub use services::EdgeServices;

static START_TIME: Lazy<Instant> = Lazy::new(Instant::now);

pub fn get_uptime_seconds() -> u64 {
    START_TIME.elapsed().as_secs()
}

pub fn get_app_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub struct EdgeApplicationServer;

impl EdgeApplicationServer {
    /// all routes with services attached, tests drive this directly
    pub fn router(services: EdgeServices) -> Router {
        let api = Router::new()
            .route("/health", get(health_endpoint))
            .merge(ChannelsController::app())
            .layer(Self::api_cors(&services.config.cors_origin));

        Router::new()
            .merge(ProxyController::app(&services.config.proxy_route()))
            .merge(api)
            .layer(Extension(services))
    }

    pub async fn serve(config: Arc<AppConfig>, services: EdgeServices) -> anyhow::Result<()> {
        Lazy::force(&START_TIME);

        let app = Self::router(services).layer(TraceLayer::new_for_http());

        let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;

        info!("listening on {}, proxy at {}", addr, config.proxy_route());

        axum::serve(listener, app)
            .with_graceful_shutdown(Self::shutdown_signal())
            .await
            .context("Server error")?;

        info!("server shut down");
        Ok(())
    }

    // the proxy route sets its own wide open cors headers, this is only for the json api
    fn api_cors(cors_origin: &str) -> CorsLayer {
        let cors = CorsLayer::new().allow_methods([Method::GET, Method::OPTIONS]);

        if cors_origin.trim() == "*" {
            return cors.allow_origin(Any);
        }

        let origins: Vec<HeaderValue> = cors_origin
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .filter_map(|origin| origin.parse().ok())
            .collect();

        cors.allow_origin(AllowOrigin::list(origins))
    }

    async fn shutdown_signal() {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            // never resolve, the server keeps running until killed
            std::future::pending::<()>().await;
        }
        info!("shutdown signal received");
    }
}
