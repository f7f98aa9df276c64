use crate::cache::VariantCache;
use crate::config::Config;
use crate::origin::OriginClient;
use crate::transform::ImageEngine;
use anyhow::{Context, Result};
use axum::{
    http::{header, Method},
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod routes_images;

/// Shared application context
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub cache: Arc<VariantCache>,
}

/// Create the Axum router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers([header::ACCEPT]);

    let prefix = ctx.config.server.route_prefix.trim_end_matches('/');

    Router::new()
        // Health check
        .route("/ping", get(routes_images::ping))
        // Diagnostic pipeline (always recomputes, reports everything)
        .route("/tmp/*path", get(routes_images::diagnose))
        // Primary pipeline
        .route(&format!("{prefix}/*path"), get(routes_images::serve_variant))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Build the application context from config.
pub fn build_context(config: Config) -> Result<AppContext> {
    std::fs::create_dir_all(&config.storage.source_dir).with_context(|| {
        format!(
            "Failed to create source directory: {:?}",
            config.storage.source_dir
        )
    })?;
    std::fs::create_dir_all(&config.storage.cache_dir).with_context(|| {
        format!(
            "Failed to create cache directory: {:?}",
            config.storage.cache_dir
        )
    })?;

    let origin = OriginClient::new(&config.origin)?;
    let engine = Arc::new(ImageEngine::new(
        config.transform.webp.clone(),
        config.transform.jpeg.clone(),
    ));
    let cache = Arc::new(VariantCache::new(
        config.storage.source_dir.clone(),
        config.storage.cache_dir.clone(),
        origin,
        engine,
        config.transform.fit,
    ));

    Ok(AppContext {
        config: Arc::new(config),
        cache,
    })
}

/// Start the HTTP server
pub async fn start_server(config: Config) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let ctx = build_context(config)?;
    let app = create_router(ctx);

    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
