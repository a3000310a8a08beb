//! Media-integrity catalog and scanning service: HTTP surface over the
//! Operation Engine, Catalog Store, and Write Serializer.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use custodian_core::engine::{Engine, EngineConfig};
use custodian_core::prober::SystemProbeTools;
use custodian_core::{write, Catalog};
use custodian_server::config::Config;
use custodian_server::rate_limit::RateLimiter;
use custodian_server::state::AppState;
use custodian_server::routes;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const WRITE_QUEUE_CAPACITY: usize = 256;
const WRITES_PER_MINUTE: u32 = 60;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    tracing::info!(?config, "starting custodian-server");

    let catalog = Catalog::open(&config.database_url).await?;
    let writer = write::spawn(catalog.clone(), WRITE_QUEUE_CAPACITY);
    let tools = Arc::new(SystemProbeTools);
    let engine = Engine::new(
        catalog.clone(),
        writer.clone(),
        tools,
        EngineConfig {
            scan_roots: config.scan_roots.clone(),
            max_workers: config.max_workers,
            max_files_per_scan: config.max_files_per_scan,
        },
    );

    engine.recover_on_startup().await?;

    let state = AppState { engine, catalog, config: Arc::new(config.clone()), started_at: Instant::now() };
    let limiter = RateLimiter::new(WRITES_PER_MINUTE);

    let app = routes::build(state.clone(), limiter)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await?;

    Ok(())
}

async fn shutdown_signal(state: AppState) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutting down, draining write queue");
    state.engine.writer().shutdown().await;
}
