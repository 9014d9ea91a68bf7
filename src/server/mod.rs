use crate::config::Config;
use crate::conversion::RunCoordinator;
use crate::state::AppState;
use anyhow::{Context, Result};
use axum::{
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use batchforge_av::{build_transcoder, ToolRegistry};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod error;
pub mod routes_api;
pub mod routes_sse;

pub use error::AppError;

/// Shared application context
#[derive(Clone)]
pub struct AppContext {
    pub state: Arc<AppState>,
    pub config: Arc<Config>,
    /// Runs conversions; one per process so the run lock is shared
    pub coordinator: Arc<RunCoordinator>,
    /// Engine tools discovered at start-up
    pub tools: Arc<ToolRegistry>,
}

impl AppContext {
    /// Discover tools and build the coordinator for the configured engine.
    pub fn from_config(config: Config, state: Arc<AppState>) -> Result<Self> {
        let tools = ToolRegistry::discover(&config.tools);
        let transcoder = build_transcoder(
            config.conversion.engine,
            &tools,
            &config.conversion.engine_settings(),
        )
        .with_context(|| {
            format!(
                "Engine '{}' is not available (run `batchforge check-tools`)",
                config.conversion.engine
            )
        })?;

        let coordinator = RunCoordinator::new(transcoder)
            .with_events(state.event_sender())
            .with_job_timeout(config.conversion.job_timeout());

        Ok(Self {
            state,
            config: Arc::new(config),
            coordinator: Arc::new(coordinator),
            tools: Arc::new(tools),
        })
    }
}

/// Create the Axum router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        // Health check
        .route("/health", get(health_check))
        .nest("/api", api_routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

fn api_routes() -> Router<AppContext> {
    routes_api::api_routes().merge(routes_sse::sse_routes())
}

async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// Start the HTTP server
pub async fn start_server(config: Config, state: Arc<AppState>) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let ctx = AppContext::from_config(config, state)?;
    let run_config = ctx.config.run_config();
    tracing::info!(
        "Conversion runs: {:?} -> {:?} ({} -> {}, batch size {}, engine {})",
        run_config.input_dir,
        run_config.output_dir,
        run_config.source_extension,
        run_config.target_extension,
        run_config.batch_size,
        ctx.config.conversion.engine,
    );

    let app = create_router(ctx);

    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

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
