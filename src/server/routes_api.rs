use crate::conversion::RunReport;
use crate::server::error::AppError;
use crate::server::AppContext;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use batchforge_common::{Error, RunId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub fn api_routes() -> Router<AppContext> {
    Router::new()
        .route("/health", get(health))
        .route("/conversion-run", post(trigger_conversion_run))
        .route("/runs", get(list_runs))
        .route("/runs/:id", get(get_run))
        .route("/tools", get(get_tools))
}

async fn health(State(ctx): State<AppContext>) -> impl IntoResponse {
    let run_config = ctx.config.run_config();
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "running": ctx.coordinator.is_running(&run_config),
    }))
}

/// Optional body of `POST /conversion-run`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConversionRunRequest {
    pub batch_size: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ConversionRunResponse {
    pub message: String,
    pub report: RunReport,
}

async fn trigger_conversion_run(
    State(ctx): State<AppContext>,
    body: Bytes,
) -> Result<Json<ConversionRunResponse>, AppError> {
    let request: ConversionRunRequest = if body.iter().all(u8::is_ascii_whitespace) {
        ConversionRunRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| Error::validation(format!("Invalid request body: {e}")))?
    };

    let mut run_config = ctx.config.run_config();
    if let Some(batch_size) = request.batch_size {
        run_config.batch_size = batch_size;
    }

    tracing::info!(
        input = %run_config.input_dir.display(),
        output = %run_config.output_dir.display(),
        batch_size = run_config.batch_size,
        "Conversion run requested"
    );

    // Detached from the request: a dropped connection must not cancel the run.
    let coordinator = Arc::clone(&ctx.coordinator);
    let state = Arc::clone(&ctx.state);
    let run = tokio::spawn(async move {
        let report = coordinator.invoke(&run_config).await?;
        state.record_run(report.clone());
        Ok::<_, Error>(report)
    });
    let report = run
        .await
        .map_err(|e| Error::unexpected(format!("conversion run task failed: {e}")))??;

    match report.halt_error() {
        Some(err) => Err(AppError::new(err).with_report(report)),
        None => Ok(Json(ConversionRunResponse {
            message: report.message(),
            report,
        })),
    }
}

#[derive(Deserialize)]
struct ListRunsQuery {
    limit: Option<usize>,
}

async fn list_runs(
    State(ctx): State<AppContext>,
    Query(params): Query<ListRunsQuery>,
) -> impl IntoResponse {
    let limit = params.limit.unwrap_or(20);
    Json(ctx.state.recent_runs(limit))
}

async fn get_run(
    State(ctx): State<AppContext>,
    Path(id): Path<RunId>,
) -> Result<Json<RunReport>, StatusCode> {
    ctx.state.get_run(id).map(Json).ok_or(StatusCode::NOT_FOUND)
}

#[derive(Serialize)]
struct ToolStatusResponse {
    name: String,
    available: bool,
    version: Option<String>,
    path: Option<String>,
}

async fn get_tools(State(ctx): State<AppContext>) -> impl IntoResponse {
    let tools = ctx.tools.clone();
    let infos = tokio::task::spawn_blocking(move || tools.check_all())
        .await
        .unwrap_or_default();
    let response: Vec<ToolStatusResponse> = infos
        .into_iter()
        .map(|t| ToolStatusResponse {
            name: t.name,
            available: t.available,
            version: t.version,
            path: t.path.map(|p| p.display().to_string()),
        })
        .collect();
    Json(response)
}
