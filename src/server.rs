//! HTTP transport for the tool registry.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check with version and queue depth |
//! | `GET`/`POST` | `/tools/list` | Registered tools with schemas |
//! | `POST` | `/tools/{name}` | Call a tool; the body is its arguments |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "outside_workspace", "message": "path outside workspace root: /etc" } }
//! ```
//!
//! `bad_request` and `outside_workspace` map to 400, `not_found` to 404,
//! anything else is a 500 `tool_error`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::error::as_tool_error;
use crate::mcp::error_body;
use crate::traits::{ToolContext, ToolRegistry};

#[derive(Clone)]
struct AppState {
    ctx: ToolContext,
    tools: Arc<ToolRegistry>,
}

pub fn router(ctx: ToolContext, tools: Arc<ToolRegistry>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/tools/list", get(handle_list_tools).post(handle_list_tools))
        .route("/tools/{name}", post(handle_tool_call))
        .layer(cors)
        .with_state(AppState { ctx, tools })
}

/// Bind `bind` and serve until the process is terminated.
pub async fn run_server(bind: &str, ctx: ToolContext, tools: Arc<ToolRegistry>) -> anyhow::Result<()> {
    let app = router(ctx, tools);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(bind = %bind, "HTTP server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match as_tool_error(&self.0).map(|e| e.code()) {
            Some("not_found") => StatusCode::NOT_FOUND,
            Some(_) => StatusCode::BAD_REQUEST,
            None => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(error_body(&self.0))).into_response()
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    roots: usize,
    pending_jobs: usize,
    active_jobs: usize,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let engine = state.ctx.engine();
    let snapshot = engine.scheduler.snapshot();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        roots: engine.workspace.roots().len(),
        pending_jobs: snapshot.pending.len(),
        active_jobs: snapshot.active,
    })
}

#[derive(Serialize)]
struct ToolInfo {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

async fn handle_list_tools(State(state): State<AppState>) -> Json<serde_json::Value> {
    let tools: Vec<ToolInfo> = state
        .tools
        .tools()
        .iter()
        .map(|t| ToolInfo {
            name: t.name().to_string(),
            description: t.description().to_string(),
            parameters: t.parameters_schema(),
        })
        .collect();
    Json(serde_json::json!({ "tools": tools }))
}

/// An empty body is treated as `{}`.
async fn handle_tool_call(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: axum::body::Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    let params = if body.iter().all(u8::is_ascii_whitespace) {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            AppError(crate::error::ToolError::invalid("body", format!("invalid JSON: {}", e)).into())
        })?
    };
    let result = state
        .tools
        .call(&name, params, &state.ctx)
        .await
        .map_err(AppError)?;
    Ok(Json(serde_json::json!({ "result": result })))
}
