//! Unauthenticated endpoints: signup helpers and everything an embedded widget calls.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, header},
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use std::sync::Arc;
use tracing::error;

use crate::db::services::{
    self, ChatDeps, ChatRequest, ChatResponse, PublicWidgetConfig, SubdomainAvailability,
};
use crate::services::embed::render_embed_script;
use crate::web::{AppError, AppState};

pub fn create_public_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/public/subdomains/{subdomain}", get(check_subdomain))
        .route("/api/public/widgets/{key}", get(widget_config))
        .route("/api/public/widgets/{key}/chat", post(chat))
        .route("/widget/{key}/embed.js", get(embed_script))
}

async fn check_subdomain(
    State(app_state): State<Arc<AppState>>,
    Path(subdomain): Path<String>,
) -> Result<Json<SubdomainAvailability>, AppError> {
    Ok(Json(services::subdomain_availability(&app_state.db_pool, &subdomain).await?))
}

async fn widget_config(
    State(app_state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<PublicWidgetConfig>, AppError> {
    Ok(Json(services::public_widget_config(&app_state.db_pool, &key).await?))
}

async fn chat(
    State(app_state): State<Arc<AppState>>,
    Path(key): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let origin = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok());
    let deps = ChatDeps {
        db: &app_state.db_pool,
        limiter: &app_state.chat_limiter,
        generator: app_state.reply_generator.as_ref(),
    };
    let response = services::handle_chat_message(deps, &key, origin, payload, Utc::now()).await?;
    Ok(Json(response))
}

async fn embed_script(
    State(app_state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let widget = services::find_active_widget_by_key(&app_state.db_pool, &key).await?;
    let script = render_embed_script(&widget, &app_state.config.public_url).map_err(|e| {
        error!(widget_id = widget.id, error = %e, "Failed to render embed script.");
        AppError::InternalServerError(format!("Embed template error: {e}"))
    })?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/javascript; charset=utf-8"),
            (header::CACHE_CONTROL, "public, max-age=300"),
        ],
        script,
    ))
}
