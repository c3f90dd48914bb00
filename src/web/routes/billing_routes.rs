use axum::{
    Json, Router,
    body::Bytes,
    extract::{Extension, State},
    http::HeaderMap,
    routing::{get, post},
};
use chrono::Utc;
use std::sync::Arc;
use tracing::warn;

use crate::db::TenantDb;
use crate::db::entities::subscription;
use crate::db::services::{self, BillingEvent};
use crate::services::access::{Permission, require};
use crate::services::signature;
use crate::web::models::{AuthenticatedUser, BillingOverview};
use crate::web::{AppError, AppState};

pub const SIGNATURE_HEADER: &str = "x-signature";

pub fn create_billing_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(billing_overview))
        .route("/cancel", post(cancel_subscription))
}

/// The provider webhook authenticates with a body signature, not a user token.
pub fn create_webhook_router() -> Router<Arc<AppState>> {
    Router::new().route("/webhook", post(billing_webhook))
}

async fn billing_overview(
    Extension(auth_user): Extension<AuthenticatedUser>,
    tdb: TenantDb,
) -> Result<Json<BillingOverview>, AppError> {
    require(&auth_user, Permission::BillingRead)?;
    Ok(Json(services::billing_overview(&tdb, Utc::now()).await?))
}

async fn cancel_subscription(
    Extension(auth_user): Extension<AuthenticatedUser>,
    tdb: TenantDb,
) -> Result<Json<subscription::Model>, AppError> {
    require(&auth_user, Permission::BillingManage)?;
    Ok(Json(services::cancel_subscription(&tdb, Utc::now()).await?))
}

async fn billing_webhook(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<subscription::Model>, AppError> {
    let secret = app_state
        .config
        .billing_webhook_secret
        .as_deref()
        .ok_or_else(|| AppError::NotFound("Billing webhook is not configured.".to_string()))?;

    let provided = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !signature::verify(secret, &body, provided) {
        warn!("Rejected billing webhook with a bad signature.");
        return Err(AppError::Unauthorized("Invalid webhook signature.".to_string()));
    }

    let event: BillingEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::InvalidInput(format!("Malformed billing event: {e}")))?;
    let updated = services::apply_webhook_event(&app_state.db_pool, event, Utc::now()).await?;
    Ok(Json(updated))
}
