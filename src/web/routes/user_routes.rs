//! Self-service account endpoints under `/api/user`.

use axum::{
    Json, Router,
    extract::{Extension, State},
    http::StatusCode,
    routing::put,
};
use chrono::Utc;
use std::sync::Arc;

use crate::db::TenantDb;
use crate::db::services::{self, ChangePasswordRequest, UpdateProfileRequest};
use crate::web::models::{AuthenticatedUser, UserResponse};
use crate::web::{AppError, AppState};

pub fn create_user_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/profile", put(update_profile))
        .route("/password", put(update_password))
}

async fn update_profile(
    Extension(auth_user): Extension<AuthenticatedUser>,
    tdb: TenantDb,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<UserResponse>, AppError> {
    let updated = services::update_profile(&tdb, auth_user.id, payload, Utc::now()).await?;
    Ok(Json(updated.into()))
}

async fn update_password(
    Extension(auth_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    tdb: TenantDb,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<StatusCode, AppError> {
    services::change_password(&tdb, auth_user.id, payload, app_state.config.bcrypt_cost, Utc::now()).await?;
    Ok(StatusCode::NO_CONTENT)
}
