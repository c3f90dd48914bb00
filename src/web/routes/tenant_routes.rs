use axum::{
    Json, Router,
    extract::{Extension, State},
    routing::get,
};
use chrono::Utc;
use std::sync::Arc;

use crate::db::TenantDb;
use crate::db::entities::tenant;
use crate::db::services::{self, UpdateTenantRequest};
use crate::services::access::{Permission, require};
use crate::web::models::{AuthenticatedUser, TenantOverview};
use crate::web::{AppError, AppState};

pub fn create_tenant_router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(get_tenant).put(update_tenant))
}

async fn get_tenant(
    Extension(auth_user): Extension<AuthenticatedUser>,
    tdb: TenantDb,
) -> Result<Json<TenantOverview>, AppError> {
    require(&auth_user, Permission::TenantRead)?;
    Ok(Json(services::tenant_overview(&tdb, Utc::now()).await?))
}

async fn update_tenant(
    Extension(auth_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    tdb: TenantDb,
    Json(payload): Json<UpdateTenantRequest>,
) -> Result<Json<tenant::Model>, AppError> {
    require(&auth_user, Permission::TenantUpdate)?;
    let updated =
        services::update_tenant(&tdb, payload, &app_state.config.base_domain, Utc::now()).await?;
    Ok(Json(updated))
}
