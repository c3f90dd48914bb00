use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    routing::get,
};
use chrono::Utc;
use std::sync::Arc;

use crate::db::TenantDb;
use crate::db::entities::bot;
use crate::db::services::{self, BotInput};
use crate::services::access::{Permission, require};
use crate::web::models::AuthenticatedUser;
use crate::web::{AppError, AppState};

pub fn create_bot_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_bots).post(create_bot))
        .route("/{id}", get(get_bot).put(update_bot).delete(delete_bot))
}

async fn list_bots(
    Extension(auth_user): Extension<AuthenticatedUser>,
    tdb: TenantDb,
) -> Result<Json<Vec<bot::Model>>, AppError> {
    require(&auth_user, Permission::BotsRead)?;
    Ok(Json(services::list_bots(&tdb).await?))
}

async fn get_bot(
    Extension(auth_user): Extension<AuthenticatedUser>,
    tdb: TenantDb,
    Path(id): Path<i32>,
) -> Result<Json<bot::Model>, AppError> {
    require(&auth_user, Permission::BotsRead)?;
    Ok(Json(services::get_bot(&tdb, id).await?))
}

async fn create_bot(
    Extension(auth_user): Extension<AuthenticatedUser>,
    tdb: TenantDb,
    Json(payload): Json<BotInput>,
) -> Result<(StatusCode, Json<bot::Model>), AppError> {
    require(&auth_user, Permission::BotsWrite)?;
    let created = services::create_bot(&tdb, payload, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_bot(
    Extension(auth_user): Extension<AuthenticatedUser>,
    tdb: TenantDb,
    Path(id): Path<i32>,
    Json(payload): Json<BotInput>,
) -> Result<Json<bot::Model>, AppError> {
    require(&auth_user, Permission::BotsWrite)?;
    Ok(Json(services::update_bot(&tdb, id, payload, Utc::now()).await?))
}

async fn delete_bot(
    Extension(auth_user): Extension<AuthenticatedUser>,
    tdb: TenantDb,
    Path(id): Path<i32>,
) -> Result<StatusCode, AppError> {
    require(&auth_user, Permission::BotsDelete)?;
    services::delete_bot(&tdb, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
