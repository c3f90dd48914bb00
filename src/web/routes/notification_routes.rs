use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    routing::{delete, get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::TenantDb;
use crate::db::entities::notification;
use crate::db::services;
use crate::web::models::AuthenticatedUser;
use crate::web::{AppError, AppState};

pub fn create_notification_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_notifications))
        .route("/unread-count", get(unread_count))
        .route("/read-all", post(mark_all_read))
        .route("/{id}/read", post(mark_read))
        .route("/{id}", delete(delete_notification))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub unread: bool,
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: u64,
}

async fn list_notifications(
    Extension(auth_user): Extension<AuthenticatedUser>,
    tdb: TenantDb,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<notification::Model>>, AppError> {
    Ok(Json(services::list_notifications(&tdb, auth_user.id, query.unread).await?))
}

async fn unread_count(
    Extension(auth_user): Extension<AuthenticatedUser>,
    tdb: TenantDb,
) -> Result<Json<CountResponse>, AppError> {
    let count = services::count_unread_notifications(&tdb, auth_user.id).await?;
    Ok(Json(CountResponse { count }))
}

async fn mark_read(
    Extension(auth_user): Extension<AuthenticatedUser>,
    tdb: TenantDb,
    Path(id): Path<i32>,
) -> Result<Json<notification::Model>, AppError> {
    Ok(Json(services::mark_notification_read(&tdb, auth_user.id, id, Utc::now()).await?))
}

async fn mark_all_read(
    Extension(auth_user): Extension<AuthenticatedUser>,
    tdb: TenantDb,
) -> Result<Json<CountResponse>, AppError> {
    let count = services::mark_all_notifications_read(&tdb, auth_user.id, Utc::now()).await?;
    Ok(Json(CountResponse { count }))
}

async fn delete_notification(
    Extension(auth_user): Extension<AuthenticatedUser>,
    tdb: TenantDb,
    Path(id): Path<i32>,
) -> Result<StatusCode, AppError> {
    services::delete_notification(&tdb, auth_user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
