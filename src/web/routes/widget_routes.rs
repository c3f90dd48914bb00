use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
};
use chrono::Utc;
use std::sync::Arc;

use crate::db::TenantDb;
use crate::db::entities::widget;
use crate::db::services::{self, WidgetInput};
use crate::services::access::{Permission, require};
use crate::web::models::AuthenticatedUser;
use crate::web::{AppError, AppState};

pub fn create_widget_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_widgets).post(create_widget))
        .route("/{id}", get(get_widget).put(update_widget).delete(delete_widget))
        .route("/{id}/rotate-key", post(rotate_key))
}

async fn list_widgets(
    Extension(auth_user): Extension<AuthenticatedUser>,
    tdb: TenantDb,
) -> Result<Json<Vec<widget::Model>>, AppError> {
    require(&auth_user, Permission::WidgetsRead)?;
    Ok(Json(services::list_widgets(&tdb).await?))
}

async fn get_widget(
    Extension(auth_user): Extension<AuthenticatedUser>,
    tdb: TenantDb,
    Path(id): Path<i32>,
) -> Result<Json<widget::Model>, AppError> {
    require(&auth_user, Permission::WidgetsRead)?;
    Ok(Json(services::get_widget(&tdb, id).await?))
}

async fn create_widget(
    Extension(auth_user): Extension<AuthenticatedUser>,
    tdb: TenantDb,
    Json(payload): Json<WidgetInput>,
) -> Result<(StatusCode, Json<widget::Model>), AppError> {
    require(&auth_user, Permission::WidgetsWrite)?;
    let created = services::create_widget(&tdb, payload, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_widget(
    Extension(auth_user): Extension<AuthenticatedUser>,
    tdb: TenantDb,
    Path(id): Path<i32>,
    Json(payload): Json<WidgetInput>,
) -> Result<Json<widget::Model>, AppError> {
    require(&auth_user, Permission::WidgetsWrite)?;
    Ok(Json(services::update_widget(&tdb, id, payload, Utc::now()).await?))
}

async fn delete_widget(
    Extension(auth_user): Extension<AuthenticatedUser>,
    tdb: TenantDb,
    Path(id): Path<i32>,
) -> Result<StatusCode, AppError> {
    require(&auth_user, Permission::WidgetsWrite)?;
    services::delete_widget(&tdb, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn rotate_key(
    Extension(auth_user): Extension<AuthenticatedUser>,
    tdb: TenantDb,
    Path(id): Path<i32>,
) -> Result<Json<widget::Model>, AppError> {
    require(&auth_user, Permission::WidgetsWrite)?;
    Ok(Json(services::rotate_widget_key(&tdb, id, Utc::now()).await?))
}
