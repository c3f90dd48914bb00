//! Tenant user management under `/api/users`.

use axum::{
    Json, Router,
    extract::{Extension, Path, State},
    http::StatusCode,
    routing::{delete, get, put},
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;

use crate::db::TenantDb;
use crate::db::enums::Role;
use crate::db::services::{self, CreateUserRequest};
use crate::services::access::{Permission, require};
use crate::web::models::{AuthenticatedUser, UserResponse};
use crate::web::{AppError, AppState};

pub fn create_team_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/{id}", delete(delete_user))
        .route("/{id}/role", put(update_role))
        .route("/{id}/active", put(update_active))
}

#[derive(Deserialize)]
pub struct UpdateRoleRequest {
    pub role: Role,
}

#[derive(Deserialize)]
pub struct UpdateActiveRequest {
    pub is_active: bool,
}

async fn list_users(
    Extension(auth_user): Extension<AuthenticatedUser>,
    tdb: TenantDb,
) -> Result<Json<Vec<UserResponse>>, AppError> {
    require(&auth_user, Permission::UsersRead)?;
    let users = services::list_users(&tdb).await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

async fn create_user(
    Extension(auth_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    tdb: TenantDb,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    require(&auth_user, Permission::UsersManage)?;
    let created =
        services::create_user(&tdb, &auth_user, payload, app_state.config.bcrypt_cost, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

async fn update_role(
    Extension(auth_user): Extension<AuthenticatedUser>,
    tdb: TenantDb,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateRoleRequest>,
) -> Result<Json<UserResponse>, AppError> {
    require(&auth_user, Permission::UsersManage)?;
    let updated = services::update_user_role(&tdb, &auth_user, id, payload.role, Utc::now()).await?;
    Ok(Json(updated.into()))
}

async fn update_active(
    Extension(auth_user): Extension<AuthenticatedUser>,
    tdb: TenantDb,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateActiveRequest>,
) -> Result<Json<UserResponse>, AppError> {
    require(&auth_user, Permission::UsersManage)?;
    let updated = services::set_user_active(&tdb, &auth_user, id, payload.is_active, Utc::now()).await?;
    Ok(Json(updated.into()))
}

async fn delete_user(
    Extension(auth_user): Extension<AuthenticatedUser>,
    tdb: TenantDb,
    Path(id): Path<i32>,
) -> Result<StatusCode, AppError> {
    require(&auth_user, Permission::UsersManage)?;
    services::delete_user(&tdb, &auth_user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
