use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;
use std::sync::Arc;

use crate::db::TenantDb;
use crate::db::entities::conversation;
use crate::db::enums::ConversationStatus;
use crate::db::services::{self, ConversationDetail, ConversationFilter};
use crate::services::access::{Permission, require};
use crate::web::models::{AuthenticatedUser, Page, Pagination};
use crate::web::{AppError, AppState};

pub fn create_conversation_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_conversations))
        .route("/{id}", get(get_conversation).delete(delete_conversation))
        .route("/{id}/close", post(close_conversation))
}

// Query extraction does not support flattened structs with numeric fields.
#[derive(Debug, Deserialize)]
pub struct ConversationQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub bot_id: Option<i32>,
    pub status: Option<ConversationStatus>,
}

async fn list_conversations(
    Extension(auth_user): Extension<AuthenticatedUser>,
    tdb: TenantDb,
    Query(query): Query<ConversationQuery>,
) -> Result<Json<Page<conversation::Model>>, AppError> {
    require(&auth_user, Permission::ConversationsRead)?;
    let (page, per_page) = Pagination {
        page: query.page,
        per_page: query.per_page,
    }
    .resolve();
    let filter = ConversationFilter {
        bot_id: query.bot_id,
        status: query.status,
    };
    Ok(Json(services::list_conversations(&tdb, &filter, page, per_page).await?))
}

async fn get_conversation(
    Extension(auth_user): Extension<AuthenticatedUser>,
    tdb: TenantDb,
    Path(id): Path<i32>,
) -> Result<Json<ConversationDetail>, AppError> {
    require(&auth_user, Permission::ConversationsRead)?;
    Ok(Json(services::get_conversation(&tdb, id).await?))
}

async fn close_conversation(
    Extension(auth_user): Extension<AuthenticatedUser>,
    tdb: TenantDb,
    Path(id): Path<i32>,
) -> Result<Json<conversation::Model>, AppError> {
    require(&auth_user, Permission::ConversationsWrite)?;
    Ok(Json(services::close_conversation(&tdb, id).await?))
}

async fn delete_conversation(
    Extension(auth_user): Extension<AuthenticatedUser>,
    tdb: TenantDb,
    Path(id): Path<i32>,
) -> Result<StatusCode, AppError> {
    require(&auth_user, Permission::ConversationsDelete)?;
    services::delete_conversation(&tdb, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
