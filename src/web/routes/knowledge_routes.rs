//! Knowledge bases with their documents and FAQs.

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, put},
};
use chrono::Utc;
use std::sync::Arc;

use crate::db::TenantDb;
use crate::db::entities::{document, faq, knowledge_base};
use crate::db::services::{self, DocumentInput, FaqInput, KnowledgeBaseDetail, KnowledgeBaseInput};
use crate::services::access::{Permission, require};
use crate::web::models::AuthenticatedUser;
use crate::web::{AppError, AppState};

pub fn create_knowledge_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_knowledge_bases).post(create_knowledge_base))
        .route(
            "/{id}",
            get(get_knowledge_base)
                .put(update_knowledge_base)
                .delete(delete_knowledge_base),
        )
        .route("/{id}/documents", get(list_documents).post(create_document))
        .route("/{id}/faqs", get(list_faqs).post(create_faq))
        .route("/documents/{id}", get(get_document).delete(delete_document))
        .route("/faqs/{id}", put(update_faq).delete(delete_faq))
}

async fn list_knowledge_bases(
    Extension(auth_user): Extension<AuthenticatedUser>,
    tdb: TenantDb,
) -> Result<Json<Vec<knowledge_base::Model>>, AppError> {
    require(&auth_user, Permission::KnowledgeRead)?;
    Ok(Json(services::list_knowledge_bases(&tdb).await?))
}

async fn get_knowledge_base(
    Extension(auth_user): Extension<AuthenticatedUser>,
    tdb: TenantDb,
    Path(id): Path<i32>,
) -> Result<Json<KnowledgeBaseDetail>, AppError> {
    require(&auth_user, Permission::KnowledgeRead)?;
    Ok(Json(services::get_knowledge_base(&tdb, id).await?))
}

async fn create_knowledge_base(
    Extension(auth_user): Extension<AuthenticatedUser>,
    tdb: TenantDb,
    Json(payload): Json<KnowledgeBaseInput>,
) -> Result<(StatusCode, Json<knowledge_base::Model>), AppError> {
    require(&auth_user, Permission::KnowledgeWrite)?;
    let created = services::create_knowledge_base(&tdb, payload, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_knowledge_base(
    Extension(auth_user): Extension<AuthenticatedUser>,
    tdb: TenantDb,
    Path(id): Path<i32>,
    Json(payload): Json<KnowledgeBaseInput>,
) -> Result<Json<knowledge_base::Model>, AppError> {
    require(&auth_user, Permission::KnowledgeWrite)?;
    Ok(Json(services::update_knowledge_base(&tdb, id, payload, Utc::now()).await?))
}

async fn delete_knowledge_base(
    Extension(auth_user): Extension<AuthenticatedUser>,
    tdb: TenantDb,
    Path(id): Path<i32>,
) -> Result<StatusCode, AppError> {
    require(&auth_user, Permission::KnowledgeWrite)?;
    services::delete_knowledge_base(&tdb, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_documents(
    Extension(auth_user): Extension<AuthenticatedUser>,
    tdb: TenantDb,
    Path(id): Path<i32>,
) -> Result<Json<Vec<document::Model>>, AppError> {
    require(&auth_user, Permission::KnowledgeRead)?;
    tdb.get::<knowledge_base::Entity>(id).await?;
    Ok(Json(services::list_documents(&tdb, id).await?))
}

async fn create_document(
    Extension(auth_user): Extension<AuthenticatedUser>,
    tdb: TenantDb,
    Path(id): Path<i32>,
    Json(payload): Json<DocumentInput>,
) -> Result<(StatusCode, Json<document::Model>), AppError> {
    require(&auth_user, Permission::KnowledgeWrite)?;
    let created = services::create_document(&tdb, id, payload, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_document(
    Extension(auth_user): Extension<AuthenticatedUser>,
    tdb: TenantDb,
    Path(id): Path<i32>,
) -> Result<Json<document::Model>, AppError> {
    require(&auth_user, Permission::KnowledgeRead)?;
    Ok(Json(services::get_document(&tdb, id).await?))
}

async fn delete_document(
    Extension(auth_user): Extension<AuthenticatedUser>,
    tdb: TenantDb,
    Path(id): Path<i32>,
) -> Result<StatusCode, AppError> {
    require(&auth_user, Permission::KnowledgeWrite)?;
    services::delete_document(&tdb, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_faqs(
    Extension(auth_user): Extension<AuthenticatedUser>,
    tdb: TenantDb,
    Path(id): Path<i32>,
) -> Result<Json<Vec<faq::Model>>, AppError> {
    require(&auth_user, Permission::KnowledgeRead)?;
    tdb.get::<knowledge_base::Entity>(id).await?;
    Ok(Json(services::list_faqs(&tdb, id).await?))
}

async fn create_faq(
    Extension(auth_user): Extension<AuthenticatedUser>,
    tdb: TenantDb,
    Path(id): Path<i32>,
    Json(payload): Json<FaqInput>,
) -> Result<(StatusCode, Json<faq::Model>), AppError> {
    require(&auth_user, Permission::KnowledgeWrite)?;
    let created = services::create_faq(&tdb, id, payload, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_faq(
    Extension(auth_user): Extension<AuthenticatedUser>,
    tdb: TenantDb,
    Path(id): Path<i32>,
    Json(payload): Json<FaqInput>,
) -> Result<Json<faq::Model>, AppError> {
    require(&auth_user, Permission::KnowledgeWrite)?;
    Ok(Json(services::update_faq(&tdb, id, payload, Utc::now()).await?))
}

async fn delete_faq(
    Extension(auth_user): Extension<AuthenticatedUser>,
    tdb: TenantDb,
    Path(id): Path<i32>,
) -> Result<StatusCode, AppError> {
    require(&auth_user, Permission::KnowledgeWrite)?;
    services::delete_faq(&tdb, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
