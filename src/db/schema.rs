//! Schema bootstrap. Tables are derived from the SeaORM entities and created
//! if missing, so the same code path serves Postgres in production and SQLite
//! in tests.

use sea_orm::sea_query::{Index, IndexCreateStatement};
use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, Schema};
use tracing::info;

use crate::db::entities::{
    bot, conversation, document, document_chunk, faq, knowledge_base, message, notification,
    subscription, tenant, user, widget,
};

async fn create_table<E: EntityTrait>(
    db: &DatabaseConnection,
    schema: &Schema,
    entity: E,
) -> Result<(), DbErr> {
    let mut stmt = schema.create_table_from_entity(entity);
    stmt.if_not_exists();
    db.execute(db.get_database_backend().build(&stmt)).await?;
    Ok(())
}

async fn create_index(db: &DatabaseConnection, stmt: &IndexCreateStatement) -> Result<(), DbErr> {
    db.execute(db.get_database_backend().build(stmt)).await?;
    Ok(())
}

pub async fn ensure_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    let schema = Schema::new(db.get_database_backend());

    // Parents before children for the foreign keys.
    create_table(db, &schema, tenant::Entity).await?;
    create_table(db, &schema, user::Entity).await?;
    create_table(db, &schema, subscription::Entity).await?;
    create_table(db, &schema, knowledge_base::Entity).await?;
    create_table(db, &schema, bot::Entity).await?;
    create_table(db, &schema, document::Entity).await?;
    create_table(db, &schema, document_chunk::Entity).await?;
    create_table(db, &schema, faq::Entity).await?;
    create_table(db, &schema, widget::Entity).await?;
    create_table(db, &schema, conversation::Entity).await?;
    create_table(db, &schema, message::Entity).await?;
    create_table(db, &schema, notification::Entity).await?;

    create_index(
        db,
        Index::create()
            .if_not_exists()
            .name("idx_conversations_tenant_session")
            .table(conversation::Entity)
            .col(conversation::Column::TenantId)
            .col(conversation::Column::WidgetId)
            .col(conversation::Column::SessionId),
    )
    .await?;
    create_index(
        db,
        Index::create()
            .if_not_exists()
            .name("idx_messages_conversation")
            .table(message::Entity)
            .col(message::Column::ConversationId)
            .col(message::Column::CreatedAt),
    )
    .await?;
    create_index(
        db,
        Index::create()
            .if_not_exists()
            .name("idx_chunks_knowledge_base")
            .table(document_chunk::Entity)
            .col(document_chunk::Column::KnowledgeBaseId),
    )
    .await?;
    create_index(
        db,
        Index::create()
            .if_not_exists()
            .name("idx_notifications_tenant")
            .table(notification::Entity)
            .col(notification::Column::TenantId)
            .col(notification::Column::CreatedAt),
    )
    .await?;

    info!("Database schema is up to date.");
    Ok(())
}
