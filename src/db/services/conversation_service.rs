use sea_orm::{ColumnTrait, PaginatorTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::db::entities::{conversation, message};
use crate::db::enums::ConversationStatus;
use crate::db::TenantDb;
use crate::web::error::AppError;
use crate::web::models::Page;

#[derive(Debug, Default, Clone, Deserialize)]
pub struct ConversationFilter {
    pub bot_id: Option<i32>,
    pub status: Option<ConversationStatus>,
}

#[derive(Debug, Serialize)]
pub struct ConversationDetail {
    #[serde(flatten)]
    pub conversation: conversation::Model,
    pub messages: Vec<message::Model>,
}

pub async fn list_conversations(
    tdb: &TenantDb,
    filter: &ConversationFilter,
    page: u64,
    per_page: u64,
) -> Result<Page<conversation::Model>, AppError> {
    let mut query = tdb.find::<conversation::Entity>();
    if let Some(bot_id) = filter.bot_id {
        query = query.filter(conversation::Column::BotId.eq(bot_id));
    }
    if let Some(status) = filter.status {
        query = query.filter(conversation::Column::Status.eq(status));
    }

    let paginator = query
        .order_by_desc(conversation::Column::LastMessageAt)
        .order_by_desc(conversation::Column::Id)
        .paginate(tdb.conn(), per_page);
    let total = paginator.num_items().await?;
    let items = paginator.fetch_page(page).await?;

    Ok(Page {
        items,
        page: page + 1,
        per_page,
        total,
    })
}

pub async fn list_messages(tdb: &TenantDb, conversation_id: i32) -> Result<Vec<message::Model>, AppError> {
    Ok(tdb
        .find::<message::Entity>()
        .filter(message::Column::ConversationId.eq(conversation_id))
        .order_by_asc(message::Column::CreatedAt)
        .order_by_asc(message::Column::Id)
        .all(tdb.conn())
        .await?)
}

pub async fn get_conversation(tdb: &TenantDb, id: i32) -> Result<ConversationDetail, AppError> {
    let conversation = tdb.get::<conversation::Entity>(id).await?;
    Ok(ConversationDetail {
        messages: list_messages(tdb, conversation.id).await?,
        conversation,
    })
}

/// Closes the conversation; the visitor's next message starts a new one.
pub async fn close_conversation(tdb: &TenantDb, id: i32) -> Result<conversation::Model, AppError> {
    let existing = tdb.get::<conversation::Entity>(id).await?;
    if existing.status == ConversationStatus::Closed {
        return Ok(existing);
    }
    let mut active: conversation::ActiveModel = existing.into();
    active.status = Set(ConversationStatus::Closed);
    let updated = tdb.update(active).await?;
    info!(tenant_id = tdb.tenant_id(), conversation_id = id, "Conversation closed.");
    Ok(updated)
}

pub async fn delete_conversation(tdb: &TenantDb, id: i32) -> Result<(), AppError> {
    let existing = tdb.get::<conversation::Entity>(id).await?;
    tdb.delete_many::<message::Entity>()
        .filter(message::Column::ConversationId.eq(existing.id))
        .exec(tdb.conn())
        .await?;
    tdb.delete::<conversation::Entity>(existing.id).await?;
    info!(tenant_id = tdb.tenant_id(), conversation_id = id, "Conversation deleted.");
    Ok(())
}

