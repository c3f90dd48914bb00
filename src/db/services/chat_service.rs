//! The public, unauthenticated chat endpoint behind embedded widgets.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveValue::NotSet, ColumnTrait, DatabaseConnection, QueryFilter, QueryOrder, QuerySelect,
    Set, sea_query::Expr,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::db::entities::{bot, conversation, message};
use crate::db::enums::{BotStatus, ConversationStatus, MessageRole};
use crate::db::services::knowledge_service::knowledge_for_bot;
use crate::db::services::subscription_service::{ensure_message_quota, ensure_paid_access};
use crate::db::services::widget_service::{find_active_widget_by_key, origin_allowed};
use crate::db::TenantDb;
use crate::services::rate_limit::RateLimiter;
use crate::services::reply::{ReplyContext, ReplyGenerator};
use crate::web::error::AppError;

pub const MAX_MESSAGE_CHARS: usize = 4000;
pub const MAX_SESSION_ID_CHARS: usize = 128;
/// Earlier turns handed to the reply generator.
pub const HISTORY_LIMIT: u64 = 20;

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub conversation_id: i32,
    pub session_id: String,
    pub reply: String,
    pub created_at: DateTime<Utc>,
}

pub struct ChatDeps<'a> {
    pub db: &'a DatabaseConnection,
    pub limiter: &'a RateLimiter,
    pub generator: &'a dyn ReplyGenerator,
}

fn validate(req: &ChatRequest) -> Result<(String, String), AppError> {
    let session_id = req.session_id.trim();
    if session_id.is_empty() || session_id.chars().count() > MAX_SESSION_ID_CHARS {
        return Err(AppError::InvalidInput(format!(
            "session_id must be 1 to {MAX_SESSION_ID_CHARS} characters."
        )));
    }
    let message = req.message.trim();
    if message.is_empty() || message.chars().count() > MAX_MESSAGE_CHARS {
        return Err(AppError::InvalidInput(format!(
            "Message must be 1 to {MAX_MESSAGE_CHARS} characters."
        )));
    }
    Ok((session_id.to_string(), message.to_string()))
}

async fn open_conversation(
    tdb: &TenantDb,
    bot: &bot::Model,
    widget_id: i32,
    session_id: &str,
    now: DateTime<Utc>,
) -> Result<conversation::Model, AppError> {
    let existing = tdb
        .find::<conversation::Entity>()
        .filter(conversation::Column::WidgetId.eq(widget_id))
        .filter(conversation::Column::SessionId.eq(session_id))
        .filter(conversation::Column::Status.eq(ConversationStatus::Open))
        .one(tdb.conn())
        .await?;
    if let Some(c) = existing {
        return Ok(c);
    }
    let created = tdb
        .insert(conversation::ActiveModel {
            id: NotSet,
            tenant_id: NotSet,
            bot_id: Set(bot.id),
            widget_id: Set(Some(widget_id)),
            session_id: Set(session_id.to_string()),
            status: Set(ConversationStatus::Open),
            message_count: Set(0),
            last_message_at: Set(now),
            created_at: Set(now),
        })
        .await?;
    debug!(tenant_id = tdb.tenant_id(), conversation_id = created.id, "Conversation started.");
    Ok(created)
}

async fn recent_history(tdb: &TenantDb, conversation_id: i32) -> Result<Vec<(MessageRole, String)>, AppError> {
    let mut recent = tdb
        .find::<message::Entity>()
        .filter(message::Column::ConversationId.eq(conversation_id))
        .order_by_desc(message::Column::Id)
        .limit(HISTORY_LIMIT)
        .all(tdb.conn())
        .await?;
    recent.reverse();
    Ok(recent.into_iter().map(|m| (m.role, m.content)).collect())
}

async fn store_message(
    tdb: &TenantDb,
    conversation_id: i32,
    role: MessageRole,
    content: String,
    now: DateTime<Utc>,
) -> Result<message::Model, AppError> {
    Ok(tdb
        .insert(message::ActiveModel {
            id: NotSet,
            tenant_id: NotSet,
            conversation_id: Set(conversation_id),
            role: Set(role),
            content: Set(content),
            created_at: Set(now),
        })
        .await?)
}

/// Handles one visitor message sent through a widget and returns the bot's reply.
/// Counts one visitor message and its reply. The increment happens in SQL so
/// concurrent messages on the same conversation are all counted.
async fn record_exchange(tdb: &TenantDb, conversation_id: i32, now: DateTime<Utc>) -> Result<(), AppError> {
    tdb.update_many::<conversation::Entity>()
        .col_expr(
            conversation::Column::MessageCount,
            Expr::col(conversation::Column::MessageCount).add(2),
        )
        .col_expr(conversation::Column::LastMessageAt, Expr::value(now))
        .filter(conversation::Column::Id.eq(conversation_id))
        .exec(tdb.conn())
        .await?;
    Ok(())
}

pub async fn handle_chat_message(
    deps: ChatDeps<'_>,
    public_key: &str,
    origin: Option<&str>,
    req: ChatRequest,
    now: DateTime<Utc>,
) -> Result<ChatResponse, AppError> {
    let widget = find_active_widget_by_key(deps.db, public_key).await?;
    let tdb = TenantDb::new(deps.db.clone(), widget.tenant_id);

    let bot = tdb
        .find_by_id::<bot::Entity>(widget.bot_id)
        .await?
        .filter(|b| b.status == BotStatus::Active)
        .ok_or_else(|| AppError::NotFound("Widget not found.".to_string()))?;

    if !origin_allowed(&widget, origin) {
        warn!(widget_id = widget.id, origin = ?origin, "Chat request from a disallowed origin.");
        return Err(AppError::Forbidden("This origin may not use the widget.".to_string()));
    }

    let (session_id, text) = validate(&req)?;

    let sub = ensure_paid_access(&tdb, now).await?;
    ensure_message_quota(&tdb, &sub, now).await?;

    let limiter_key = format!("{}:{}", widget.id, session_id);
    if let Err(wait) = deps.limiter.check(&limiter_key, now) {
        return Err(AppError::TooManyRequests {
            message: "You are sending messages too quickly. Please wait a moment.".to_string(),
            retry_after_secs: wait.num_seconds().max(1) as u64,
        });
    }

    let conversation = open_conversation(&tdb, &bot, widget.id, &session_id, now).await?;
    let history = recent_history(&tdb, conversation.id).await?;
    store_message(&tdb, conversation.id, MessageRole::User, text.clone(), now).await?;

    let (faqs, chunks) = knowledge_for_bot(&tdb, &bot).await?;
    let ctx = ReplyContext {
        bot: bot.clone(),
        history,
        message: text,
        faqs,
        chunks,
    };
    let reply = match deps.generator.generate(&ctx).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!(bot_id = bot.id, error = %e, "Reply generation failed, using the fallback message.");
            bot.fallback_message.clone()
        }
    };
    let stored = store_message(&tdb, conversation.id, MessageRole::Assistant, reply, now).await?;

    record_exchange(&tdb, conversation.id, now).await?;

    Ok(ChatResponse {
        conversation_id: conversation.id,
        session_id,
        reply: stored.content,
        created_at: stored.created_at,
    })
}
