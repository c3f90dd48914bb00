use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue::NotSet, ColumnTrait, QueryFilter, QueryOrder, QuerySelect, Set};
use serde::Deserialize;
use tracing::info;

use crate::db::entities::{bot, conversation, knowledge_base, message, widget};
use crate::db::enums::BotStatus;
use crate::db::services::subscription_service::{Quota, ensure_can_create, ensure_paid_access};
use crate::db::TenantDb;
use crate::web::error::AppError;

pub const DEFAULT_MODEL: &str = "default";
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a friendly support assistant. Answer briefly and only from the provided knowledge.";
pub const DEFAULT_WELCOME_MESSAGE: &str = "Hi! How can I help you today?";
pub const DEFAULT_FALLBACK_MESSAGE: &str = "Sorry, I don't know the answer to that yet. A team member will follow up.";

#[derive(Debug, Clone, Deserialize)]
pub struct BotInput {
    pub name: String,
    pub description: Option<String>,
    pub system_prompt: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub welcome_message: Option<String>,
    pub fallback_message: Option<String>,
    pub status: Option<BotStatus>,
    pub knowledge_base_id: Option<i32>,
}

struct ValidBot {
    name: String,
    description: Option<String>,
    system_prompt: String,
    model: String,
    temperature: f32,
    welcome_message: String,
    fallback_message: String,
    status: BotStatus,
    knowledge_base_id: Option<i32>,
}

fn non_blank(value: Option<String>, default: &str) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

async fn validate(tdb: &TenantDb, input: BotInput) -> Result<ValidBot, AppError> {
    let name = input.name.trim().to_string();
    if name.is_empty() || name.chars().count() > 100 {
        return Err(AppError::InvalidInput("Bot name must be 1 to 100 characters.".to_string()));
    }
    let temperature = input.temperature.unwrap_or(0.7);
    if !(0.0..=2.0).contains(&temperature) {
        return Err(AppError::InvalidInput("Temperature must be between 0 and 2.".to_string()));
    }
    if let Some(kb_id) = input.knowledge_base_id {
        if tdb.find_by_id::<knowledge_base::Entity>(kb_id).await?.is_none() {
            return Err(AppError::InvalidInput(format!("Knowledge base {kb_id} does not exist.")));
        }
    }

    Ok(ValidBot {
        name,
        description: input.description.map(|d| d.trim().to_string()).filter(|d| !d.is_empty()),
        system_prompt: non_blank(input.system_prompt, DEFAULT_SYSTEM_PROMPT),
        model: non_blank(input.model, DEFAULT_MODEL),
        temperature,
        welcome_message: non_blank(input.welcome_message, DEFAULT_WELCOME_MESSAGE),
        fallback_message: non_blank(input.fallback_message, DEFAULT_FALLBACK_MESSAGE),
        status: input.status.unwrap_or(BotStatus::Active),
        knowledge_base_id: input.knowledge_base_id,
    })
}

pub async fn list_bots(tdb: &TenantDb) -> Result<Vec<bot::Model>, AppError> {
    Ok(tdb
        .find::<bot::Entity>()
        .order_by_asc(bot::Column::Id)
        .all(tdb.conn())
        .await?)
}

pub async fn get_bot(tdb: &TenantDb, id: i32) -> Result<bot::Model, AppError> {
    Ok(tdb.get::<bot::Entity>(id).await?)
}

pub async fn create_bot(tdb: &TenantDb, input: BotInput, now: DateTime<Utc>) -> Result<bot::Model, AppError> {
    ensure_can_create(tdb, Quota::Bots, now).await?;
    let v = validate(tdb, input).await?;

    let created = tdb
        .insert(bot::ActiveModel {
            id: NotSet,
            tenant_id: NotSet,
            name: Set(v.name),
            description: Set(v.description),
            system_prompt: Set(v.system_prompt),
            model: Set(v.model),
            temperature: Set(v.temperature),
            welcome_message: Set(v.welcome_message),
            fallback_message: Set(v.fallback_message),
            status: Set(v.status),
            knowledge_base_id: Set(v.knowledge_base_id),
            created_at: Set(now),
            updated_at: Set(now),
        })
        .await?;
    info!(tenant_id = tdb.tenant_id(), bot_id = created.id, "Bot created.");
    Ok(created)
}

pub async fn update_bot(
    tdb: &TenantDb,
    id: i32,
    input: BotInput,
    now: DateTime<Utc>,
) -> Result<bot::Model, AppError> {
    let existing = tdb.get::<bot::Entity>(id).await?;
    ensure_paid_access(tdb, now).await?;
    let v = validate(tdb, input).await?;

    let mut active: bot::ActiveModel = existing.into();
    active.name = Set(v.name);
    active.description = Set(v.description);
    active.system_prompt = Set(v.system_prompt);
    active.model = Set(v.model);
    active.temperature = Set(v.temperature);
    active.welcome_message = Set(v.welcome_message);
    active.fallback_message = Set(v.fallback_message);
    active.status = Set(v.status);
    active.knowledge_base_id = Set(v.knowledge_base_id);
    active.updated_at = Set(now);
    Ok(tdb.update(active).await?)
}

/// Deletes the bot with its widgets and conversation history.
pub async fn delete_bot(tdb: &TenantDb, id: i32) -> Result<(), AppError> {
    let existing = tdb.get::<bot::Entity>(id).await?;

    let conversation_ids: Vec<i32> = tdb
        .find::<conversation::Entity>()
        .select_only()
        .column(conversation::Column::Id)
        .filter(conversation::Column::BotId.eq(existing.id))
        .into_tuple()
        .all(tdb.conn())
        .await?;
    if !conversation_ids.is_empty() {
        tdb.delete_many::<message::Entity>()
            .filter(message::Column::ConversationId.is_in(conversation_ids))
            .exec(tdb.conn())
            .await?;
    }
    tdb.delete_many::<conversation::Entity>()
        .filter(conversation::Column::BotId.eq(existing.id))
        .exec(tdb.conn())
        .await?;
    tdb.delete_many::<widget::Entity>()
        .filter(widget::Column::BotId.eq(existing.id))
        .exec(tdb.conn())
        .await?;
    tdb.delete::<bot::Entity>(existing.id).await?;

    info!(tenant_id = tdb.tenant_id(), bot_id = existing.id, "Bot deleted.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::entities::{subscription, tenant};
    use crate::db::enums::{Plan, SubscriptionStatus};
    use crate::services::trial::AccessDenial;
    use chrono::Duration;
    use sea_orm::ActiveModelTrait;

    async fn setup(trial_ends_at: DateTime<Utc>) -> TenantDb {
        let db = crate::db::connect_and_prepare("sqlite::memory:").await.unwrap();
        let now = Utc::now();
        let t = tenant::ActiveModel {
            id: NotSet,
            name: Set("Acme".to_string()),
            subdomain: Set("acme".to_string()),
            custom_domain: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&db)
        .await
        .unwrap();
        let tdb = TenantDb::new(db, t.id);
        tdb.insert(subscription::ActiveModel {
            id: NotSet,
            tenant_id: NotSet,
            plan: Set(Plan::Starter),
            status: Set(SubscriptionStatus::Trialing),
            trial_ends_at: Set(Some(trial_ends_at)),
            current_period_end: Set(None),
            external_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        })
        .await
        .unwrap();
        tdb
    }

    fn input(name: &str) -> BotInput {
        BotInput {
            name: name.to_string(),
            description: None,
            system_prompt: None,
            model: None,
            temperature: None,
            welcome_message: None,
            fallback_message: None,
            status: None,
            knowledge_base_id: None,
        }
    }

    #[tokio::test]
    async fn create_applies_defaults_and_plan_limit() {
        let now = Utc::now();
        let tdb = setup(now + Duration::days(7)).await;

        let first = create_bot(&tdb, input("Support"), now).await.unwrap();
        assert_eq!(first.welcome_message, DEFAULT_WELCOME_MESSAGE);
        assert_eq!(first.status, BotStatus::Active);

        let max = Plan::Starter.limits().max_bots;
        for i in 1..max {
            create_bot(&tdb, input(&format!("Bot {i}")), now).await.unwrap();
        }
        let over = create_bot(&tdb, input("One too many"), now).await;
        assert!(matches!(over, Err(AppError::PlanLimitReached(_))));
    }

    #[tokio::test]
    async fn rejects_invalid_input_and_foreign_knowledge_base() {
        let now = Utc::now();
        let tdb = setup(now + Duration::days(7)).await;

        let mut hot = input("Hot");
        hot.temperature = Some(3.5);
        assert!(matches!(create_bot(&tdb, hot, now).await, Err(AppError::InvalidInput(_))));

        let mut linked = input("Linked");
        linked.knowledge_base_id = Some(4242);
        assert!(matches!(create_bot(&tdb, linked, now).await, Err(AppError::InvalidInput(_))));

        assert!(matches!(create_bot(&tdb, input("   "), now).await, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn expired_trial_blocks_updates_but_not_deletes() {
        let now = Utc::now();
        let tdb = setup(now + Duration::hours(1)).await;
        let created = create_bot(&tdb, input("Support"), now).await.unwrap();

        let later = now + Duration::hours(2);
        let update = update_bot(&tdb, created.id, input("Renamed"), later).await;
        assert!(matches!(update, Err(AppError::PaidAccessDenied(AccessDenial::TrialExpired))));

        delete_bot(&tdb, created.id).await.unwrap();
        assert!(matches!(get_bot(&tdb, created.id).await, Err(AppError::NotFound(_))));
    }
}
