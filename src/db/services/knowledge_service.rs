//! Knowledge bases with their documents, ingested chunks and FAQs.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait, sea_query::Expr,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::db::entities::{bot, document, document_chunk, faq, knowledge_base};
use crate::db::enums::DocumentStatus;
use crate::db::services::subscription_service::{Quota, ensure_can_create};
use crate::db::TenantDb;
use crate::services::ingest;
use crate::web::error::AppError;

pub const MAX_DOCUMENT_CHARS: usize = 500_000;

#[derive(Debug, Clone, Deserialize)]
pub struct KnowledgeBaseInput {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DocumentInput {
    pub title: String,
    pub content: String,
    pub source_url: Option<String>,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FaqInput {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Serialize)]
pub struct KnowledgeBaseDetail {
    #[serde(flatten)]
    pub knowledge_base: knowledge_base::Model,
    pub documents: Vec<document::Model>,
    pub faqs: Vec<faq::Model>,
}

fn clean_name(name: &str, what: &str) -> Result<String, AppError> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > 200 {
        return Err(AppError::InvalidInput(format!("{what} must be 1 to 200 characters.")));
    }
    Ok(name.to_string())
}

pub async fn list_knowledge_bases(tdb: &TenantDb) -> Result<Vec<knowledge_base::Model>, AppError> {
    Ok(tdb
        .find::<knowledge_base::Entity>()
        .order_by_asc(knowledge_base::Column::Id)
        .all(tdb.conn())
        .await?)
}

pub async fn get_knowledge_base(tdb: &TenantDb, id: i32) -> Result<KnowledgeBaseDetail, AppError> {
    let knowledge_base = tdb.get::<knowledge_base::Entity>(id).await?;
    Ok(KnowledgeBaseDetail {
        documents: list_documents(tdb, id).await?,
        faqs: list_faqs(tdb, id).await?,
        knowledge_base,
    })
}

pub async fn create_knowledge_base(
    tdb: &TenantDb,
    input: KnowledgeBaseInput,
    now: DateTime<Utc>,
) -> Result<knowledge_base::Model, AppError> {
    let created = tdb
        .insert(knowledge_base::ActiveModel {
            id: NotSet,
            tenant_id: NotSet,
            name: Set(clean_name(&input.name, "Name")?),
            description: Set(input.description.filter(|d| !d.trim().is_empty())),
            created_at: Set(now),
            updated_at: Set(now),
        })
        .await?;
    info!(tenant_id = tdb.tenant_id(), knowledge_base_id = created.id, "Knowledge base created.");
    Ok(created)
}

pub async fn update_knowledge_base(
    tdb: &TenantDb,
    id: i32,
    input: KnowledgeBaseInput,
    now: DateTime<Utc>,
) -> Result<knowledge_base::Model, AppError> {
    let existing = tdb.get::<knowledge_base::Entity>(id).await?;
    let mut active: knowledge_base::ActiveModel = existing.into();
    active.name = Set(clean_name(&input.name, "Name")?);
    active.description = Set(input.description.filter(|d| !d.trim().is_empty()));
    active.updated_at = Set(now);
    Ok(tdb.update(active).await?)
}

/// Removes the knowledge base with its documents, chunks and FAQs. Bots using it are unlinked.
pub async fn delete_knowledge_base(tdb: &TenantDb, id: i32) -> Result<(), AppError> {
    let existing = tdb.get::<knowledge_base::Entity>(id).await?;

    tdb.update_many::<bot::Entity>()
        .col_expr(bot::Column::KnowledgeBaseId, Expr::value(Option::<i32>::None))
        .filter(bot::Column::KnowledgeBaseId.eq(existing.id))
        .exec(tdb.conn())
        .await?;
    tdb.delete_many::<document_chunk::Entity>()
        .filter(document_chunk::Column::KnowledgeBaseId.eq(existing.id))
        .exec(tdb.conn())
        .await?;
    tdb.delete_many::<document::Entity>()
        .filter(document::Column::KnowledgeBaseId.eq(existing.id))
        .exec(tdb.conn())
        .await?;
    tdb.delete_many::<faq::Entity>()
        .filter(faq::Column::KnowledgeBaseId.eq(existing.id))
        .exec(tdb.conn())
        .await?;
    tdb.delete::<knowledge_base::Entity>(existing.id).await?;

    info!(tenant_id = tdb.tenant_id(), knowledge_base_id = existing.id, "Knowledge base deleted.");
    Ok(())
}

pub async fn list_documents(tdb: &TenantDb, knowledge_base_id: i32) -> Result<Vec<document::Model>, AppError> {
    Ok(tdb
        .find::<document::Entity>()
        .filter(document::Column::KnowledgeBaseId.eq(knowledge_base_id))
        .order_by_asc(document::Column::Id)
        .all(tdb.conn())
        .await?)
}

pub async fn get_document(tdb: &TenantDb, id: i32) -> Result<document::Model, AppError> {
    Ok(tdb.get::<document::Entity>(id).await?)
}

/// Stores a document and ingests it. Content without any text is kept as `Failed`.
pub async fn create_document(
    tdb: &TenantDb,
    knowledge_base_id: i32,
    input: DocumentInput,
    now: DateTime<Utc>,
) -> Result<document::Model, AppError> {
    let kb = tdb.get::<knowledge_base::Entity>(knowledge_base_id).await?;
    ensure_can_create(tdb, Quota::Documents, now).await?;

    let title = clean_name(&input.title, "Title")?;
    if input.content.chars().count() > MAX_DOCUMENT_CHARS {
        return Err(AppError::InvalidInput(format!(
            "Documents are limited to {MAX_DOCUMENT_CHARS} characters."
        )));
    }

    let outcome = ingest::ingest(&input.content);
    let (status, chunk_count, char_count, error) = match &outcome {
        Ok(o) => (
            DocumentStatus::Ready,
            o.chunks.len() as i32,
            o.normalized.chars().count() as i32,
            None,
        ),
        Err(reason) => (DocumentStatus::Failed, 0, 0, Some(reason.clone())),
    };

    // The document row and its chunks are stored together or not at all.
    let txn = tdb.conn().begin().await?;
    let doc = document::ActiveModel {
        id: NotSet,
        tenant_id: Set(tdb.tenant_id()),
        knowledge_base_id: Set(kb.id),
        title: Set(title),
        source_url: Set(input.source_url.filter(|u| !u.trim().is_empty())),
        content_type: Set(input.content_type.unwrap_or_else(|| "text/plain".to_string())),
        content: Set(input.content),
        status: Set(status),
        chunk_count: Set(chunk_count),
        char_count: Set(char_count),
        error: Set(error),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&txn)
    .await?;

    if let Ok(o) = &outcome {
        let chunks = o.chunks.iter().enumerate().map(|(position, content)| {
            document_chunk::ActiveModel {
                id: NotSet,
                tenant_id: Set(tdb.tenant_id()),
                document_id: Set(doc.id),
                knowledge_base_id: Set(kb.id),
                position: Set(position as i32),
                content: Set(content.clone()),
            }
        });
        document_chunk::Entity::insert_many(chunks).exec(&txn).await?;
    }
    txn.commit().await?;

    match outcome {
        Ok(_) => {
            info!(
                tenant_id = tdb.tenant_id(),
                document_id = doc.id,
                chunks = doc.chunk_count,
                "Document ingested."
            );
        }
        Err(reason) => {
            warn!(tenant_id = tdb.tenant_id(), document_id = doc.id, %reason, "Document ingestion failed.");
        }
    }

    Ok(doc)
}

pub async fn delete_document(tdb: &TenantDb, id: i32) -> Result<(), AppError> {
    let existing = tdb.get::<document::Entity>(id).await?;
    tdb.delete_many::<document_chunk::Entity>()
        .filter(document_chunk::Column::DocumentId.eq(existing.id))
        .exec(tdb.conn())
        .await?;
    tdb.delete::<document::Entity>(existing.id).await?;
    Ok(())
}

pub async fn list_faqs(tdb: &TenantDb, knowledge_base_id: i32) -> Result<Vec<faq::Model>, AppError> {
    Ok(tdb
        .find::<faq::Entity>()
        .filter(faq::Column::KnowledgeBaseId.eq(knowledge_base_id))
        .order_by_asc(faq::Column::Id)
        .all(tdb.conn())
        .await?)
}

fn validate_faq(input: &FaqInput) -> Result<(String, String), AppError> {
    let question = input.question.trim();
    let answer = input.answer.trim();
    if question.is_empty() || answer.is_empty() {
        return Err(AppError::InvalidInput("Question and answer are required.".to_string()));
    }
    Ok((question.to_string(), answer.to_string()))
}

pub async fn create_faq(
    tdb: &TenantDb,
    knowledge_base_id: i32,
    input: FaqInput,
    now: DateTime<Utc>,
) -> Result<faq::Model, AppError> {
    let kb = tdb.get::<knowledge_base::Entity>(knowledge_base_id).await?;
    let (question, answer) = validate_faq(&input)?;
    Ok(tdb
        .insert(faq::ActiveModel {
            id: NotSet,
            tenant_id: NotSet,
            knowledge_base_id: Set(kb.id),
            question: Set(question),
            answer: Set(answer),
            created_at: Set(now),
            updated_at: Set(now),
        })
        .await?)
}

pub async fn update_faq(tdb: &TenantDb, id: i32, input: FaqInput, now: DateTime<Utc>) -> Result<faq::Model, AppError> {
    let existing = tdb.get::<faq::Entity>(id).await?;
    let (question, answer) = validate_faq(&input)?;
    let mut active: faq::ActiveModel = existing.into();
    active.question = Set(question);
    active.answer = Set(answer);
    active.updated_at = Set(now);
    Ok(tdb.update(active).await?)
}

pub async fn delete_faq(tdb: &TenantDb, id: i32) -> Result<(), AppError> {
    if tdb.delete::<faq::Entity>(id).await? == 0 {
        return Err(AppError::NotFound(format!("FAQ {id} not found.")));
    }
    Ok(())
}

/// FAQs and chunks a bot answers from; empty when no knowledge base is linked.
pub async fn knowledge_for_bot(
    tdb: &TenantDb,
    bot: &bot::Model,
) -> Result<(Vec<faq::Model>, Vec<document_chunk::Model>), AppError> {
    let Some(kb_id) = bot.knowledge_base_id else {
        return Ok((Vec::new(), Vec::new()));
    };
    let faqs = list_faqs(tdb, kb_id).await?;
    let chunks = tdb
        .find::<document_chunk::Entity>()
        .filter(document_chunk::Column::KnowledgeBaseId.eq(kb_id))
        .order_by_asc(document_chunk::Column::DocumentId)
        .order_by_asc(document_chunk::Column::Position)
        .all(tdb.conn())
        .await?;
    Ok((faqs, chunks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::entities::{subscription, tenant};
    use crate::db::enums::{BotStatus, Plan, SubscriptionStatus};
    use crate::db::services::bot_service::{BotInput, create_bot, get_bot};
    use chrono::Duration;
    use sea_orm::ConnectionTrait;

    async fn setup() -> TenantDb {
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
            status: Set(SubscriptionStatus::Active),
            trial_ends_at: Set(None),
            current_period_end: Set(Some(now + Duration::days(30))),
            external_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        })
        .await
        .unwrap();
        tdb
    }

    fn kb_input(name: &str) -> KnowledgeBaseInput {
        KnowledgeBaseInput {
            name: name.to_string(),
            description: None,
        }
    }

    fn doc_input(content: &str) -> DocumentInput {
        DocumentInput {
            title: "Shipping policy".to_string(),
            content: content.to_string(),
            source_url: None,
            content_type: None,
        }
    }

    #[tokio::test]
    async fn documents_are_chunked_on_upload() {
        let tdb = setup().await;
        let now = Utc::now();
        let kb = create_knowledge_base(&tdb, kb_input("Help center"), now).await.unwrap();

        let long = "Orders ship within two days. ".repeat(100);
        let doc = create_document(&tdb, kb.id, doc_input(&long), now).await.unwrap();
        assert_eq!(doc.status, DocumentStatus::Ready);
        assert!(doc.chunk_count > 1);
        assert_eq!(doc.char_count as usize, long.trim().chars().count());

        let empty = create_document(&tdb, kb.id, doc_input(" \n\n "), now).await.unwrap();
        assert_eq!(empty.status, DocumentStatus::Failed);
        assert!(empty.error.is_some());
        assert_eq!(empty.chunk_count, 0);

        let stored: Vec<document_chunk::Model> = tdb
            .find::<document_chunk::Entity>()
            .filter(document_chunk::Column::DocumentId.eq(doc.id))
            .all(tdb.conn())
            .await
            .unwrap();
        assert_eq!(stored.len() as i32, doc.chunk_count);
    }

    #[tokio::test]
    async fn failed_chunk_write_leaves_no_document_behind() {
        let tdb = setup().await;
        let now = Utc::now();
        let kb = create_knowledge_base(&tdb, kb_input("Help center"), now).await.unwrap();
        tdb.conn()
            .execute_unprepared("DROP TABLE document_chunks")
            .await
            .unwrap();

        let result = create_document(&tdb, kb.id, doc_input("Orders ship within two days."), now).await;
        assert!(result.is_err());
        assert_eq!(tdb.count::<document::Entity>().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn deleting_a_knowledge_base_cleans_up_and_unlinks_bots() {
        let tdb = setup().await;
        let now = Utc::now();
        let kb = create_knowledge_base(&tdb, kb_input("Help center"), now).await.unwrap();
        create_document(&tdb, kb.id, doc_input("Returns are free."), now).await.unwrap();
        create_faq(
            &tdb,
            kb.id,
            FaqInput {
                question: "Are returns free?".to_string(),
                answer: "Yes.".to_string(),
            },
            now,
        )
        .await
        .unwrap();
        let bot = create_bot(
            &tdb,
            BotInput {
                name: "Support".to_string(),
                description: None,
                system_prompt: None,
                model: None,
                temperature: None,
                welcome_message: None,
                fallback_message: None,
                status: Some(BotStatus::Active),
                knowledge_base_id: Some(kb.id),
            },
            now,
        )
        .await
        .unwrap();
        let (faqs, chunks) = knowledge_for_bot(&tdb, &bot).await.unwrap();
        assert_eq!((faqs.len(), chunks.len()), (1, 1));

        delete_knowledge_base(&tdb, kb.id).await.unwrap();

        let bot = get_bot(&tdb, bot.id).await.unwrap();
        assert_eq!(bot.knowledge_base_id, None);
        assert_eq!(tdb.count::<document::Entity>().await.unwrap(), 0);
        assert_eq!(tdb.count::<document_chunk::Entity>().await.unwrap(), 0);
        assert_eq!(tdb.count::<faq::Entity>().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn faq_validation_and_missing_rows() {
        let tdb = setup().await;
        let now = Utc::now();
        let kb = create_knowledge_base(&tdb, kb_input("FAQ"), now).await.unwrap();
        let blank = FaqInput {
            question: " ".to_string(),
            answer: "x".to_string(),
        };
        assert!(matches!(create_faq(&tdb, kb.id, blank, now).await, Err(AppError::InvalidInput(_))));
        assert!(matches!(delete_faq(&tdb, 999).await, Err(AppError::NotFound(_))));
        let orphan = FaqInput {
            question: "q".to_string(),
            answer: "a".to_string(),
        };
        assert!(matches!(create_faq(&tdb, 999, orphan, now).await, Err(AppError::NotFound(_))));
    }
}
