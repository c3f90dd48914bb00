//! SeaORM entities, one module per table.
//!
//! Every table except `tenants` carries a `tenant_id` column; see
//! [`crate::db::tenant_db`] for the boundary that keeps queries inside one tenant.

pub mod bot;
pub mod conversation;
pub mod document;
pub mod document_chunk;
pub mod faq;
pub mod knowledge_base;
pub mod message;
pub mod notification;
pub mod subscription;
pub mod tenant;
pub mod user;
pub mod widget;

pub mod prelude {
    pub use super::bot::Entity as Bot;
    pub use super::bot::Model as BotModel;

    pub use super::conversation::Entity as Conversation;
    pub use super::conversation::Model as ConversationModel;

    pub use super::document::Entity as Document;
    pub use super::document::Model as DocumentModel;

    pub use super::document_chunk::Entity as DocumentChunk;
    pub use super::document_chunk::Model as DocumentChunkModel;

    pub use super::faq::Entity as Faq;
    pub use super::faq::Model as FaqModel;

    pub use super::knowledge_base::Entity as KnowledgeBase;
    pub use super::knowledge_base::Model as KnowledgeBaseModel;

    pub use super::message::Entity as Message;
    pub use super::message::Model as MessageModel;

    pub use super::notification::Entity as Notification;
    pub use super::notification::Model as NotificationModel;

    pub use super::subscription::Entity as Subscription;
    pub use super::subscription::Model as SubscriptionModel;

    pub use super::tenant::Entity as Tenant;
    pub use super::tenant::Model as TenantModel;

    pub use super::user::Entity as User;
    pub use super::user::Model as UserModel;

    pub use super::widget::Entity as Widget;
    pub use super::widget::Model as WidgetModel;
}
