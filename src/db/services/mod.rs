//! The `services` module holds every query the HTTP layer needs.
//!
//! Each sub-module owns one area of the product (bots, knowledge, widgets,
//! billing and so on). Tenant-owned data is always reached through a
//! [`TenantDb`](crate::db::TenantDb); only the public widget lookups, tenant
//! resolution and the billing webhook work on the raw connection.
//! Public items are re-exported here so callers can use `crate::db::services::*`.

pub mod analytics_service;
pub mod bot_service;
pub mod chat_service;
pub mod conversation_service;
pub mod knowledge_service;
pub mod notification_service;
pub mod subscription_service;
pub mod tenant_service;
pub mod user_service;
pub mod widget_service;

pub use analytics_service::*;
pub use bot_service::*;
pub use chat_service::*;
pub use conversation_service::*;
pub use knowledge_service::*;
pub use notification_service::*;
pub use subscription_service::*;
pub use tenant_service::*;
pub use user_service::*;
pub use widget_service::*;
