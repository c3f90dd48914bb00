pub mod analytics_routes;
pub mod billing_routes;
pub mod bot_routes;
pub mod conversation_routes;
pub mod knowledge_routes;
pub mod notification_routes;
pub mod public_routes;
pub mod team_routes;
pub mod tenant_routes;
pub mod user_routes;
pub mod widget_routes;
