use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveValue::NotSet, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    Set,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::db::entities::{bot, widget};
use crate::db::services::subscription_service::{Quota, ensure_can_create, ensure_paid_access};
use crate::db::TenantDb;
use crate::services::tenant_resolution::normalize_host;
use crate::web::error::AppError;

pub const DEFAULT_THEME_COLOR: &str = "#2563eb";
pub const POSITIONS: &[&str] = &["bottom-right", "bottom-left"];

#[derive(Debug, Clone, Deserialize)]
pub struct WidgetInput {
    pub bot_id: i32,
    pub name: String,
    #[serde(default)]
    pub allowed_domains: Vec<String>,
    pub theme_color: Option<String>,
    pub position: Option<String>,
    pub greeting: Option<String>,
    pub is_active: Option<bool>,
}

/// What the embed script needs to render; safe to expose without authentication.
#[derive(Debug, Serialize)]
pub struct PublicWidgetConfig {
    pub public_key: String,
    pub name: String,
    pub theme_color: String,
    pub position: String,
    pub greeting: Option<String>,
    pub bot_name: String,
    pub welcome_message: String,
}

pub fn generate_public_key() -> String {
    Uuid::new_v4().simple().to_string()
}

fn valid_theme_color(color: &str) -> bool {
    let Some(hex) = color.strip_prefix('#') else {
        return false;
    };
    matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit())
}

/// Normalises one allow-list entry: a host name, optionally prefixed with `*.`.
fn normalize_domain_pattern(raw: &str) -> Result<String, AppError> {
    let raw = raw.trim();
    let without_scheme = raw
        .strip_prefix("https://")
        .or_else(|| raw.strip_prefix("http://"))
        .unwrap_or(raw)
        .trim_end_matches('/');
    let (wildcard, host) = match without_scheme.strip_prefix("*.") {
        Some(rest) => (true, rest),
        None => (false, without_scheme),
    };
    let host = normalize_host(host);
    let valid = !host.is_empty()
        && host
            .split('.')
            .all(|label| !label.is_empty() && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'));
    if !valid {
        return Err(AppError::InvalidInput(format!("'{raw}' is not a valid domain.")));
    }
    Ok(if wildcard { format!("*.{host}") } else { host })
}

fn encode_allowed_domains(domains: &[String]) -> Result<String, AppError> {
    let mut normalized = Vec::new();
    for d in domains.iter().filter(|d| !d.trim().is_empty()) {
        let pattern = normalize_domain_pattern(d)?;
        if !normalized.contains(&pattern) {
            normalized.push(pattern);
        }
    }
    Ok(normalized.join(","))
}

pub fn allowed_domains(widget: &widget::Model) -> Vec<&str> {
    widget
        .allowed_domains
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .collect()
}

/// Whether a request `Origin` may use the widget. An empty allow-list accepts any origin.
pub fn origin_allowed(widget: &widget::Model, origin: Option<&str>) -> bool {
    let patterns = allowed_domains(widget);
    if patterns.is_empty() {
        return true;
    }
    let Some(origin) = origin else {
        return false;
    };
    let host = origin.split_once("://").map_or(origin, |(_, rest)| rest);
    let host = normalize_host(host.split('/').next().unwrap_or_default());
    if host.is_empty() {
        return false;
    }

    patterns.iter().any(|pattern| match pattern.strip_prefix("*.") {
        Some(parent) => host
            .strip_suffix(parent)
            .is_some_and(|prefix| prefix.len() > 1 && prefix.ends_with('.')),
        None => host == *pattern,
    })
}

struct ValidWidget {
    bot_id: i32,
    name: String,
    allowed_domains: String,
    theme_color: String,
    position: String,
    greeting: Option<String>,
    is_active: bool,
}

async fn validate(tdb: &TenantDb, input: WidgetInput) -> Result<ValidWidget, AppError> {
    let name = input.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::InvalidInput("Widget name is required.".to_string()));
    }
    if tdb.find_by_id::<bot::Entity>(input.bot_id).await?.is_none() {
        return Err(AppError::InvalidInput(format!("Bot {} does not exist.", input.bot_id)));
    }
    let theme_color = input
        .theme_color
        .map(|c| c.trim().to_lowercase())
        .unwrap_or_else(|| DEFAULT_THEME_COLOR.to_string());
    if !valid_theme_color(&theme_color) {
        return Err(AppError::InvalidInput("Theme color must be a hex color like #2563eb.".to_string()));
    }
    let position = input.position.unwrap_or_else(|| POSITIONS[0].to_string());
    if !POSITIONS.contains(&position.as_str()) {
        return Err(AppError::InvalidInput(format!(
            "Position must be one of: {}.",
            POSITIONS.join(", ")
        )));
    }

    Ok(ValidWidget {
        bot_id: input.bot_id,
        name,
        allowed_domains: encode_allowed_domains(&input.allowed_domains)?,
        theme_color,
        position,
        greeting: input.greeting.filter(|g| !g.trim().is_empty()),
        is_active: input.is_active.unwrap_or(true),
    })
}

pub async fn list_widgets(tdb: &TenantDb) -> Result<Vec<widget::Model>, AppError> {
    Ok(tdb
        .find::<widget::Entity>()
        .order_by_asc(widget::Column::Id)
        .all(tdb.conn())
        .await?)
}

pub async fn get_widget(tdb: &TenantDb, id: i32) -> Result<widget::Model, AppError> {
    Ok(tdb.get::<widget::Entity>(id).await?)
}

pub async fn create_widget(tdb: &TenantDb, input: WidgetInput, now: DateTime<Utc>) -> Result<widget::Model, AppError> {
    ensure_can_create(tdb, Quota::Widgets, now).await?;
    let v = validate(tdb, input).await?;
    let created = tdb
        .insert(widget::ActiveModel {
            id: NotSet,
            tenant_id: NotSet,
            bot_id: Set(v.bot_id),
            name: Set(v.name),
            public_key: Set(generate_public_key()),
            allowed_domains: Set(v.allowed_domains),
            theme_color: Set(v.theme_color),
            position: Set(v.position),
            greeting: Set(v.greeting),
            is_active: Set(v.is_active),
            created_at: Set(now),
            updated_at: Set(now),
        })
        .await?;
    info!(tenant_id = tdb.tenant_id(), widget_id = created.id, bot_id = created.bot_id, "Widget created.");
    Ok(created)
}

pub async fn update_widget(
    tdb: &TenantDb,
    id: i32,
    input: WidgetInput,
    now: DateTime<Utc>,
) -> Result<widget::Model, AppError> {
    let existing = tdb.get::<widget::Entity>(id).await?;
    ensure_paid_access(tdb, now).await?;
    let v = validate(tdb, input).await?;

    let mut active: widget::ActiveModel = existing.into();
    active.bot_id = Set(v.bot_id);
    active.name = Set(v.name);
    active.allowed_domains = Set(v.allowed_domains);
    active.theme_color = Set(v.theme_color);
    active.position = Set(v.position);
    active.greeting = Set(v.greeting);
    active.is_active = Set(v.is_active);
    active.updated_at = Set(now);
    Ok(tdb.update(active).await?)
}

pub async fn delete_widget(tdb: &TenantDb, id: i32) -> Result<(), AppError> {
    if tdb.delete::<widget::Entity>(id).await? == 0 {
        return Err(AppError::NotFound(format!("Widget {id} not found.")));
    }
    info!(tenant_id = tdb.tenant_id(), widget_id = id, "Widget deleted.");
    Ok(())
}

/// Issues a new public key. Embeds using the old key stop working immediately.
pub async fn rotate_widget_key(tdb: &TenantDb, id: i32, now: DateTime<Utc>) -> Result<widget::Model, AppError> {
    let existing = tdb.get::<widget::Entity>(id).await?;
    let mut active: widget::ActiveModel = existing.into();
    active.public_key = Set(generate_public_key());
    active.updated_at = Set(now);
    let updated = tdb.update(active).await?;
    info!(tenant_id = tdb.tenant_id(), widget_id = id, "Widget key rotated.");
    Ok(updated)
}

/// Looks up an active widget by its public key, across all tenants.
pub async fn find_active_widget_by_key(
    db: &DatabaseConnection,
    public_key: &str,
) -> Result<widget::Model, AppError> {
    widget::Entity::find()
        .filter(widget::Column::PublicKey.eq(public_key))
        .filter(widget::Column::IsActive.eq(true))
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Widget not found.".to_string()))
}

pub async fn public_widget_config(
    db: &DatabaseConnection,
    public_key: &str,
) -> Result<PublicWidgetConfig, AppError> {
    let widget = find_active_widget_by_key(db, public_key).await?;
    let tdb = TenantDb::new(db.clone(), widget.tenant_id);
    let bot = tdb.get::<bot::Entity>(widget.bot_id).await?;
    Ok(PublicWidgetConfig {
        public_key: widget.public_key,
        name: widget.name,
        theme_color: widget.theme_color,
        position: widget.position,
        greeting: widget.greeting,
        bot_name: bot.name,
        welcome_message: bot.welcome_message,
    })
}
