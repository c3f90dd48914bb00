use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::db::entities::tenant;
use crate::db::services::subscription_service::billing_overview;
use crate::db::TenantDb;
use crate::services::tenant_resolution::{validate_custom_domain, validate_subdomain};
use crate::web::error::AppError;
use crate::web::models::TenantOverview;

#[derive(Debug, Deserialize)]
pub struct UpdateTenantRequest {
    pub name: Option<String>,
    /// An empty string removes the custom domain.
    pub custom_domain: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubdomainAvailability {
    pub subdomain: String,
    pub available: bool,
    pub reason: Option<String>,
}

pub async fn get_tenant(tdb: &TenantDb) -> Result<tenant::Model, AppError> {
    tenant::Entity::find_by_id(tdb.tenant_id())
        .one(tdb.conn())
        .await?
        .ok_or_else(|| AppError::NotFound("Tenant not found.".to_string()))
}

pub async fn tenant_overview(tdb: &TenantDb, now: DateTime<Utc>) -> Result<TenantOverview, AppError> {
    Ok(TenantOverview {
        tenant: get_tenant(tdb).await?,
        billing: billing_overview(tdb, now).await?,
    })
}

pub async fn update_tenant(
    tdb: &TenantDb,
    req: UpdateTenantRequest,
    base_domain: &str,
    now: DateTime<Utc>,
) -> Result<tenant::Model, AppError> {
    let current = get_tenant(tdb).await?;
    let mut active: tenant::ActiveModel = current.clone().into();

    if let Some(name) = req.name {
        let name = name.trim().to_string();
        if name.is_empty() || name.chars().count() > 200 {
            return Err(AppError::InvalidInput("Name must be 1 to 200 characters.".to_string()));
        }
        active.name = Set(name);
    }

    if let Some(domain) = req.custom_domain {
        if domain.trim().is_empty() {
            active.custom_domain = Set(None);
        } else {
            let domain = validate_custom_domain(&domain, base_domain).map_err(AppError::InvalidInput)?;
            let taken = tenant::Entity::find()
                .filter(tenant::Column::CustomDomain.eq(&domain))
                .filter(tenant::Column::Id.ne(current.id))
                .one(tdb.conn())
                .await?
                .is_some();
            if taken {
                return Err(AppError::Conflict("Custom domain is already in use.".to_string()));
            }
            info!(tenant_id = current.id, domain = %domain, "Custom domain set.");
            active.custom_domain = Set(Some(domain));
        }
    }

    active.updated_at = Set(now);
    Ok(active.update(tdb.conn()).await?)
}

pub async fn subdomain_availability(
    db: &DatabaseConnection,
    subdomain: &str,
) -> Result<SubdomainAvailability, AppError> {
    let subdomain = subdomain.trim().to_lowercase();
    if let Err(reason) = validate_subdomain(&subdomain) {
        return Ok(SubdomainAvailability {
            subdomain,
            available: false,
            reason: Some(reason),
        });
    }
    let taken = tenant::Entity::find()
        .filter(tenant::Column::Subdomain.eq(&subdomain))
        .one(db)
        .await?
        .is_some();
    Ok(SubdomainAvailability {
        subdomain,
        available: !taken,
        reason: taken.then(|| "Subdomain is already taken.".to_string()),
    })
}
