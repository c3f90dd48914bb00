//! Host-based tenant resolution and the per-request [`TenantDb`] extractor.

use axum::{
    body::Body as AxumBody,
    extract::{FromRequestParts, State},
    http::{Request, header, request::Parts},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::debug;

use crate::db::TenantDb;
use crate::db::entities::tenant;
use crate::services::tenant_resolution::resolve_tenant;
use crate::web::models::AuthenticatedUser;
use crate::web::{AppState, error::AppError};

/// The tenant addressed by the request host, `None` on platform hosts.
#[derive(Debug, Clone)]
pub struct ResolvedTenant(pub Option<tenant::Model>);

pub async fn resolve(
    State(state): State<Arc<AppState>>,
    mut req: Request<AxumBody>,
    next: Next,
) -> Result<Response, AppError> {
    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| req.uri().host())
        .unwrap_or_default()
        .to_string();

    let resolved = resolve_tenant(&state.db_pool, &host, &state.config.base_domain).await?;
    if let Some(t) = &resolved {
        debug!(host = %host, tenant_id = t.id, "Resolved tenant from host.");
    }
    req.extensions_mut().insert(ResolvedTenant(resolved));
    Ok(next.run(req).await)
}

impl FromRequestParts<Arc<AppState>> for TenantDb {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let user = parts
            .extensions
            .get::<AuthenticatedUser>()
            .ok_or_else(|| AppError::Unauthorized("Authentication required.".to_string()))?;
        Ok(TenantDb::new(state.db_pool.clone(), user.tenant_id))
    }
}
