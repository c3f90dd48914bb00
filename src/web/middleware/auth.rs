use axum::{
    body::Body as AxumBody,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use sea_orm::EntityTrait;
use std::sync::Arc;
use tracing::warn;

use crate::db::entities::user;
use crate::services::auth_service::decode_token;
use crate::web::middleware::tenant::ResolvedTenant;
use crate::web::models::AuthenticatedUser;
use crate::web::{AppState, error::AppError};

pub async fn auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut req: Request<AxumBody>,
    next: Next,
) -> Result<Response, AppError> {
    // Authorization header first, then the session cookie
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(|s| s.to_string())
        .or_else(|| jar.get("token").map(|c| c.value().to_string()))
        .ok_or_else(|| AppError::Unauthorized("Authentication required.".to_string()))?;

    let claims = decode_token(&token, &state.config.jwt_secret)?;

    // Reload so role changes and deactivation apply to tokens already issued.
    let user = user::Entity::find_by_id(claims.user_id)
        .one(&state.db_pool)
        .await?
        .filter(|u| u.tenant_id == claims.tenant_id)
        .ok_or_else(|| AppError::Unauthorized("Invalid or expired token.".to_string()))?;
    if !user.is_active {
        return Err(AppError::Unauthorized("This account has been deactivated.".to_string()));
    }

    if let Some(ResolvedTenant(Some(host_tenant))) = req.extensions().get::<ResolvedTenant>() {
        if host_tenant.id != user.tenant_id {
            warn!(
                user_id = user.id,
                token_tenant = user.tenant_id,
                host_tenant = host_tenant.id,
                "Token used on another tenant's host."
            );
            return Err(AppError::Forbidden(
                "This account does not belong to this workspace.".to_string(),
            ));
        }
    }

    req.extensions_mut().insert(AuthenticatedUser {
        id: user.id,
        tenant_id: user.tenant_id,
        email: user.email,
        role: user.role,
    });
    Ok(next.run(req).await)
}
