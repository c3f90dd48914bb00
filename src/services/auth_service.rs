use axum::{
    Extension, Json,
    extract::State,
};
use bcrypt::{hash, verify};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, DatabaseConnection, EntityTrait,
    QueryFilter, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::db::entities::{subscription, tenant, user};
use crate::db::enums::{Plan, Role, SubscriptionStatus};
use crate::server::config::ServerConfig;
use crate::services::lockout::LoginAttemptTracker;
use crate::services::tenant_resolution::validate_subdomain;
use crate::services::trial;
use crate::web::AppState;
use crate::web::error::AppError;
use crate::web::models::{
    AuthenticatedUser, Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse,
    UserResponse,
};

pub const TOKEN_LIFETIME_HOURS: i64 = 24;
pub const MIN_PASSWORD_LEN: usize = 8;

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn validate_email(email: &str) -> Result<(), AppError> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    };
    if !valid || email.len() > 254 || email.contains(char::is_whitespace) {
        return Err(AppError::InvalidInput("A valid email address is required.".to_string()));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::InvalidInput(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters."
        )));
    }
    Ok(())
}

pub fn hash_password(password: &str, cost: u32) -> Result<String, AppError> {
    hash(password, cost).map_err(|e| AppError::PasswordHashingError(format!("Failed to hash password: {e}")))
}

pub fn verify_password(password: &str, password_hash: &str) -> Result<bool, AppError> {
    verify(password, password_hash)
        .map_err(|e| AppError::InternalServerError(format!("Password verification failed: {e}")))
}

/// Signs up a new workspace: tenant, owner account and trial subscription are
/// created together or not at all.
pub async fn register_tenant(
    pool: &DatabaseConnection,
    config: &ServerConfig,
    req: RegisterRequest,
) -> Result<RegisterResponse, AppError> {
    let company_name = req.company_name.trim().to_string();
    let name = req.name.trim().to_string();
    let email = normalize_email(&req.email);
    let subdomain = req.subdomain.trim().to_lowercase();

    if company_name.is_empty() || name.is_empty() {
        return Err(AppError::InvalidInput("Company name and your name are required.".to_string()));
    }
    validate_subdomain(&subdomain).map_err(AppError::InvalidInput)?;
    validate_email(&email)?;
    validate_password(&req.password)?;

    let subdomain_taken = tenant::Entity::find()
        .filter(tenant::Column::Subdomain.eq(&subdomain))
        .one(pool)
        .await?
        .is_some();
    if subdomain_taken {
        return Err(AppError::AlreadyExists("Subdomain is already taken.".to_string()));
    }
    let email_taken = user::Entity::find()
        .filter(user::Column::Email.eq(&email))
        .one(pool)
        .await?
        .is_some();
    if email_taken {
        return Err(AppError::AlreadyExists("Email is already registered.".to_string()));
    }

    let password_hash = hash_password(&req.password, config.bcrypt_cost)?;
    let now = Utc::now();

    // Unique constraints still guard against a concurrent signup racing the checks above.
    let txn = pool.begin().await?;

    let tenant_model = tenant::ActiveModel {
        id: NotSet,
        name: Set(company_name),
        subdomain: Set(subdomain),
        custom_domain: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&txn)
    .await?;

    let owner = user::ActiveModel {
        id: NotSet,
        tenant_id: Set(tenant_model.id),
        email: Set(email),
        name: Set(name),
        password_hash: Set(password_hash),
        role: Set(Role::Owner),
        is_active: Set(true),
        last_login_at: Set(Some(now)),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&txn)
    .await?;

    let subscription_model = subscription::ActiveModel {
        id: NotSet,
        tenant_id: Set(tenant_model.id),
        plan: Set(Plan::Starter),
        status: Set(SubscriptionStatus::Trialing),
        trial_ends_at: Set(Some(trial::trial_ends_at(now, config.trial_days))),
        current_period_end: Set(None),
        external_id: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;

    info!(
        tenant_id = tenant_model.id,
        subdomain = %tenant_model.subdomain,
        user_id = owner.id,
        "Registered new tenant."
    );

    let token = create_jwt_for_user(&owner, &config.jwt_secret, now)?;
    Ok(RegisterResponse {
        tenant: tenant_model,
        user: owner.into(),
        subscription: subscription_model,
        token,
    })
}

/// Verifies credentials and issues a token.
///
/// `host_tenant` is the tenant resolved from the request host, if any. Users
/// of other tenants cannot sign in through it.
pub async fn login_user(
    pool: &DatabaseConnection,
    tracker: &LoginAttemptTracker,
    req: LoginRequest,
    config: &ServerConfig,
    host_tenant: Option<i32>,
    now: DateTime<Utc>,
) -> Result<LoginResponse, AppError> {
    let email = normalize_email(&req.email);
    if email.is_empty() || req.password.is_empty() {
        return Err(AppError::InvalidInput("Email and password are required.".to_string()));
    }

    if let Some(remaining) = tracker.locked_for(&email, now) {
        return Err(AppError::TooManyRequests {
            message: "Too many failed login attempts. Try again later.".to_string(),
            retry_after_secs: remaining.num_seconds().max(1) as u64,
        });
    }

    let found = user::Entity::find()
        .filter(user::Column::Email.eq(&email))
        .one(pool)
        .await?
        .filter(|u| host_tenant.map_or(true, |host| host == u.tenant_id));

    let verified = match &found {
        Some(u) => verify_password(&req.password, &u.password_hash)?,
        None => {
            // Unknown accounts take as long to reject as wrong passwords.
            hash_password(&req.password, config.bcrypt_cost)?;
            false
        }
    };
    let user = match found {
        Some(u) if verified => u,
        _ => {
            tracker.record_failure(&email, now);
            warn!(email = %email, "Failed login attempt.");
            return Err(AppError::InvalidCredentials);
        }
    };

    if !user.is_active {
        return Err(AppError::Unauthorized("This account has been deactivated.".to_string()));
    }

    tracker.record_success(&email);

    let mut active: user::ActiveModel = user.into();
    active.last_login_at = Set(Some(now));
    let user = active.update(pool).await?;

    let token = create_jwt_for_user(&user, &config.jwt_secret, now)?;
    Ok(LoginResponse {
        token,
        user: user.into(),
    })
}

pub fn create_jwt_for_user(
    user: &user::Model,
    jwt_secret: &str,
    now: DateTime<Utc>,
) -> Result<String, AppError> {
    // Token valid for 24 hours
    let expiration = (now + Duration::hours(TOKEN_LIFETIME_HOURS)).timestamp() as usize;

    let claims = Claims {
        sub: user.email.clone(),
        user_id: user.id,
        tenant_id: user.tenant_id,
        role: user.role,
        exp: expiration,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(jwt_secret.as_ref()))
        .map_err(|e| AppError::TokenCreationError(format!("Failed to sign token: {e}")))
}

pub fn decode_token(token: &str, jwt_secret: &str) -> Result<Claims, AppError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_ref()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| {
        warn!(error = ?e, "JWT decoding failed.");
        AppError::Unauthorized("Invalid or expired token.".to_string())
    })
}

pub async fn me(
    Extension(user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<UserResponse>, AppError> {
    let model = user::Entity::find_by_id(user.id)
        .one(&app_state.db_pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found.".to_string()))?;
    Ok(Json(model.into()))
}
