//! Tenant membership: invitations, role changes, deactivation and self-service profile edits.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue::NotSet, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set};
use serde::Deserialize;
use tracing::info;

use crate::db::entities::user;
use crate::db::enums::Role;
use crate::db::TenantDb;
use crate::services::auth_service::{
    hash_password, normalize_email, validate_email, validate_password, verify_password,
};
use crate::web::error::AppError;
use crate::web::models::AuthenticatedUser;

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub name: String,
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

pub async fn list_users(tdb: &TenantDb) -> Result<Vec<user::Model>, AppError> {
    Ok(tdb
        .find::<user::Entity>()
        .order_by_asc(user::Column::CreatedAt)
        .order_by_asc(user::Column::Id)
        .all(tdb.conn())
        .await?)
}

async fn ensure_email_free(tdb: &TenantDb, email: &str, except: Option<i32>) -> Result<(), AppError> {
    // Emails are unique across all tenants.
    let existing = user::Entity::find()
        .filter(user::Column::Email.eq(email))
        .one(tdb.conn())
        .await?;
    match existing {
        Some(u) if Some(u.id) != except => {
            Err(AppError::AlreadyExists("Email is already registered.".to_string()))
        }
        _ => Ok(()),
    }
}

pub async fn create_user(
    tdb: &TenantDb,
    actor: &AuthenticatedUser,
    req: CreateUserRequest,
    bcrypt_cost: u32,
    now: DateTime<Utc>,
) -> Result<user::Model, AppError> {
    if !actor.role.can_assign(req.role) {
        return Err(AppError::Forbidden(format!("You cannot assign the {} role.", req.role)));
    }
    let email = normalize_email(&req.email);
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::InvalidInput("Name is required.".to_string()));
    }
    validate_email(&email)?;
    validate_password(&req.password)?;
    ensure_email_free(tdb, &email, None).await?;

    let created = tdb
        .insert(user::ActiveModel {
            id: NotSet,
            tenant_id: NotSet,
            email: Set(email),
            name: Set(name),
            password_hash: Set(hash_password(&req.password, bcrypt_cost)?),
            role: Set(req.role),
            is_active: Set(true),
            last_login_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        })
        .await?;
    info!(tenant_id = tdb.tenant_id(), user_id = created.id, role = %created.role, "User added to tenant.");
    Ok(created)
}

async fn active_owner_count(tdb: &TenantDb) -> Result<u64, AppError> {
    Ok(tdb
        .find::<user::Entity>()
        .filter(user::Column::Role.eq(Role::Owner))
        .filter(user::Column::IsActive.eq(true))
        .count(tdb.conn())
        .await?)
}

/// Loads the target of a membership change and checks the actor may manage it.
async fn managed_target(
    tdb: &TenantDb,
    actor: &AuthenticatedUser,
    user_id: i32,
    action: &str,
) -> Result<user::Model, AppError> {
    if actor.id == user_id {
        return Err(AppError::Forbidden(format!("You cannot {action} your own account.")));
    }
    let target = tdb.get::<user::Entity>(user_id).await?;
    if !actor.role.can_assign(target.role) {
        return Err(AppError::Forbidden(format!(
            "You cannot manage a user with the {} role.",
            target.role
        )));
    }
    Ok(target)
}

/// Fails when `target` is the only active owner left.
async fn ensure_not_last_owner(tdb: &TenantDb, target: &user::Model) -> Result<(), AppError> {
    if target.role == Role::Owner && target.is_active && active_owner_count(tdb).await? <= 1 {
        return Err(AppError::Conflict("A workspace must keep at least one active owner.".to_string()));
    }
    Ok(())
}

pub async fn update_user_role(
    tdb: &TenantDb,
    actor: &AuthenticatedUser,
    user_id: i32,
    role: Role,
    now: DateTime<Utc>,
) -> Result<user::Model, AppError> {
    let target = managed_target(tdb, actor, user_id, "change the role of").await?;
    if !actor.role.can_assign(role) {
        return Err(AppError::Forbidden(format!("You cannot assign the {role} role.")));
    }
    if target.role == role {
        return Ok(target);
    }
    ensure_not_last_owner(tdb, &target).await?;

    let mut active: user::ActiveModel = target.into();
    active.role = Set(role);
    active.updated_at = Set(now);
    let updated = tdb.update(active).await?;
    info!(tenant_id = tdb.tenant_id(), user_id, role = %role, "User role changed.");
    Ok(updated)
}

pub async fn set_user_active(
    tdb: &TenantDb,
    actor: &AuthenticatedUser,
    user_id: i32,
    is_active: bool,
    now: DateTime<Utc>,
) -> Result<user::Model, AppError> {
    let action = if is_active { "reactivate" } else { "deactivate" };
    let target = managed_target(tdb, actor, user_id, action).await?;
    if target.is_active == is_active {
        return Ok(target);
    }
    if !is_active {
        ensure_not_last_owner(tdb, &target).await?;
    }

    let mut active: user::ActiveModel = target.into();
    active.is_active = Set(is_active);
    active.updated_at = Set(now);
    let updated = tdb.update(active).await?;
    info!(tenant_id = tdb.tenant_id(), user_id, is_active, "User activation changed.");
    Ok(updated)
}

pub async fn delete_user(tdb: &TenantDb, actor: &AuthenticatedUser, user_id: i32) -> Result<(), AppError> {
    let target = managed_target(tdb, actor, user_id, "remove").await?;
    ensure_not_last_owner(tdb, &target).await?;
    tdb.delete::<user::Entity>(target.id).await?;
    info!(tenant_id = tdb.tenant_id(), user_id, "User removed from tenant.");
    Ok(())
}

pub async fn update_profile(
    tdb: &TenantDb,
    user_id: i32,
    req: UpdateProfileRequest,
    now: DateTime<Utc>,
) -> Result<user::Model, AppError> {
    let current = tdb.get::<user::Entity>(user_id).await?;
    let mut active: user::ActiveModel = current.into();

    if let Some(name) = req.name {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::InvalidInput("Name cannot be empty.".to_string()));
        }
        active.name = Set(name);
    }
    if let Some(email) = req.email {
        let email = normalize_email(&email);
        validate_email(&email)?;
        ensure_email_free(tdb, &email, Some(user_id)).await?;
        active.email = Set(email);
    }
    active.updated_at = Set(now);
    Ok(tdb.update(active).await?)
}

pub async fn change_password(
    tdb: &TenantDb,
    user_id: i32,
    req: ChangePasswordRequest,
    bcrypt_cost: u32,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let current = tdb.get::<user::Entity>(user_id).await?;
    if !verify_password(&req.current_password, &current.password_hash)? {
        return Err(AppError::InvalidCredentials);
    }
    validate_password(&req.new_password)?;

    let mut active: user::ActiveModel = current.into();
    active.password_hash = Set(hash_password(&req.new_password, bcrypt_cost)?);
    active.updated_at = Set(now);
    tdb.update(active).await?;
    info!(tenant_id = tdb.tenant_id(), user_id, "Password changed.");
    Ok(())
}
