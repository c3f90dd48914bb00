use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::entities::{subscription, tenant, user};
use crate::db::enums::Role;
use crate::services::trial::{PlanLimits, TrialStatus};

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub company_name: String,
    pub subdomain: String,
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i32,
    pub tenant_id: i32,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl From<user::Model> for UserResponse {
    fn from(u: user::Model) -> Self {
        UserResponse {
            id: u.id,
            tenant_id: u.tenant_id,
            email: u.email,
            name: u.name,
            role: u.role,
            is_active: u.is_active,
            last_login_at: u.last_login_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserResponse,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub tenant: tenant::Model,
    pub user: UserResponse,
    pub subscription: subscription::Model,
    pub token: String,
}

// JWT Claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // email
    pub user_id: i32,
    pub tenant_id: i32,
    pub role: Role,
    pub exp: usize,
}

/// Struct to hold authenticated user details, to be passed as a request extension.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: i32,
    pub tenant_id: i32,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct Usage {
    pub bots: u64,
    pub widgets: u64,
    pub documents: u64,
    pub messages_this_month: u64,
}

#[derive(Debug, Serialize)]
pub struct BillingOverview {
    pub subscription: Option<subscription::Model>,
    pub trial: Option<TrialStatus>,
    pub can_perform_paid_action: bool,
    pub denial_reason: Option<&'static str>,
    pub limits: Option<PlanLimits>,
    pub usage: Usage,
}

#[derive(Debug, Serialize)]
pub struct TenantOverview {
    pub tenant: tenant::Model,
    #[serde(flatten)]
    pub billing: BillingOverview,
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

impl Pagination {
    pub const MAX_PER_PAGE: u64 = 100;

    /// Zero-based page index and clamped page size.
    pub fn resolve(&self) -> (u64, u64) {
        let per_page = self.per_page.unwrap_or(20).clamp(1, Self::MAX_PER_PAGE);
        let page = self.page.unwrap_or(1).max(1) - 1;
        (page, per_page)
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_is_one_based_and_clamped() {
        let p = Pagination { page: None, per_page: None };
        assert_eq!(p.resolve(), (0, 20));

        let p = Pagination { page: Some(0), per_page: Some(1000) };
        assert_eq!(p.resolve(), (0, Pagination::MAX_PER_PAGE));

        let p = Pagination { page: Some(3), per_page: Some(0) };
        assert_eq!(p.resolve(), (2, 1));
    }
}
