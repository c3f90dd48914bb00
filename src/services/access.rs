//! Role/permission model: a static allow-list per role.

use serde::Serialize;

use crate::db::enums::Role;
use crate::web::error::AppError;
use crate::web::models::AuthenticatedUser;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Permission {
    TenantRead,
    TenantUpdate,
    UsersRead,
    UsersManage,
    BotsRead,
    BotsWrite,
    BotsDelete,
    KnowledgeRead,
    KnowledgeWrite,
    WidgetsRead,
    WidgetsWrite,
    ConversationsRead,
    ConversationsWrite,
    ConversationsDelete,
    BillingRead,
    BillingManage,
    AnalyticsRead,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::TenantRead => "tenant:read",
            Permission::TenantUpdate => "tenant:update",
            Permission::UsersRead => "users:read",
            Permission::UsersManage => "users:manage",
            Permission::BotsRead => "bots:read",
            Permission::BotsWrite => "bots:write",
            Permission::BotsDelete => "bots:delete",
            Permission::KnowledgeRead => "knowledge:read",
            Permission::KnowledgeWrite => "knowledge:write",
            Permission::WidgetsRead => "widgets:read",
            Permission::WidgetsWrite => "widgets:write",
            Permission::ConversationsRead => "conversations:read",
            Permission::ConversationsWrite => "conversations:write",
            Permission::ConversationsDelete => "conversations:delete",
            Permission::BillingRead => "billing:read",
            Permission::BillingManage => "billing:manage",
            Permission::AnalyticsRead => "analytics:read",
        }
    }
}

use Permission::*;

const ALL: &[Permission] = &[
    TenantRead,
    TenantUpdate,
    UsersRead,
    UsersManage,
    BotsRead,
    BotsWrite,
    BotsDelete,
    KnowledgeRead,
    KnowledgeWrite,
    WidgetsRead,
    WidgetsWrite,
    ConversationsRead,
    ConversationsWrite,
    ConversationsDelete,
    BillingRead,
    BillingManage,
    AnalyticsRead,
];

const ADMIN: &[Permission] = &[
    TenantRead,
    TenantUpdate,
    UsersRead,
    UsersManage,
    BotsRead,
    BotsWrite,
    BotsDelete,
    KnowledgeRead,
    KnowledgeWrite,
    WidgetsRead,
    WidgetsWrite,
    ConversationsRead,
    ConversationsWrite,
    ConversationsDelete,
    BillingRead,
    AnalyticsRead,
];

const MEMBER: &[Permission] = &[
    TenantRead,
    UsersRead,
    BotsRead,
    BotsWrite,
    KnowledgeRead,
    KnowledgeWrite,
    WidgetsRead,
    WidgetsWrite,
    ConversationsRead,
    ConversationsWrite,
    AnalyticsRead,
];

const VIEWER: &[Permission] = &[
    TenantRead,
    BotsRead,
    KnowledgeRead,
    WidgetsRead,
    ConversationsRead,
    AnalyticsRead,
];

impl Role {
    pub fn permissions(self) -> &'static [Permission] {
        match self {
            Role::SuperAdmin | Role::Owner => ALL,
            Role::Admin => ADMIN,
            Role::Member => MEMBER,
            Role::Viewer => VIEWER,
        }
    }

    pub fn can(self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }

    /// Whether a user holding `self` may give `target` to someone in the same tenant.
    pub fn can_assign(self, target: Role) -> bool {
        match (self, target) {
            (_, Role::SuperAdmin) => false,
            (Role::SuperAdmin | Role::Owner, _) => true,
            (Role::Admin, Role::Member | Role::Viewer) => true,
            _ => false,
        }
    }
}

pub fn require(user: &AuthenticatedUser, permission: Permission) -> Result<(), AppError> {
    if user.role.can(permission) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "Missing permission '{}'.",
            permission.as_str()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_holds_every_permission() {
        for p in ALL {
            assert!(Role::Owner.can(*p), "{}", p.as_str());
            assert!(Role::SuperAdmin.can(*p), "{}", p.as_str());
        }
    }

    #[test]
    fn only_owner_manages_billing() {
        assert!(Role::Owner.can(BillingManage));
        assert!(!Role::Admin.can(BillingManage));
        assert!(Role::Admin.can(BillingRead));
        assert!(!Role::Member.can(BillingRead));
    }

    #[test]
    fn viewer_is_read_only() {
        for p in Role::Viewer.permissions() {
            assert!(p.as_str().ends_with(":read"), "{}", p.as_str());
        }
        assert!(!Role::Viewer.can(BotsWrite));
    }

    #[test]
    fn role_assignment_rules() {
        assert!(Role::Owner.can_assign(Role::Owner));
        assert!(Role::Owner.can_assign(Role::Admin));
        assert!(Role::Admin.can_assign(Role::Member));
        assert!(Role::Admin.can_assign(Role::Viewer));
        assert!(!Role::Admin.can_assign(Role::Admin));
        assert!(!Role::Admin.can_assign(Role::Owner));
        assert!(!Role::Member.can_assign(Role::Viewer));
        assert!(!Role::Owner.can_assign(Role::SuperAdmin));
    }

    #[test]
    fn permission_strings_are_unique() {
        let mut seen: Vec<&str> = ALL.iter().map(|p| p.as_str()).collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), ALL.len());
    }

    #[test]
    fn require_maps_to_forbidden() {
        let viewer = AuthenticatedUser {
            id: 1,
            tenant_id: 1,
            email: "v@example.com".to_string(),
            role: Role::Viewer,
        };
        assert!(require(&viewer, BotsRead).is_ok());
        assert!(matches!(require(&viewer, BotsDelete), Err(AppError::Forbidden(_))));
    }
}
