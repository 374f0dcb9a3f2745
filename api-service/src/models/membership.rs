//! Membership model - binds a user to an organization with a role.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Organization role. Declaration order is the privilege order, so the derived
/// `Ord` gives `Member < Admin < Owner`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Member,
    Admin,
    Owner,
}

const MEMBER_SCOPES: &[&str] = &[
    "organization:read",
    "organization:memberships:list",
    "organization:memberships:read",
    "organization:invitations:list",
    "organization:invitations:read",
];

const ADMIN_SCOPES: &[&str] = &[
    "organization:read",
    "organization:update",
    "organization:memberships:list",
    "organization:memberships:read",
    "organization:memberships:create",
    "organization:memberships:update",
    "organization:memberships:delete",
    "organization:invitations:list",
    "organization:invitations:read",
    "organization:invitations:create",
    "organization:invitations:update",
    "organization:invitations:delete",
    "organization:stripe:update",
    "organization:billing:update",
];

const OWNER_SCOPES: &[&str] = &[
    "organization:read",
    "organization:update",
    "organization:delete",
    "organization:memberships:list",
    "organization:memberships:read",
    "organization:memberships:create",
    "organization:memberships:update",
    "organization:memberships:delete",
    "organization:invitations:list",
    "organization:invitations:read",
    "organization:invitations:create",
    "organization:invitations:update",
    "organization:invitations:delete",
    "organization:stripe:update",
    "organization:billing:update",
];

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Admin => "admin",
            Role::Owner => "owner",
        }
    }

    /// The one comparison every guard goes through.
    pub fn at_least(self, required: Role) -> bool {
        self >= required
    }

    pub fn scopes(self) -> &'static [&'static str] {
        match self {
            Role::Member => MEMBER_SCOPES,
            Role::Admin => ADMIN_SCOPES,
            Role::Owner => OWNER_SCOPES,
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "member" => Ok(Role::Member),
            "admin" => Ok(Role::Admin),
            "owner" => Ok(Role::Owner),
            _ => Err(format!("Invalid organization role: {}", s)),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Membership entity.
#[derive(Debug, Clone, FromRow)]
pub struct Membership {
    pub membership_id: Uuid,
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub role_code: String,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Membership {
    pub fn new(organization_id: Uuid, user_id: Uuid, role: Role) -> Self {
        let now = Utc::now();
        Self {
            membership_id: Uuid::new_v4(),
            organization_id,
            user_id,
            role_code: role.as_str().to_string(),
            created_utc: now,
            updated_utc: now,
        }
    }

    /// Unknown codes degrade to the least privileged role.
    pub fn role(&self) -> Role {
        self.role_code.parse().unwrap_or_else(|e: String| {
            tracing::warn!(membership_id = %self.membership_id, error = %e, "Unrecognized role code");
            Role::Member
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_form_a_total_order() {
        assert!(Role::Member < Role::Admin);
        assert!(Role::Admin < Role::Owner);
        assert!(Role::Owner.at_least(Role::Admin));
        assert!(Role::Admin.at_least(Role::Admin));
        assert!(!Role::Member.at_least(Role::Admin));
        assert!(!Role::Admin.at_least(Role::Owner));
    }

    #[test]
    fn higher_roles_hold_every_lower_scope() {
        for scope in Role::Member.scopes() {
            assert!(Role::Admin.scopes().contains(scope), "admin lacks {scope}");
        }
        for scope in Role::Admin.scopes() {
            assert!(Role::Owner.scopes().contains(scope), "owner lacks {scope}");
        }
        assert!(Role::Admin.scopes().len() > Role::Member.scopes().len());
        assert!(!Role::Admin.scopes().contains(&"organization:delete"));
    }

    #[test]
    fn member_scopes_are_read_only() {
        for scope in Role::Member.scopes() {
            assert!(
                scope.ends_with(":read") || scope.ends_with(":list"),
                "unexpected member scope {scope}"
            );
        }
    }

    #[test]
    fn role_codes_round_trip_through_storage() {
        let membership = Membership::new(Uuid::new_v4(), Uuid::new_v4(), Role::Owner);
        assert_eq!(membership.role_code, "owner");
        assert_eq!(membership.role(), Role::Owner);
        assert!("superuser".parse::<Role>().is_err());
    }
}
