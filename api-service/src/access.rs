//! Tenant-scoped authorization rules.
//!
//! Every check reads the current membership from the store. Organization
//! claims carried in the token are never consulted here.

use service_core::error::AppError;
use service_core::observability::record_access_denied;
use uuid::Uuid;

use crate::models::{Identity, Membership, Role, User};
use crate::services::Store;

pub const NOT_A_MEMBER: &str = "You are not a member of this organization";
pub const INSUFFICIENT_ROLE: &str = "Your role does not permit this action";

/// The user behind a verified token. A token whose subject no longer
/// exists is treated as an invalid credential.
pub async fn current_user(store: &dyn Store, identity: &Identity) -> Result<User, AppError> {
    store
        .find_user_by_id(identity.user_id)
        .await?
        .ok_or_else(|| AppError::unauthenticated(format!("token subject {} no longer exists", identity.user_id)))
}

pub async fn require_membership(
    store: &dyn Store,
    organization_id: Uuid,
    user_id: Uuid,
) -> Result<Membership, AppError> {
    match store.find_membership(organization_id, user_id).await? {
        Some(membership) => Ok(membership),
        None => {
            record_access_denied("membership");
            tracing::info!(%organization_id, %user_id, "Access denied: not a member");
            Err(AppError::Forbidden(NOT_A_MEMBER.to_string()))
        }
    }
}

/// Membership check plus `role >= required` on the total role order.
pub async fn require_role(
    store: &dyn Store,
    organization_id: Uuid,
    user_id: Uuid,
    required: Role,
) -> Result<Membership, AppError> {
    let membership = require_membership(store, organization_id, user_id).await?;
    if !membership.role().at_least(required) {
        record_access_denied("role");
        tracing::info!(
            %organization_id,
            %user_id,
            role = membership.role().as_str(),
            required = required.as_str(),
            "Access denied: insufficient role"
        );
        return Err(AppError::Forbidden(INSUFFICIENT_ROLE.to_string()));
    }
    Ok(membership)
}

pub async fn require_platform_admin(store: &dyn Store, identity: &Identity) -> Result<User, AppError> {
    let user = current_user(store, identity).await?;
    if !user.is_platform_admin() {
        record_access_denied("platform_admin");
        return Err(AppError::Forbidden("Platform administrator role required".to_string()));
    }
    Ok(user)
}

/// Whether `actor` may set a membership currently at `current` (None when
/// creating) to `requested`.
pub fn ensure_can_assign(actor: Role, current: Option<Role>, requested: Role) -> Result<(), AppError> {
    if !actor.at_least(Role::Admin) {
        record_access_denied("role");
        return Err(AppError::Forbidden(INSUFFICIENT_ROLE.to_string()));
    }
    if !actor.at_least(requested) {
        record_access_denied("role_grant");
        return Err(AppError::Forbidden(
            "You cannot grant a role above your own".to_string(),
        ));
    }
    if current == Some(Role::Owner) && actor != Role::Owner {
        record_access_denied("owner_membership");
        return Err(AppError::Forbidden(
            "Only an owner can change an owner membership".to_string(),
        ));
    }
    Ok(())
}
