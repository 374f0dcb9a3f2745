//! Persistence boundary. Handlers see storage only through this trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::ServiceError;
use crate::models::{Invitation, InvitationStatus, Membership, Organization, Role, User};

/// Keyset page request over users ordered by `(created_utc, user_id)`.
#[derive(Debug, Clone, Default)]
pub struct UserListQuery {
    pub search: Option<String>,
    pub after: Option<(DateTime<Utc>, Uuid)>,
    pub limit: i64,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn health_check(&self) -> Result<(), ServiceError>;

    // Users

    /// `Conflict` when the email is already registered.
    async fn insert_user(&self, user: &User) -> Result<(), ServiceError>;
    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, ServiceError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, ServiceError>;
    async fn find_user_by_google_id(&self, google_id: &str) -> Result<Option<User>, ServiceError>;
    /// `Conflict` when the new email belongs to someone else.
    async fn update_user(&self, user: &User) -> Result<(), ServiceError>;
    async fn list_users(&self, query: &UserListQuery) -> Result<Vec<User>, ServiceError>;

    // Organizations

    /// Persists the organization and its first owner membership together.
    async fn create_organization(
        &self,
        organization: &Organization,
        owner: &Membership,
    ) -> Result<(), ServiceError>;
    async fn find_organization(&self, organization_id: Uuid) -> Result<Option<Organization>, ServiceError>;
    async fn list_organizations_for_user(&self, user_id: Uuid) -> Result<Vec<Organization>, ServiceError>;
    /// Writes the profile columns only. Billing references have their own setters.
    async fn update_organization(&self, organization: &Organization) -> Result<(), ServiceError>;
    /// Records the connected account unless one is already set, and returns
    /// the stored row. The stored id is authoritative.
    async fn set_stripe_account_id(
        &self,
        organization_id: Uuid,
        account_id: &str,
    ) -> Result<Organization, ServiceError>;
    /// Same contract as [`Store::set_stripe_account_id`] for the billing customer.
    async fn set_stripe_customer_id(
        &self,
        organization_id: Uuid,
        customer_id: &str,
    ) -> Result<Organization, ServiceError>;
    /// Removes the organization with its memberships and invitations.
    async fn delete_organization(&self, organization_id: Uuid) -> Result<(), ServiceError>;

    // Memberships

    async fn find_membership(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Membership>, ServiceError>;
    async fn find_membership_by_id(&self, membership_id: Uuid) -> Result<Option<Membership>, ServiceError>;
    async fn list_memberships(&self, organization_id: Uuid) -> Result<Vec<Membership>, ServiceError>;
    /// `Conflict` when the user already belongs to the organization.
    async fn insert_membership(&self, membership: &Membership) -> Result<(), ServiceError>;
    /// `Conflict` when this would leave the organization without an owner.
    async fn update_membership_role(
        &self,
        membership_id: Uuid,
        role: Role,
    ) -> Result<Membership, ServiceError>;
    /// `Conflict` when this would leave the organization without an owner.
    async fn delete_membership(&self, membership_id: Uuid) -> Result<(), ServiceError>;

    // Invitations

    /// `Conflict` when a pending invitation already exists for the email and organization.
    async fn insert_invitation(&self, invitation: &Invitation) -> Result<(), ServiceError>;
    async fn find_invitation(&self, invitation_id: Uuid) -> Result<Option<Invitation>, ServiceError>;
    async fn list_invitations(&self, organization_id: Uuid) -> Result<Vec<Invitation>, ServiceError>;
    async fn delete_invitation(&self, invitation_id: Uuid) -> Result<(), ServiceError>;
    /// Moves a pending invitation to `to`. `Conflict` if it is no longer pending.
    async fn transition_invitation(
        &self,
        invitation_id: Uuid,
        to: InvitationStatus,
    ) -> Result<Invitation, ServiceError>;
    /// Marks the invitation accepted and creates the membership in one step.
    /// `Conflict` if it is no longer pending or the user is already a member.
    async fn accept_invitation(
        &self,
        invitation_id: Uuid,
        user_id: Uuid,
    ) -> Result<(Invitation, Membership), ServiceError>;
}

pub(crate) fn not_pending() -> ServiceError {
    ServiceError::Conflict("Invitation is no longer pending".to_string())
}

pub(crate) fn last_owner() -> ServiceError {
    ServiceError::Conflict("An organization must keep at least one owner".to_string())
}

pub(crate) fn email_taken() -> ServiceError {
    ServiceError::Conflict("Email is already registered".to_string())
}

pub(crate) fn already_member() -> ServiceError {
    ServiceError::Conflict("User is already a member of this organization".to_string())
}

pub(crate) fn duplicate_invitation() -> ServiceError {
    ServiceError::Conflict("An invitation already exists for this email and organization".to_string())
}
