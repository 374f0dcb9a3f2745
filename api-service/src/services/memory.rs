//! In-process `Store` used by tests and local runs without PostgreSQL.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use super::store::{
    already_member, duplicate_invitation, email_taken, last_owner, not_pending, Store,
    UserListQuery,
};
use super::ServiceError;
use crate::models::{Invitation, InvitationStatus, Membership, Organization, Role, User};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    organizations: HashMap<Uuid, Organization>,
    memberships: HashMap<Uuid, Membership>,
    invitations: HashMap<Uuid, Invitation>,
}

impl Tables {
    fn owner_count(&self, organization_id: Uuid) -> usize {
        self.memberships
            .values()
            .filter(|m| m.organization_id == organization_id && m.role() == Role::Owner)
            .count()
    }

    fn is_member(&self, organization_id: Uuid, user_id: Uuid) -> bool {
        self.memberships
            .values()
            .any(|m| m.organization_id == organization_id && m.user_id == user_id)
    }
}

/// All tables behind one lock, so every trait method is atomic.
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Tables>, ServiceError> {
        self.tables
            .lock()
            .map_err(|_| ServiceError::Internal(anyhow::anyhow!("in-memory store lock poisoned")))
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn health_check(&self) -> Result<(), ServiceError> {
        self.lock().map(|_| ())
    }

    async fn insert_user(&self, user: &User) -> Result<(), ServiceError> {
        let mut t = self.lock()?;
        if t.users.values().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(email_taken());
        }
        t.users.insert(user.user_id, user.clone());
        Ok(())
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, ServiceError> {
        Ok(self.lock()?.users.get(&user_id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, ServiceError> {
        Ok(self
            .lock()?
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_user_by_google_id(&self, google_id: &str) -> Result<Option<User>, ServiceError> {
        Ok(self
            .lock()?
            .users
            .values()
            .find(|u| u.google_id.as_deref() == Some(google_id))
            .cloned())
    }

    async fn update_user(&self, user: &User) -> Result<(), ServiceError> {
        let mut t = self.lock()?;
        if t
            .users
            .values()
            .any(|u| u.user_id != user.user_id && u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(email_taken());
        }
        match t.users.get_mut(&user.user_id) {
            Some(existing) => {
                *existing = user.clone();
                Ok(())
            }
            None => Err(ServiceError::NotFound("User not found".to_string())),
        }
    }

    async fn list_users(&self, query: &UserListQuery) -> Result<Vec<User>, ServiceError> {
        let t = self.lock()?;
        let needle = query.search.as_deref().map(str::to_lowercase);
        let mut users: Vec<User> = t
            .users
            .values()
            .filter(|u| match &needle {
                Some(n) => u.name.to_lowercase().contains(n) || u.email.contains(n),
                None => true,
            })
            .filter(|u| match query.after {
                Some(after) => (u.created_utc, u.user_id) > after,
                None => true,
            })
            .cloned()
            .collect();
        users.sort_by_key(|u| (u.created_utc, u.user_id));
        users.truncate(query.limit.max(0) as usize);
        Ok(users)
    }

    async fn create_organization(
        &self,
        organization: &Organization,
        owner: &Membership,
    ) -> Result<(), ServiceError> {
        let mut t = self.lock()?;
        t.organizations
            .insert(organization.organization_id, organization.clone());
        t.memberships.insert(owner.membership_id, owner.clone());
        Ok(())
    }

    async fn find_organization(&self, organization_id: Uuid) -> Result<Option<Organization>, ServiceError> {
        Ok(self.lock()?.organizations.get(&organization_id).cloned())
    }

    async fn list_organizations_for_user(&self, user_id: Uuid) -> Result<Vec<Organization>, ServiceError> {
        let t = self.lock()?;
        let mut orgs: Vec<Organization> = t
            .memberships
            .values()
            .filter(|m| m.user_id == user_id)
            .filter_map(|m| t.organizations.get(&m.organization_id).cloned())
            .collect();
        orgs.sort_by_key(|o| o.created_utc);
        Ok(orgs)
    }

    async fn update_organization(&self, organization: &Organization) -> Result<(), ServiceError> {
        let mut t = self.lock()?;
        match t.organizations.get_mut(&organization.organization_id) {
            Some(existing) => {
                existing.name = organization.name.clone();
                existing.description = organization.description.clone();
                existing.contact_email = organization.contact_email.clone();
                existing.website_url = organization.website_url.clone();
                existing.logo_key = organization.logo_key.clone();
                existing.updated_utc = Utc::now();
                Ok(())
            }
            None => Err(ServiceError::NotFound("Organization not found".to_string())),
        }
    }

    async fn set_stripe_account_id(
        &self,
        organization_id: Uuid,
        account_id: &str,
    ) -> Result<Organization, ServiceError> {
        let mut t = self.lock()?;
        let organization = t
            .organizations
            .get_mut(&organization_id)
            .ok_or_else(|| ServiceError::NotFound("Organization not found".to_string()))?;
        if organization.stripe_account_id.is_none() {
            organization.stripe_account_id = Some(account_id.to_string());
            organization.updated_utc = Utc::now();
        }
        Ok(organization.clone())
    }

    async fn set_stripe_customer_id(
        &self,
        organization_id: Uuid,
        customer_id: &str,
    ) -> Result<Organization, ServiceError> {
        let mut t = self.lock()?;
        let organization = t
            .organizations
            .get_mut(&organization_id)
            .ok_or_else(|| ServiceError::NotFound("Organization not found".to_string()))?;
        if organization.stripe_customer_id.is_none() {
            organization.stripe_customer_id = Some(customer_id.to_string());
            organization.updated_utc = Utc::now();
        }
        Ok(organization.clone())
    }

    async fn delete_organization(&self, organization_id: Uuid) -> Result<(), ServiceError> {
        let mut t = self.lock()?;
        t.organizations.remove(&organization_id);
        t.memberships.retain(|_, m| m.organization_id != organization_id);
        t.invitations.retain(|_, i| i.organization_id != organization_id);
        Ok(())
    }

    async fn find_membership(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Membership>, ServiceError> {
        Ok(self
            .lock()?
            .memberships
            .values()
            .find(|m| m.organization_id == organization_id && m.user_id == user_id)
            .cloned())
    }

    async fn find_membership_by_id(&self, membership_id: Uuid) -> Result<Option<Membership>, ServiceError> {
        Ok(self.lock()?.memberships.get(&membership_id).cloned())
    }

    async fn list_memberships(&self, organization_id: Uuid) -> Result<Vec<Membership>, ServiceError> {
        let t = self.lock()?;
        let mut memberships: Vec<Membership> = t
            .memberships
            .values()
            .filter(|m| m.organization_id == organization_id)
            .cloned()
            .collect();
        memberships.sort_by_key(|m| m.created_utc);
        Ok(memberships)
    }

    async fn insert_membership(&self, membership: &Membership) -> Result<(), ServiceError> {
        let mut t = self.lock()?;
        if t.is_member(membership.organization_id, membership.user_id) {
            return Err(already_member());
        }
        t.memberships
            .insert(membership.membership_id, membership.clone());
        Ok(())
    }

    async fn update_membership_role(
        &self,
        membership_id: Uuid,
        role: Role,
    ) -> Result<Membership, ServiceError> {
        let mut t = self.lock()?;
        let current = t
            .memberships
            .get(&membership_id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound("Membership not found".to_string()))?;

        if current.role() == Role::Owner && role != Role::Owner && t.owner_count(current.organization_id) <= 1 {
            return Err(last_owner());
        }

        let updated = Membership {
            role_code: role.as_str().to_string(),
            updated_utc: Utc::now(),
            ..current
        };
        t.memberships.insert(membership_id, updated.clone());
        Ok(updated)
    }

    async fn delete_membership(&self, membership_id: Uuid) -> Result<(), ServiceError> {
        let mut t = self.lock()?;
        let Some(current) = t.memberships.get(&membership_id).cloned() else {
            return Err(ServiceError::NotFound("Membership not found".to_string()));
        };
        if current.role() == Role::Owner && t.owner_count(current.organization_id) <= 1 {
            return Err(last_owner());
        }
        t.memberships.remove(&membership_id);
        Ok(())
    }

    async fn insert_invitation(&self, invitation: &Invitation) -> Result<(), ServiceError> {
        let mut t = self.lock()?;
        let duplicate = t.invitations.values().any(|i| {
            i.organization_id == invitation.organization_id
                && i.email.eq_ignore_ascii_case(&invitation.email)
                && i.status() == InvitationStatus::Pending
        });
        if duplicate {
            return Err(duplicate_invitation());
        }
        t.invitations
            .insert(invitation.invitation_id, invitation.clone());
        Ok(())
    }

    async fn find_invitation(&self, invitation_id: Uuid) -> Result<Option<Invitation>, ServiceError> {
        Ok(self.lock()?.invitations.get(&invitation_id).cloned())
    }

    async fn list_invitations(&self, organization_id: Uuid) -> Result<Vec<Invitation>, ServiceError> {
        let t = self.lock()?;
        let mut invitations: Vec<Invitation> = t
            .invitations
            .values()
            .filter(|i| i.organization_id == organization_id)
            .cloned()
            .collect();
        invitations.sort_by_key(|i| i.created_utc);
        Ok(invitations)
    }

    async fn delete_invitation(&self, invitation_id: Uuid) -> Result<(), ServiceError> {
        self.lock()?.invitations.remove(&invitation_id);
        Ok(())
    }

    async fn transition_invitation(
        &self,
        invitation_id: Uuid,
        to: InvitationStatus,
    ) -> Result<Invitation, ServiceError> {
        let mut t = self.lock()?;
        let invitation = t
            .invitations
            .get_mut(&invitation_id)
            .ok_or_else(|| ServiceError::NotFound("Invitation not found".to_string()))?;
        if invitation.status() != InvitationStatus::Pending {
            return Err(not_pending());
        }
        invitation.status_code = to.as_str().to_string();
        invitation.updated_utc = Utc::now();
        Ok(invitation.clone())
    }

    async fn accept_invitation(
        &self,
        invitation_id: Uuid,
        user_id: Uuid,
    ) -> Result<(Invitation, Membership), ServiceError> {
        let mut t = self.lock()?;
        let invitation = t
            .invitations
            .get(&invitation_id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound("Invitation not found".to_string()))?;
        if invitation.status() != InvitationStatus::Pending {
            return Err(not_pending());
        }
        if t.is_member(invitation.organization_id, user_id) {
            return Err(already_member());
        }

        let membership = Membership::new(invitation.organization_id, user_id, invitation.role());
        let accepted = Invitation {
            status_code: InvitationStatus::Accepted.as_str().to_string(),
            updated_utc: Utc::now(),
            ..invitation
        };
        t.invitations.insert(invitation_id, accepted.clone());
        t.memberships
            .insert(membership.membership_id, membership.clone());
        Ok((accepted, membership))
    }
}
