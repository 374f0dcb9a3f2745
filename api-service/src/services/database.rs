//! PostgreSQL `Store`.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPool;
use uuid::Uuid;

use super::store::{
    already_member, duplicate_invitation, email_taken, last_owner, not_pending, Store,
    UserListQuery,
};
use super::ServiceError;
use crate::models::{Invitation, InvitationStatus, Membership, Organization, Role, User};

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The row a conditional update returned, or the current row when the
    /// condition did not hold.
    async fn stored_or_current(
        &self,
        organization_id: Uuid,
        updated: Option<Organization>,
    ) -> Result<Organization, ServiceError> {
        match updated {
            Some(organization) => Ok(organization),
            None => self
                .find_organization(organization_id)
                .await?
                .ok_or_else(|| ServiceError::NotFound("Organization not found".to_string())),
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Locks the organization's owner rows and fails if `membership` is the last one.
async fn ensure_not_last_owner(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    membership: &Membership,
) -> Result<(), ServiceError> {
    if membership.role() != Role::Owner {
        return Ok(());
    }
    let owners: Vec<Uuid> = sqlx::query_scalar(
        "SELECT membership_id FROM memberships WHERE organization_id = $1 AND role_code = 'owner' FOR UPDATE",
    )
    .bind(membership.organization_id)
    .fetch_all(&mut **tx)
    .await?;
    if owners.len() <= 1 {
        return Err(last_owner());
    }
    Ok(())
}

#[async_trait]
impl Store for Database {
    async fn health_check(&self) -> Result<(), ServiceError> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map_err(|e| {
            tracing::error!("Database health check failed: {}", e);
            ServiceError::Database(e)
        })?;
        Ok(())
    }

    // ==================== Users ====================

    async fn insert_user(&self, user: &User) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO users (user_id, name, email, email_verified, email_verification_hash, email_verification_expiry_utc,
                               password_hash, google_id, role_code, logo_key, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(user.user_id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.email_verified)
        .bind(&user.email_verification_hash)
        .bind(user.email_verification_expiry_utc)
        .bind(&user.password_hash)
        .bind(&user.google_id)
        .bind(&user.role_code)
        .bind(&user.logo_key)
        .bind(user.created_utc)
        .bind(user.updated_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| if is_unique_violation(&e) { email_taken() } else { e.into() })?;
        Ok(())
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, ServiceError> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, ServiceError> {
        Ok(
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn find_user_by_google_id(&self, google_id: &str) -> Result<Option<User>, ServiceError> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE google_id = $1")
            .bind(google_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn update_user(&self, user: &User) -> Result<(), ServiceError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET name = $2, email = $3, email_verified = $4, email_verification_hash = $5,
                email_verification_expiry_utc = $6, password_hash = $7, google_id = $8, role_code = $9,
                logo_key = $10, updated_utc = $11
            WHERE user_id = $1
            "#,
        )
        .bind(user.user_id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.email_verified)
        .bind(&user.email_verification_hash)
        .bind(user.email_verification_expiry_utc)
        .bind(&user.password_hash)
        .bind(&user.google_id)
        .bind(&user.role_code)
        .bind(&user.logo_key)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| if is_unique_violation(&e) { email_taken() } else { e.into() })?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound("User not found".to_string()));
        }
        Ok(())
    }

    async fn list_users(&self, query: &UserListQuery) -> Result<Vec<User>, ServiceError> {
        let pattern = query
            .search
            .as_deref()
            .map(|s| format!("%{}%", s.replace('%', "\\%").replace('_', "\\_")));
        let (after_utc, after_id) = match query.after {
            Some((utc, id)) => (Some(utc), Some(id)),
            None => (None, None),
        };

        Ok(sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE ($1::TEXT IS NULL OR name ILIKE $1 OR email ILIKE $1)
              AND ($2::TIMESTAMPTZ IS NULL OR (created_utc, user_id) > ($2, $3))
            ORDER BY created_utc, user_id
            LIMIT $4
            "#,
        )
        .bind(pattern)
        .bind(after_utc)
        .bind(after_id)
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await?)
    }

    // ==================== Organizations ====================

    async fn create_organization(
        &self,
        organization: &Organization,
        owner: &Membership,
    ) -> Result<(), ServiceError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO organizations (organization_id, name, description, contact_email, website_url, logo_key, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(organization.organization_id)
        .bind(&organization.name)
        .bind(&organization.description)
        .bind(&organization.contact_email)
        .bind(&organization.website_url)
        .bind(&organization.logo_key)
        .bind(organization.created_utc)
        .bind(organization.updated_utc)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO memberships (membership_id, organization_id, user_id, role_code, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(owner.membership_id)
        .bind(owner.organization_id)
        .bind(owner.user_id)
        .bind(&owner.role_code)
        .bind(owner.created_utc)
        .bind(owner.updated_utc)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_organization(&self, organization_id: Uuid) -> Result<Option<Organization>, ServiceError> {
        Ok(sqlx::query_as::<_, Organization>(
            "SELECT * FROM organizations WHERE organization_id = $1",
        )
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn list_organizations_for_user(&self, user_id: Uuid) -> Result<Vec<Organization>, ServiceError> {
        Ok(sqlx::query_as::<_, Organization>(
            r#"
            SELECT o.* FROM organizations o
            JOIN memberships m ON m.organization_id = o.organization_id
            WHERE m.user_id = $1
            ORDER BY o.created_utc
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn update_organization(&self, organization: &Organization) -> Result<(), ServiceError> {
        let result = sqlx::query(
            r#"
            UPDATE organizations
            SET name = $2, description = $3, contact_email = $4, website_url = $5, logo_key = $6, updated_utc = $7
            WHERE organization_id = $1
            "#,
        )
        .bind(organization.organization_id)
        .bind(&organization.name)
        .bind(&organization.description)
        .bind(&organization.contact_email)
        .bind(&organization.website_url)
        .bind(&organization.logo_key)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound("Organization not found".to_string()));
        }
        Ok(())
    }

    async fn set_stripe_account_id(
        &self,
        organization_id: Uuid,
        account_id: &str,
    ) -> Result<Organization, ServiceError> {
        let updated = sqlx::query_as::<_, Organization>(
            r#"
            UPDATE organizations SET stripe_account_id = $2, updated_utc = $3
            WHERE organization_id = $1 AND stripe_account_id IS NULL
            RETURNING *
            "#,
        )
        .bind(organization_id)
        .bind(account_id)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        self.stored_or_current(organization_id, updated).await
    }

    async fn set_stripe_customer_id(
        &self,
        organization_id: Uuid,
        customer_id: &str,
    ) -> Result<Organization, ServiceError> {
        let updated = sqlx::query_as::<_, Organization>(
            r#"
            UPDATE organizations SET stripe_customer_id = $2, updated_utc = $3
            WHERE organization_id = $1 AND stripe_customer_id IS NULL
            RETURNING *
            "#,
        )
        .bind(organization_id)
        .bind(customer_id)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        self.stored_or_current(organization_id, updated).await
    }

    async fn delete_organization(&self, organization_id: Uuid) -> Result<(), ServiceError> {
        // memberships and invitations go with it through ON DELETE CASCADE
        sqlx::query("DELETE FROM organizations WHERE organization_id = $1")
            .bind(organization_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ==================== Memberships ====================

    async fn find_membership(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Membership>, ServiceError> {
        Ok(sqlx::query_as::<_, Membership>(
            "SELECT * FROM memberships WHERE organization_id = $1 AND user_id = $2",
        )
        .bind(organization_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn find_membership_by_id(&self, membership_id: Uuid) -> Result<Option<Membership>, ServiceError> {
        Ok(
            sqlx::query_as::<_, Membership>("SELECT * FROM memberships WHERE membership_id = $1")
                .bind(membership_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn list_memberships(&self, organization_id: Uuid) -> Result<Vec<Membership>, ServiceError> {
        Ok(sqlx::query_as::<_, Membership>(
            "SELECT * FROM memberships WHERE organization_id = $1 ORDER BY created_utc",
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn insert_membership(&self, membership: &Membership) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO memberships (membership_id, organization_id, user_id, role_code, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(membership.membership_id)
        .bind(membership.organization_id)
        .bind(membership.user_id)
        .bind(&membership.role_code)
        .bind(membership.created_utc)
        .bind(membership.updated_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| if is_unique_violation(&e) { already_member() } else { e.into() })?;
        Ok(())
    }

    async fn update_membership_role(
        &self,
        membership_id: Uuid,
        role: Role,
    ) -> Result<Membership, ServiceError> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, Membership>(
            "SELECT * FROM memberships WHERE membership_id = $1 FOR UPDATE",
        )
        .bind(membership_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Membership not found".to_string()))?;

        if role != Role::Owner {
            ensure_not_last_owner(&mut tx, &current).await?;
        }

        let updated = sqlx::query_as::<_, Membership>(
            "UPDATE memberships SET role_code = $2, updated_utc = $3 WHERE membership_id = $1 RETURNING *",
        )
        .bind(membership_id)
        .bind(role.as_str())
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn delete_membership(&self, membership_id: Uuid) -> Result<(), ServiceError> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, Membership>(
            "SELECT * FROM memberships WHERE membership_id = $1 FOR UPDATE",
        )
        .bind(membership_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Membership not found".to_string()))?;

        ensure_not_last_owner(&mut tx, &current).await?;

        sqlx::query("DELETE FROM memberships WHERE membership_id = $1")
            .bind(membership_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    // ==================== Invitations ====================

    async fn insert_invitation(&self, invitation: &Invitation) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO invitations (invitation_id, organization_id, email, role_code, status_code, token, inviting_user_id, expiry_utc, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(invitation.invitation_id)
        .bind(invitation.organization_id)
        .bind(&invitation.email)
        .bind(&invitation.role_code)
        .bind(&invitation.status_code)
        .bind(&invitation.token)
        .bind(invitation.inviting_user_id)
        .bind(invitation.expiry_utc)
        .bind(invitation.created_utc)
        .bind(invitation.updated_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| if is_unique_violation(&e) { duplicate_invitation() } else { e.into() })?;
        Ok(())
    }

    async fn find_invitation(&self, invitation_id: Uuid) -> Result<Option<Invitation>, ServiceError> {
        Ok(
            sqlx::query_as::<_, Invitation>("SELECT * FROM invitations WHERE invitation_id = $1")
                .bind(invitation_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn list_invitations(&self, organization_id: Uuid) -> Result<Vec<Invitation>, ServiceError> {
        Ok(sqlx::query_as::<_, Invitation>(
            "SELECT * FROM invitations WHERE organization_id = $1 ORDER BY created_utc",
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn delete_invitation(&self, invitation_id: Uuid) -> Result<(), ServiceError> {
        sqlx::query("DELETE FROM invitations WHERE invitation_id = $1")
            .bind(invitation_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn transition_invitation(
        &self,
        invitation_id: Uuid,
        to: InvitationStatus,
    ) -> Result<Invitation, ServiceError> {
        let updated = sqlx::query_as::<_, Invitation>(
            r#"
            UPDATE invitations SET status_code = $2, updated_utc = $3
            WHERE invitation_id = $1 AND status_code = 'pending'
            RETURNING *
            "#,
        )
        .bind(invitation_id)
        .bind(to.as_str())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(invitation) => Ok(invitation),
            None => match self.find_invitation(invitation_id).await? {
                Some(_) => Err(not_pending()),
                None => Err(ServiceError::NotFound("Invitation not found".to_string())),
            },
        }
    }

    async fn accept_invitation(
        &self,
        invitation_id: Uuid,
        user_id: Uuid,
    ) -> Result<(Invitation, Membership), ServiceError> {
        let mut tx = self.pool.begin().await?;

        let accepted = sqlx::query_as::<_, Invitation>(
            r#"
            UPDATE invitations SET status_code = 'accepted', updated_utc = $2
            WHERE invitation_id = $1 AND status_code = 'pending'
            RETURNING *
            "#,
        )
        .bind(invitation_id)
        .bind(Utc::now())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(not_pending)?;

        let membership = Membership::new(accepted.organization_id, user_id, accepted.role());
        sqlx::query(
            r#"
            INSERT INTO memberships (membership_id, organization_id, user_id, role_code, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(membership.membership_id)
        .bind(membership.organization_id)
        .bind(membership.user_id)
        .bind(&membership.role_code)
        .bind(membership.created_utc)
        .bind(membership.updated_utc)
        .execute(&mut *tx)
        .await
        .map_err(|e| if is_unique_violation(&e) { already_member() } else { e.into() })?;

        tx.commit().await?;
        Ok((accepted, membership))
    }
}
