pub mod billing;
pub mod health;
pub mod invitations;
pub mod memberships;
pub mod oauth;
pub mod organizations;
pub mod users;
pub mod webhooks;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::json;
use service_core::error::AppError;
use sha2::{Digest, Sha256};

use crate::dtos::{
    invitations::InvitationAttributes, memberships::MembershipAttributes,
    organizations::OrganizationAttributes, relationship, users::UserAttributes, Resource,
    INVITATION_TYPE, MEMBERSHIP_TYPE, ORGANIZATION_TYPE, USER_TYPE,
};
use crate::models::{Invitation, Membership, Organization, User};
use crate::services::{ObjectStorage, ServiceError, TokenResponse};
use crate::AppState;

pub(crate) fn user_resource(state: &AppState, user: &User) -> Resource<UserAttributes> {
    Resource::new(
        USER_TYPE,
        user.user_id,
        UserAttributes {
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role_code.clone(),
            email_verified: user.email_verified,
            logo_url: logo_url(state.storage.as_ref(), crate::services::storage::USER_LOGO_BUCKET, &user.logo_key),
            created_at: user.created_utc,
            updated_at: user.updated_utc,
        },
    )
}

pub(crate) fn organization_resource(state: &AppState, org: &Organization) -> Resource<OrganizationAttributes> {
    Resource::new(
        ORGANIZATION_TYPE,
        org.organization_id,
        OrganizationAttributes {
            name: org.name.clone(),
            description: org.description.clone(),
            contact_email: org.contact_email.clone(),
            website_url: org.website_url.clone(),
            logo_url: logo_url(
                state.storage.as_ref(),
                crate::services::storage::ORGANIZATION_LOGO_BUCKET,
                &org.logo_key,
            ),
            has_stripe_account: org.stripe_account_id.is_some(),
            created_at: org.created_utc,
            updated_at: org.updated_utc,
        },
    )
}

pub(crate) fn membership_resource(membership: &Membership) -> Resource<MembershipAttributes> {
    Resource::new(
        MEMBERSHIP_TYPE,
        membership.membership_id,
        MembershipAttributes {
            role: membership.role_code.clone(),
            created_at: membership.created_utc,
            updated_at: membership.updated_utc,
        },
    )
    .with_relationships(json!({
        "user": relationship(USER_TYPE, membership.user_id),
        "organization": relationship(ORGANIZATION_TYPE, membership.organization_id),
    }))
}

pub(crate) fn invitation_resource(invitation: &Invitation) -> Resource<InvitationAttributes> {
    Resource::new(
        INVITATION_TYPE,
        invitation.invitation_id,
        InvitationAttributes {
            email: invitation.email.clone(),
            role: invitation.role_code.clone(),
            status: invitation.status_code.clone(),
            expires_at: invitation.expiry_utc,
            created_at: invitation.created_utc,
            updated_at: invitation.updated_utc,
        },
    )
    .with_relationships(json!({
        "organization": relationship(ORGANIZATION_TYPE, invitation.organization_id),
        "invitingUser": relationship(USER_TYPE, invitation.inviting_user_id),
    }))
}

pub(crate) fn token_meta(token: &TokenResponse) -> serde_json::Value {
    json!({
        "token": token.token,
        "tokenType": token.token_type,
        "expiresIn": token.expires_in,
    })
}

fn logo_url(storage: &dyn ObjectStorage, bucket: &str, key: &Option<String>) -> Option<String> {
    key.as_deref().map(|key| storage.url(bucket, key))
}

/// Decode a base64 logo and store it under a content-derived key.
pub(crate) async fn store_logo(
    storage: &dyn ObjectStorage,
    bucket: &str,
    owner: uuid::Uuid,
    encoded: &str,
    field: &str,
) -> Result<String, AppError> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|_| AppError::invalid_field(field, "must be base64 encoded"))?;
    if bytes.is_empty() {
        return Err(AppError::invalid_field(field, "must not be empty"));
    }

    let digest = hex::encode(Sha256::digest(&bytes));
    let key = format!("{}-{}", owner, &digest[..16]);
    storage.put(bucket, &key, bytes).await?;
    Ok(key)
}

/// Runs the row write that points at `fresh`, a logo this request just
/// stored. A failed write removes `fresh`; a successful one removes the
/// `replaced` object it superseded.
pub(crate) async fn commit_logo<T, F>(
    storage: &dyn ObjectStorage,
    bucket: &str,
    fresh: Option<&str>,
    replaced: Option<&str>,
    write: F,
) -> Result<T, AppError>
where
    F: std::future::Future<Output = Result<T, ServiceError>>,
{
    match write.await {
        Ok(value) => {
            if let (Some(fresh), Some(replaced)) = (fresh, replaced) {
                if fresh != replaced {
                    discard_logo(storage, bucket, replaced).await;
                }
            }
            Ok(value)
        }
        Err(e) => {
            if let Some(fresh) = fresh {
                if Some(fresh) != replaced {
                    discard_logo(storage, bucket, fresh).await;
                }
            }
            Err(e.into())
        }
    }
}

pub(crate) async fn discard_logo(storage: &dyn ObjectStorage, bucket: &str, key: &str) {
    if let Err(e) = storage.delete(bucket, key).await {
        tracing::warn!(error = %e, bucket, key, "Failed to remove logo object");
    }
}
