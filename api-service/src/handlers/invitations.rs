use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use service_core::error::AppError;
use service_core::observability::record_job_enqueued;
use uuid::Uuid;

use super::{invitation_resource, membership_resource, organizations::load_organization};
use crate::access::{current_user, ensure_can_assign, require_membership, require_role};
use crate::dtos::{
    invitations::{InvitationActionRequest, InvitationEmailJob, InviteRequest},
    memberships::OrganizationScopedQuery,
    Document,
};
use crate::middleware::AuthUser;
use crate::models::{Identity, Invitation, InvitationStatus, Role, User};
use crate::services::jobs::{Job, ORGANIZATION_INVITATION_EMAIL_JOB};
use crate::utils::{parse_id, ValidatedJson, ValidatedQuery};
use crate::AppState;

async fn load_invitation(state: &AppState, invitation_id: Uuid) -> Result<Invitation, AppError> {
    state
        .store
        .find_invitation(invitation_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Invitation not found".to_string()))
}

pub async fn list_invitations(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    ValidatedQuery(query): ValidatedQuery<OrganizationScopedQuery>,
) -> Result<impl IntoResponse, AppError> {
    let organization_id = query
        .organization_id
        .ok_or_else(|| AppError::invalid_field("organizationId", "is required"))?;
    require_membership(state.store.as_ref(), organization_id, identity.user_id).await?;

    let invitations = state.store.list_invitations(organization_id).await?;
    let data: Vec<_> = invitations.iter().map(invitation_resource).collect();
    Ok(Json(Document::new(data)))
}

/// Invite an email address into an organization and queue the email.
/// If the email job cannot be queued the invitation is removed again.
pub async fn create_invitation(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    ValidatedJson(request): ValidatedJson<InviteRequest>,
) -> Result<impl IntoResponse, AppError> {
    let data = request.data;
    let organization_id = parse_id(
        &data.relationships.organization.data.id,
        "data.relationships.organization.data.id",
    )?;
    let role = data
        .attributes
        .role
        .parse::<Role>()
        .map_err(|e| AppError::invalid_field("data.attributes.role", e))?;
    let email = data.attributes.email.trim().to_lowercase();

    let actor = require_role(state.store.as_ref(), organization_id, identity.user_id, Role::Admin).await?;
    ensure_can_assign(actor.role(), None, role)?;

    let organization = load_organization(&state, organization_id).await?;
    let inviter = current_user(state.store.as_ref(), &identity).await?;

    if let Some(existing) = state.store.find_user_by_email(&email).await? {
        if state
            .store
            .find_membership(organization_id, existing.user_id)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(
                "User is already a member of this organization".to_string(),
            ));
        }
    }

    let invitation = Invitation::new(organization_id, &email, role, inviter.user_id);
    state.store.insert_invitation(&invitation).await?;

    let payload = InvitationEmailJob {
        invitation_id: invitation.invitation_id.to_string(),
        organization_id: organization_id.to_string(),
        organization_name: organization.name.clone(),
        inviter_name: inviter.name.clone(),
        email: invitation.email.clone(),
        role: invitation.role_code.clone(),
        token: invitation.token.clone(),
    };

    let enqueued = match Job::new(ORGANIZATION_INVITATION_EMAIL_JOB, &payload) {
        Ok(job) => state.jobs.enqueue(job).await,
        Err(e) => Err(e),
    };
    record_job_enqueued(ORGANIZATION_INVITATION_EMAIL_JOB, enqueued.is_ok());

    if let Err(e) = enqueued {
        if let Err(cleanup) = state.store.delete_invitation(invitation.invitation_id).await {
            tracing::error!(
                invitation_id = %invitation.invitation_id,
                error = %cleanup,
                "Failed to roll back invitation after enqueue failure"
            );
        }
        return Err(AppError::Internal(anyhow::anyhow!(
            "Failed to enqueue invitation email: {}",
            e
        )));
    }

    tracing::info!(
        invitation_id = %invitation.invitation_id,
        %organization_id,
        by = %identity.user_id,
        "Invitation created"
    );

    Ok((StatusCode::CREATED, Json(Document::new(invitation_resource(&invitation)))))
}

/// Visible to members of the organization and to the invitee.
pub async fn get_invitation(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let invitation = load_invitation(&state, parse_id(&id, "id")?).await?;

    let user = current_user(state.store.as_ref(), &identity).await?;
    if !is_invitee(&invitation, &user) {
        require_membership(state.store.as_ref(), invitation.organization_id, user.user_id).await?;
    }

    Ok(Json(Document::new(invitation_resource(&invitation))))
}

/// Revoke a pending invitation. Requires admin.
pub async fn revoke_invitation(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let invitation = load_invitation(&state, parse_id(&id, "id")?).await?;
    require_role(
        state.store.as_ref(),
        invitation.organization_id,
        identity.user_id,
        Role::Admin,
    )
    .await?;

    let revoked = state
        .store
        .transition_invitation(invitation.invitation_id, InvitationStatus::Revoked)
        .await?;

    tracing::info!(invitation_id = %revoked.invitation_id, by = %identity.user_id, "Invitation revoked");
    Ok(Json(Document::new(invitation_resource(&revoked))))
}

pub async fn accept_invitation(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
    ValidatedJson(request): ValidatedJson<InvitationActionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (invitation, user) = actionable_invitation(&state, &identity, &id, &request).await?;

    let (accepted, membership) = state
        .store
        .accept_invitation(invitation.invitation_id, user.user_id)
        .await?;

    tracing::info!(
        invitation_id = %accepted.invitation_id,
        organization_id = %accepted.organization_id,
        user_id = %user.user_id,
        "Invitation accepted"
    );

    let mut document = Document::new(invitation_resource(&accepted));
    document.included = Some(vec![
        serde_json::to_value(membership_resource(&membership)).map_err(anyhow::Error::from)?,
    ]);
    Ok(Json(document))
}

pub async fn decline_invitation(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
    ValidatedJson(request): ValidatedJson<InvitationActionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (invitation, user) = actionable_invitation(&state, &identity, &id, &request).await?;

    let declined = state
        .store
        .transition_invitation(invitation.invitation_id, InvitationStatus::Declined)
        .await?;

    tracing::info!(invitation_id = %declined.invitation_id, user_id = %user.user_id, "Invitation declined");
    Ok(Json(Document::new(invitation_resource(&declined))))
}

/// The caller owns the invited address only once it has been verified.
fn is_invitee(invitation: &Invitation, user: &User) -> bool {
    user.email_verified && invitation.is_addressed_to(&user.email)
}

/// Shared gate for accept and decline: matching ids, verified addressee,
/// still pending and not expired. An expired invitation is marked as such.
async fn actionable_invitation(
    state: &AppState,
    identity: &Identity,
    path_id: &str,
    request: &InvitationActionRequest,
) -> Result<(Invitation, User), AppError> {
    let invitation_id = parse_id(path_id, "id")?;
    if request.data.id != path_id {
        return Err(AppError::invalid_field("data.id", "invalid invitation ID"));
    }

    let invitation = load_invitation(state, invitation_id).await?;
    let user = current_user(state.store.as_ref(), identity).await?;

    if !invitation.is_addressed_to(&user.email) {
        service_core::observability::record_access_denied("invitation_addressee");
        return Err(AppError::Forbidden(
            "This invitation was sent to a different email address".to_string(),
        ));
    }
    if !user.email_verified {
        service_core::observability::record_access_denied("invitation_unverified_email");
        return Err(AppError::Forbidden(
            "Verify your email address before responding to invitations".to_string(),
        ));
    }

    if invitation.status().is_terminal() {
        return Err(AppError::Conflict(format!(
            "Invitation is already {}",
            invitation.status().as_str()
        )));
    }

    if invitation.is_expired_at(Utc::now()) {
        state
            .store
            .transition_invitation(invitation.invitation_id, InvitationStatus::Expired)
            .await?;
        return Err(AppError::Conflict("Invitation has expired".to_string()));
    }

    Ok((invitation, user))
}
