use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use super::{membership_resource, user_resource};
use crate::access::{ensure_can_assign, require_membership, require_role};
use crate::dtos::{
    memberships::{CreateMembershipRequest, OrganizationScopedQuery, UpdateMembershipRequest},
    Document,
};
use crate::middleware::AuthUser;
use crate::models::{Membership, Role};
use crate::utils::{parse_id, ValidatedJson, ValidatedQuery};
use crate::AppState;

async fn load_membership(state: &AppState, membership_id: Uuid) -> Result<Membership, AppError> {
    state
        .store
        .find_membership_by_id(membership_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Membership not found".to_string()))
}

fn parse_role(raw: &str) -> Result<Role, AppError> {
    raw.parse::<Role>()
        .map_err(|e| AppError::invalid_field("data.attributes.role", e))
}

/// Members of one organization, with their users included.
pub async fn list_memberships(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    ValidatedQuery(query): ValidatedQuery<OrganizationScopedQuery>,
) -> Result<impl IntoResponse, AppError> {
    let organization_id = query
        .organization_id
        .ok_or_else(|| AppError::invalid_field("organizationId", "is required"))?;
    require_membership(state.store.as_ref(), organization_id, identity.user_id).await?;

    let memberships = state.store.list_memberships(organization_id).await?;

    let mut included = Vec::with_capacity(memberships.len());
    for membership in &memberships {
        if let Some(user) = state.store.find_user_by_id(membership.user_id).await? {
            included.push(serde_json::to_value(user_resource(&state, &user)).map_err(anyhow::Error::from)?);
        }
    }

    let data: Vec<_> = memberships.iter().map(membership_resource).collect();
    let mut document = Document::new(data);
    document.included = Some(included);
    Ok(Json(document))
}

/// Add an existing user to an organization. Admins may add members and admins.
pub async fn create_membership(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    ValidatedJson(request): ValidatedJson<CreateMembershipRequest>,
) -> Result<impl IntoResponse, AppError> {
    let data = request.data;
    let organization_id = parse_id(
        &data.relationships.organization.data.id,
        "data.relationships.organization.data.id",
    )?;
    let user_id = parse_id(&data.relationships.user.data.id, "data.relationships.user.data.id")?;
    let role = parse_role(&data.attributes.role)?;

    let actor = require_membership(state.store.as_ref(), organization_id, identity.user_id).await?;
    ensure_can_assign(actor.role(), None, role)?;

    if state.store.find_user_by_id(user_id).await?.is_none() {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    let membership = Membership::new(organization_id, user_id, role);
    state.store.insert_membership(&membership).await?;

    tracing::info!(
        %organization_id,
        %user_id,
        role = role.as_str(),
        by = %identity.user_id,
        "Membership created"
    );

    Ok((StatusCode::CREATED, Json(Document::new(membership_resource(&membership)))))
}

pub async fn get_membership(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let membership = load_membership(&state, parse_id(&id, "id")?).await?;
    require_membership(state.store.as_ref(), membership.organization_id, identity.user_id).await?;

    Ok(Json(Document::new(membership_resource(&membership))))
}

/// Change a member's role. Grants are capped by the caller's own role and
/// owner memberships can only be changed by an owner.
pub async fn update_membership(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
    ValidatedJson(request): ValidatedJson<UpdateMembershipRequest>,
) -> Result<impl IntoResponse, AppError> {
    let membership = load_membership(&state, parse_id(&id, "id")?).await?;
    let role = parse_role(&request.data.attributes.role)?;

    let actor =
        require_membership(state.store.as_ref(), membership.organization_id, identity.user_id).await?;
    ensure_can_assign(actor.role(), Some(membership.role()), role)?;

    let updated = state
        .store
        .update_membership_role(membership.membership_id, role)
        .await?;

    Ok(Json(Document::new(membership_resource(&updated))))
}

/// Remove a member. Requires admin; removing an owner requires owner.
pub async fn delete_membership(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let membership = load_membership(&state, parse_id(&id, "id")?).await?;

    let actor = require_role(
        state.store.as_ref(),
        membership.organization_id,
        identity.user_id,
        Role::Admin,
    )
    .await?;
    if membership.role() == Role::Owner && actor.role() != Role::Owner {
        return Err(AppError::Forbidden(
            "Only an owner can remove an owner membership".to_string(),
        ));
    }

    state.store.delete_membership(membership.membership_id).await?;

    tracing::info!(
        organization_id = %membership.organization_id,
        user_id = %membership.user_id,
        by = %identity.user_id,
        "Membership removed"
    );
    Ok(StatusCode::NO_CONTENT)
}
