use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use service_core::error::AppError;
use uuid::Uuid;

use super::{commit_logo, discard_logo, organization_resource, store_logo};
use crate::access::{require_membership, require_role};
use crate::dtos::{
    organizations::{CreateOrganizationRequest, UpdateOrganizationRequest},
    Document,
};
use crate::middleware::AuthUser;
use crate::models::{Membership, Organization, Role};
use crate::services::storage::ORGANIZATION_LOGO_BUCKET;
use crate::utils::{parse_id, ValidatedJson};
use crate::AppState;

pub(crate) async fn load_organization(state: &AppState, organization_id: Uuid) -> Result<Organization, AppError> {
    state
        .store
        .find_organization(organization_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Organization not found".to_string()))
}

/// Organizations the caller belongs to.
pub async fn list_organizations(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let organizations = state.store.list_organizations_for_user(identity.user_id).await?;
    let data: Vec<_> = organizations
        .iter()
        .map(|o| organization_resource(&state, o))
        .collect();
    Ok(Json(Document::new(data)))
}

/// Create an organization. The caller becomes its owner in the same write.
pub async fn create_organization(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    ValidatedJson(request): ValidatedJson<CreateOrganizationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let attributes = request.data.attributes;

    let mut organization = Organization::new(attributes.name.trim().to_string(), attributes.description);
    organization.contact_email = attributes.contact_email;
    organization.website_url = attributes.website_url;

    if let Some(logo) = attributes.logo {
        let key = store_logo(
            state.storage.as_ref(),
            ORGANIZATION_LOGO_BUCKET,
            organization.organization_id,
            &logo,
            "data.attributes.logo",
        )
        .await?;
        organization.logo_key = Some(key);
    }

    let owner = Membership::new(organization.organization_id, identity.user_id, Role::Owner);
    commit_logo(
        state.storage.as_ref(),
        ORGANIZATION_LOGO_BUCKET,
        organization.logo_key.as_deref(),
        None,
        state.store.create_organization(&organization, &owner),
    )
    .await?;

    tracing::info!(
        organization_id = %organization.organization_id,
        owner = %identity.user_id,
        "Organization created"
    );

    Ok((
        StatusCode::CREATED,
        Json(Document::new(organization_resource(&state, &organization))),
    ))
}

pub async fn get_organization(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let organization_id = parse_id(&id, "id")?;
    require_membership(state.store.as_ref(), organization_id, identity.user_id).await?;

    let organization = load_organization(&state, organization_id).await?;
    Ok(Json(Document::new(organization_resource(&state, &organization))))
}

pub async fn update_organization(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
    ValidatedJson(request): ValidatedJson<UpdateOrganizationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let organization_id = parse_id(&id, "id")?;
    require_role(state.store.as_ref(), organization_id, identity.user_id, Role::Admin).await?;

    let mut organization = load_organization(&state, organization_id).await?;
    let previous_logo = organization.logo_key.clone();
    let attributes = request.data.attributes;

    if let Some(name) = attributes.name {
        organization.name = name.trim().to_string();
    }
    if let Some(description) = attributes.description {
        organization.description = Some(description);
    }
    if let Some(contact_email) = attributes.contact_email {
        organization.contact_email = Some(contact_email);
    }
    if let Some(website_url) = attributes.website_url {
        organization.website_url = Some(website_url);
    }
    let fresh_logo = match attributes.logo {
        Some(logo) => Some(
            store_logo(
                state.storage.as_ref(),
                ORGANIZATION_LOGO_BUCKET,
                organization.organization_id,
                &logo,
                "data.attributes.logo",
            )
            .await?,
        ),
        None => None,
    };
    if let Some(key) = &fresh_logo {
        organization.logo_key = Some(key.clone());
    }

    organization.updated_utc = Utc::now();
    commit_logo(
        state.storage.as_ref(),
        ORGANIZATION_LOGO_BUCKET,
        fresh_logo.as_deref(),
        previous_logo.as_deref(),
        state.store.update_organization(&organization),
    )
    .await?;

    Ok(Json(Document::new(organization_resource(&state, &organization))))
}

/// Owner only. Memberships and invitations go with it.
pub async fn delete_organization(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let organization_id = parse_id(&id, "id")?;
    require_role(state.store.as_ref(), organization_id, identity.user_id, Role::Owner).await?;

    let organization = load_organization(&state, organization_id).await?;
    state.store.delete_organization(organization_id).await?;

    if let Some(key) = organization.logo_key.as_deref() {
        discard_logo(state.storage.as_ref(), ORGANIZATION_LOGO_BUCKET, key).await;
    }

    tracing::info!(%organization_id, by = %identity.user_id, "Organization deleted");
    Ok(StatusCode::NO_CONTENT)
}
