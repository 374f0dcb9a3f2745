use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use super::organizations::load_organization;
use crate::access::{require_membership, require_role};
use crate::dtos::{
    billing::{
        CheckoutSessionRequest, PortalSessionRequest, RedirectAttributes, BILLING_PORTAL_SESSION_TYPE,
        CHECKOUT_SESSION_TYPE, STRIPE_LINK_TYPE, SUBSCRIPTION_TYPE,
    },
    Document, Resource,
};
use crate::middleware::AuthUser;
use crate::models::{Organization, Role};
use crate::utils::{parse_id, ValidatedJson};
use crate::AppState;

/// Onboarding link for the organization's connected account, creating the
/// account on first use.
pub async fn stripe_onboarding_link(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let organization_id = parse_id(&id, "id")?;
    require_role(state.store.as_ref(), organization_id, identity.user_id, Role::Admin).await?;

    let organization = load_organization(&state, organization_id).await?;
    let account_id = match organization.stripe_account_id.clone() {
        Some(account_id) => account_id,
        None => {
            let created = state.billing.create_connected_account(&organization).await?;
            let stored = state
                .store
                .set_stripe_account_id(organization_id, &created)
                .await?;
            stored_reference(stored.stripe_account_id, created, organization_id, "connected account")
        }
    };

    let settings_url = billing_settings_url(&state, &organization);
    let url = state
        .billing
        .create_account_link(&account_id, &settings_url, &settings_url)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(Document::new(Resource::new(
            STRIPE_LINK_TYPE,
            &account_id,
            RedirectAttributes { url },
        ))),
    ))
}

/// Express dashboard login link. Requires a connected account.
pub async fn stripe_dashboard_link(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let organization_id = parse_id(&id, "id")?;
    require_role(state.store.as_ref(), organization_id, identity.user_id, Role::Admin).await?;

    let organization = load_organization(&state, organization_id).await?;
    let account_id = organization.stripe_account_id.as_deref().ok_or_else(|| {
        AppError::Conflict("Organization has not completed Stripe onboarding".to_string())
    })?;

    let url = state.billing.create_login_link(account_id).await?;

    Ok((
        StatusCode::CREATED,
        Json(Document::new(Resource::new(
            STRIPE_LINK_TYPE,
            account_id,
            RedirectAttributes { url },
        ))),
    ))
}

/// Last recorded subscription snapshot. Any member may read it.
pub async fn get_subscription(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let organization_id = parse_id(&id, "id")?;
    require_membership(state.store.as_ref(), organization_id, identity.user_id).await?;

    let organization = load_organization(&state, organization_id).await?;
    Ok(Json(Document::new(Resource::new(
        SUBSCRIPTION_TYPE,
        organization_id,
        organization.subscription(),
    ))))
}

pub async fn create_checkout_session(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
    ValidatedJson(request): ValidatedJson<CheckoutSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let organization_id = parse_id(&id, "id")?;
    require_role(state.store.as_ref(), organization_id, identity.user_id, Role::Admin).await?;

    let organization = load_organization(&state, organization_id).await?;
    let customer_id = ensure_customer(&state, organization).await?;

    let attributes = request.data.attributes;
    let session = state
        .billing
        .create_checkout_session(&customer_id, &attributes.success_url, &attributes.cancel_url)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(Document::new(Resource::new(
            CHECKOUT_SESSION_TYPE,
            &session.id,
            RedirectAttributes { url: session.url },
        ))),
    ))
}

pub async fn create_billing_portal_session(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
    ValidatedJson(request): ValidatedJson<PortalSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let organization_id = parse_id(&id, "id")?;
    require_role(state.store.as_ref(), organization_id, identity.user_id, Role::Admin).await?;

    let organization = load_organization(&state, organization_id).await?;
    let customer_id = ensure_customer(&state, organization).await?;

    let session = state
        .billing
        .create_billing_portal_session(&customer_id, &request.data.attributes.return_url)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(Document::new(Resource::new(
            BILLING_PORTAL_SESSION_TYPE,
            &session.id,
            RedirectAttributes { url: session.url },
        ))),
    ))
}

async fn ensure_customer(state: &AppState, organization: Organization) -> Result<String, AppError> {
    if let Some(customer_id) = organization.stripe_customer_id.clone() {
        return Ok(customer_id);
    }

    let created = state.billing.create_customer(&organization).await?;
    let stored = state
        .store
        .set_stripe_customer_id(organization.organization_id, &created)
        .await?;
    Ok(stored_reference(
        stored.stripe_customer_id,
        created,
        organization.organization_id,
        "customer",
    ))
}

/// A concurrent request may have recorded its own reference first. The
/// stored one wins and the one created here is left unused.
fn stored_reference(stored: Option<String>, created: String, organization_id: Uuid, kind: &str) -> String {
    match stored {
        Some(stored) if stored != created => {
            tracing::warn!(
                %organization_id,
                kind,
                unused = %created,
                "Concurrent request already recorded a billing reference"
            );
            stored
        }
        _ => created,
    }
}

fn billing_settings_url(state: &AppState, organization: &Organization) -> String {
    format!(
        "{}/app/{}/settings/billing",
        state.config.stripe.frontend_url.trim_end_matches('/'),
        organization.organization_id
    )
}
