use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use secrecy::Secret;
use serde_json::json;
use service_core::error::AppError;
use service_core::observability::record_job_enqueued;

use super::{commit_logo, store_logo, token_meta, user_resource};
use crate::access::{current_user, require_membership, require_platform_admin};
use crate::dtos::{
    users::{
        CreateTokenRequest, CreateUserRequest, EmailVerificationJob, ListUsersQuery, LoginRequest,
        UpdateUserAttributes, UpdateUserRequest, VerifyEmailRequest,
    },
    Document,
};
use crate::middleware::AuthUser;
use crate::models::User;
use crate::services::{
    jobs::{Job, EMAIL_VERIFICATION_JOB},
    storage::USER_LOGO_BUCKET,
    ServiceError, UserListQuery,
};
use crate::utils::{
    hash_password, paginate, parse_id, verify_password, Cursor, ValidatedJson, ValidatedQuery,
    DEFAULT_PAGE_SIZE,
};
use crate::AppState;

/// Sign up with name, email and password. Returns the user and a session token.
/// The address starts unverified and a verification email is queued.
pub async fn create_user(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    let attributes = request.data.attributes;
    let password_hash = hash_password(&Secret::new(attributes.password))?;

    let mut user = User::new(
        attributes.name.trim().to_string(),
        attributes.email.trim().to_string(),
        Some(password_hash),
    );
    let verification = user.begin_email_verification(Utc::now());
    state.store.insert_user(&user).await?;
    tracing::info!(user_id = %user.user_id, "User registered");

    // The account exists either way; the user can ask for another email
    if let Err(e) = queue_email_verification(&state, &user, verification).await {
        tracing::warn!(user_id = %user.user_id, error = %e, "Verification email not queued");
    }

    let token = state.jwt.issue(&user, None)?;

    Ok((
        StatusCode::CREATED,
        Json(Document::new(user_resource(&state, &user)).with_meta(token_meta(&token))),
    ))
}

/// Password login. Any failure is the same 401.
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let attributes = request.data.attributes;
    let email = attributes.email.trim().to_lowercase();

    let user = state
        .store
        .find_user_by_email(&email)
        .await?
        .ok_or_else(|| AppError::unauthenticated("login for unknown email"))?;

    let hash = user
        .password_hash
        .as_deref()
        .ok_or_else(|| AppError::unauthenticated(format!("user {} has no password", user.user_id)))?;

    if !verify_password(&Secret::new(attributes.password), hash) {
        return Err(AppError::unauthenticated(format!(
            "wrong password for user {}",
            user.user_id
        )));
    }

    let token = state.jwt.issue(&user, None)?;
    tracing::info!(user_id = %user.user_id, "User logged in");

    Ok(Json(
        Document::new(user_resource(&state, &user)).with_meta(token_meta(&token)),
    ))
}

pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let user = current_user(state.store.as_ref(), &identity).await?;
    Ok(Json(Document::new(user_resource(&state, &user))))
}

pub async fn update_me(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    ValidatedJson(request): ValidatedJson<UpdateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = current_user(state.store.as_ref(), &identity).await?;
    let user = apply_update(&state, user, request.data.attributes).await?;
    Ok(Json(Document::new(user_resource(&state, &user))))
}

/// Own profile, or any profile for a platform admin.
pub async fn get_user(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = parse_id(&id, "id")?;
    let caller = current_user(state.store.as_ref(), &identity).await?;

    if caller.user_id != user_id && !caller.is_platform_admin() {
        return Err(AppError::Forbidden("You can only view your own profile".to_string()));
    }

    let user = state
        .store
        .find_user_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(Document::new(user_resource(&state, &user))))
}

pub async fn update_user(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
    ValidatedJson(request): ValidatedJson<UpdateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = parse_id(&id, "id")?;
    if user_id != identity.user_id {
        return Err(AppError::Forbidden("You can only update your own profile".to_string()));
    }

    let user = current_user(state.store.as_ref(), &identity).await?;
    let user = apply_update(&state, user, request.data.attributes).await?;
    Ok(Json(Document::new(user_resource(&state, &user))))
}

/// Platform-admin listing with search and keyset pagination.
pub async fn list_users(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    ValidatedQuery(query): ValidatedQuery<ListUsersQuery>,
) -> Result<impl IntoResponse, AppError> {
    require_platform_admin(state.store.as_ref(), &identity).await?;

    let size = query.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
    let after = match query.page_cursor.as_deref() {
        Some(raw) if !raw.is_empty() => {
            let cursor = Cursor::decode(raw)?;
            Some((cursor.created, cursor.id))
        }
        _ => None,
    };

    let rows = state
        .store
        .list_users(&UserListQuery {
            search: query.search.filter(|s| !s.trim().is_empty()),
            after,
            limit: size + 1,
        })
        .await?;

    let (users, page) = paginate(rows, size, |u| Cursor {
        created: u.created_utc,
        id: u.user_id,
    });

    let data: Vec<_> = users.iter().map(|u| user_resource(&state, u)).collect();
    Ok(Json(Document::new(data).with_meta(page)))
}

/// Confirm control of the current email address.
pub async fn verify_email(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    ValidatedJson(request): ValidatedJson<VerifyEmailRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut user = current_user(state.store.as_ref(), &identity).await?;
    if user.email_verified {
        return Err(AppError::Conflict("Email address is already verified".to_string()));
    }

    let now = Utc::now();
    if !user.confirm_email(&request.data.attributes.token, now) {
        return Err(AppError::invalid_field(
            "data.attributes.token",
            "is invalid or has expired",
        ));
    }
    user.updated_utc = now;
    state.store.update_user(&user).await?;

    tracing::info!(user_id = %user.user_id, "Email verified");
    Ok(Json(Document::new(user_resource(&state, &user))))
}

/// Replace the outstanding verification token and email it again.
pub async fn resend_email_verification(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let mut user = current_user(state.store.as_ref(), &identity).await?;
    if user.email_verified {
        return Err(AppError::Conflict("Email address is already verified".to_string()));
    }

    let now = Utc::now();
    let verification = user.begin_email_verification(now);
    user.updated_utc = now;
    state.store.update_user(&user).await?;

    queue_email_verification(&state, &user, verification)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to enqueue verification email: {}", e)))?;

    Ok((StatusCode::ACCEPTED, Json(json!({}))))
}

/// Issue a fresh token, optionally scoped to an organization the caller belongs to.
pub async fn create_token(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    ValidatedJson(request): ValidatedJson<CreateTokenRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = current_user(state.store.as_ref(), &identity).await?;

    let organization = match request.data.attributes.organization_id {
        Some(organization_id) => {
            let membership =
                require_membership(state.store.as_ref(), organization_id, user.user_id).await?;
            Some((organization_id, membership.role()))
        }
        None => None,
    };

    let token = state.jwt.issue(&user, organization)?;
    Ok((
        StatusCode::CREATED,
        Json(Document::new(user_resource(&state, &user)).with_meta(token_meta(&token))),
    ))
}

async fn apply_update(
    state: &AppState,
    mut user: User,
    attributes: UpdateUserAttributes,
) -> Result<User, AppError> {
    if let Some(name) = attributes.name {
        user.name = name.trim().to_string();
    }
    let now = Utc::now();
    let verification = match attributes.email {
        Some(email) => user.change_email(&email, now),
        None => None,
    };
    if let Some(password) = attributes.password {
        user.password_hash = Some(hash_password(&Secret::new(password))?);
    }

    let previous_logo = user.logo_key.clone();
    let fresh_logo = match attributes.logo {
        Some(logo) => Some(
            store_logo(
                state.storage.as_ref(),
                USER_LOGO_BUCKET,
                user.user_id,
                &logo,
                "data.attributes.logo",
            )
            .await?,
        ),
        None => None,
    };
    if let Some(key) = &fresh_logo {
        user.logo_key = Some(key.clone());
    }

    user.updated_utc = now;
    commit_logo(
        state.storage.as_ref(),
        USER_LOGO_BUCKET,
        fresh_logo.as_deref(),
        previous_logo.as_deref(),
        state.store.update_user(&user),
    )
    .await?;

    if let Some(verification) = verification {
        tracing::info!(user_id = %user.user_id, "Email changed, verification required");
        if let Err(e) = queue_email_verification(state, &user, verification).await {
            tracing::warn!(user_id = %user.user_id, error = %e, "Verification email not queued");
        }
    }
    Ok(user)
}

async fn queue_email_verification(
    state: &AppState,
    user: &User,
    token: String,
) -> Result<(), ServiceError> {
    let payload = EmailVerificationJob {
        user_id: user.user_id.to_string(),
        name: user.name.clone(),
        email: user.email.clone(),
        token,
        expires_at: user.email_verification_expiry_utc.unwrap_or_else(Utc::now),
    };

    let enqueued = match Job::new(EMAIL_VERIFICATION_JOB, &payload) {
        Ok(job) => state.jobs.enqueue(job).await,
        Err(e) => Err(e),
    };
    record_job_enqueued(EMAIL_VERIFICATION_JOB, enqueued.is_ok());
    enqueued
}
