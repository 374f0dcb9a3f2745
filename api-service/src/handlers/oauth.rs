use axum::{extract::State, response::IntoResponse, Json};
use chrono::Utc;
use service_core::error::AppError;

use super::{token_meta, user_resource};
use crate::dtos::{users::GoogleCallbackRequest, Document};
use crate::models::User;
use crate::utils::ValidatedJson;
use crate::AppState;

/// Completes Google sign-in: exchange the code, then find, link or create
/// the account and hand back a session token.
pub async fn google_callback(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<GoogleCallbackRequest>,
) -> Result<impl IntoResponse, AppError> {
    let attributes = request.data.attributes;

    let profile = state
        .google
        .authenticate(&attributes.code, &attributes.redirect_uri)
        .await
        .map_err(|e| AppError::unauthenticated(format!("google sign-in failed: {}", e)))?;

    if !profile.email_verified {
        return Err(AppError::unauthenticated(format!(
            "google account {} has an unverified email",
            profile.sub
        )));
    }

    let email = profile.email.trim().to_lowercase();
    let user = match state.store.find_user_by_google_id(&profile.sub).await? {
        Some(mut user) => {
            if !user.email_verified && user.email == email {
                user.mark_email_verified();
                user.updated_utc = Utc::now();
                state.store.update_user(&user).await?;
            }
            user
        }
        None => match state.store.find_user_by_email(&email).await? {
            // An unverified address may have been registered by someone else
            Some(existing) if !existing.email_verified => {
                service_core::observability::record_access_denied("google_link_unverified");
                return Err(AppError::Conflict(
                    "An unverified account already uses this email address".to_string(),
                ));
            }
            Some(mut user) => {
                user.google_id = Some(profile.sub.clone());
                user.updated_utc = Utc::now();
                state.store.update_user(&user).await?;
                tracing::info!(user_id = %user.user_id, "Linked Google account to existing user");
                user
            }
            None => {
                let name = profile
                    .name
                    .clone()
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| profile.email.clone());
                let mut user = User::new(name, email, None);
                user.google_id = Some(profile.sub.clone());
                user.mark_email_verified();
                state.store.insert_user(&user).await?;
                tracing::info!(user_id = %user.user_id, "User registered via Google");
                user
            }
        },
    };

    let token = state.jwt.issue(&user, None)?;
    Ok(Json(
        Document::new(user_resource(&state, &user)).with_meta(token_meta(&token)),
    ))
}
