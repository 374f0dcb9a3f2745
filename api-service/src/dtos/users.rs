use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserAttributes {
    #[serde(default)]
    #[validate(length(min = 1, max = 100, message = "must be between 1 and 100 characters"))]
    pub name: String,
    #[serde(default)]
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 8, max = 128, message = "must be between 8 and 128 characters"))]
    pub password: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct CreateUserData {
    #[serde(default)]
    #[validate(nested)]
    pub attributes: CreateUserAttributes,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[serde(default)]
    #[validate(nested)]
    pub data: CreateUserData,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct LoginAttributes {
    #[serde(default)]
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "is required"))]
    pub password: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct LoginData {
    #[serde(default)]
    #[validate(nested)]
    pub attributes: LoginAttributes,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct LoginRequest {
    #[serde(default)]
    #[validate(nested)]
    pub data: LoginData,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserAttributes {
    #[validate(length(min = 1, max = 100, message = "must be between 1 and 100 characters"))]
    pub name: Option<String>,
    #[validate(email(message = "must be a valid email address"))]
    pub email: Option<String>,
    #[validate(length(min = 8, max = 128, message = "must be between 8 and 128 characters"))]
    pub password: Option<String>,
    /// Base64 image bytes.
    pub logo: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateUserData {
    #[serde(default)]
    #[validate(nested)]
    pub attributes: UpdateUserAttributes,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[serde(default)]
    #[validate(nested)]
    pub data: UpdateUserData,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GoogleCallbackAttributes {
    #[serde(default)]
    #[validate(length(min = 1, message = "is required"))]
    pub code: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "is required"))]
    pub state: String,
    #[serde(default)]
    #[validate(url(message = "must be a valid URL"))]
    pub redirect_uri: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct GoogleCallbackData {
    #[serde(default)]
    #[validate(nested)]
    pub attributes: GoogleCallbackAttributes,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct GoogleCallbackRequest {
    #[serde(default)]
    #[validate(nested)]
    pub data: GoogleCallbackData,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTokenAttributes {
    /// Scope the token to this organization. Omit for an account-level token.
    pub organization_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct CreateTokenData {
    #[serde(default)]
    #[validate(nested)]
    pub attributes: CreateTokenAttributes,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct CreateTokenRequest {
    #[serde(default)]
    #[validate(nested)]
    pub data: CreateTokenData,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct VerifyEmailAttributes {
    #[serde(default)]
    #[validate(length(min = 1, max = 128, message = "is required"))]
    pub token: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct VerifyEmailData {
    #[serde(default)]
    #[validate(nested)]
    pub attributes: VerifyEmailAttributes,
}

/// `{ "data": { "type": "email-verification", "attributes": { "token": ... } } }`
#[derive(Debug, Default, Deserialize, Validate)]
pub struct VerifyEmailRequest {
    #[serde(default)]
    #[validate(nested)]
    pub data: VerifyEmailData,
}

/// Payload of the verification email job. Carries the only copy of the raw token.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailVerificationJob {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Admin user listing: `?search=&page[size]=&page[cursor]=`
#[derive(Debug, Default, Deserialize, Validate)]
pub struct ListUsersQuery {
    #[validate(length(max = 255, message = "must be at most 255 characters"))]
    pub search: Option<String>,
    #[serde(rename = "page[size]")]
    #[validate(range(min = 1, max = 100, message = "must be between 1 and 100"))]
    pub page_size: Option<i64>,
    #[serde(rename = "page[cursor]")]
    pub page_cursor: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAttributes {
    pub name: String,
    pub email: String,
    pub role: String,
    pub email_verified: bool,
    pub logo_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
