use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrganizationAttributes {
    #[serde(default)]
    #[validate(length(min = 1, max = 100, message = "must be between 1 and 100 characters"))]
    pub name: String,
    #[validate(length(min = 1, max = 255, message = "must be between 1 and 255 characters"))]
    pub description: Option<String>,
    #[validate(email(message = "must be a valid email address"))]
    pub contact_email: Option<String>,
    #[validate(url(message = "must be a valid URL"))]
    pub website_url: Option<String>,
    /// Base64 image bytes.
    pub logo: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct CreateOrganizationData {
    #[serde(default)]
    #[validate(nested)]
    pub attributes: CreateOrganizationAttributes,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct CreateOrganizationRequest {
    #[serde(default)]
    #[validate(nested)]
    pub data: CreateOrganizationData,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrganizationAttributes {
    #[validate(length(min = 1, max = 100, message = "must be between 1 and 100 characters"))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 255, message = "must be between 1 and 255 characters"))]
    pub description: Option<String>,
    #[validate(email(message = "must be a valid email address"))]
    pub contact_email: Option<String>,
    #[validate(url(message = "must be a valid URL"))]
    pub website_url: Option<String>,
    pub logo: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateOrganizationData {
    #[serde(default)]
    #[validate(nested)]
    pub attributes: UpdateOrganizationAttributes,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateOrganizationRequest {
    #[serde(default)]
    #[validate(nested)]
    pub data: UpdateOrganizationData,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationAttributes {
    pub name: String,
    pub description: Option<String>,
    pub contact_email: Option<String>,
    pub website_url: Option<String>,
    pub logo_url: Option<String>,
    pub has_stripe_account: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
