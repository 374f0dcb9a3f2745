use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{validate_assignable_role, RelationshipRef};

#[derive(Debug, Default, Deserialize, Validate)]
pub struct InviteAttributes {
    #[serde(default)]
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[serde(default)]
    #[validate(custom(function = "validate_assignable_role"))]
    pub role: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct InviteRelationships {
    #[serde(default)]
    #[validate(nested)]
    pub organization: RelationshipRef,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct InviteData {
    #[serde(default)]
    #[validate(nested)]
    pub attributes: InviteAttributes,
    #[serde(default)]
    #[validate(nested)]
    pub relationships: InviteRelationships,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct InviteRequest {
    #[serde(default)]
    #[validate(nested)]
    pub data: InviteData,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct InvitationIdentifier {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "is required"))]
    pub id: String,
}

/// Body of accept and decline: `{ "data": { "type": "organization-invitation", "id": ... } }`
#[derive(Debug, Default, Deserialize, Validate)]
pub struct InvitationActionRequest {
    #[serde(default)]
    #[validate(nested)]
    pub data: InvitationIdentifier,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitationAttributes {
    pub email: String,
    pub role: String,
    pub status: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload of the invitation email job.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitationEmailJob {
    pub invitation_id: String,
    pub organization_id: String,
    pub organization_name: String,
    pub inviter_name: String,
    pub email: String,
    pub role: String,
    pub token: String,
}
