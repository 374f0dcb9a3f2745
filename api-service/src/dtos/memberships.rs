use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{validate_any_role, validate_assignable_role, RelationshipRef};

/// `?organizationId=` filter shared by the membership and invitation listings.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationScopedQuery {
    #[validate(required(message = "is required"))]
    pub organization_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct MembershipRoleAttributes {
    #[serde(default)]
    #[validate(custom(function = "validate_assignable_role"))]
    pub role: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct CreateMembershipRelationships {
    #[serde(default)]
    #[validate(nested)]
    pub user: RelationshipRef,
    #[serde(default)]
    #[validate(nested)]
    pub organization: RelationshipRef,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct CreateMembershipData {
    #[serde(default)]
    #[validate(nested)]
    pub attributes: MembershipRoleAttributes,
    #[serde(default)]
    #[validate(nested)]
    pub relationships: CreateMembershipRelationships,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct CreateMembershipRequest {
    #[serde(default)]
    #[validate(nested)]
    pub data: CreateMembershipData,
}

/// Role changes may also move ownership, so `owner` is accepted here.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateMembershipAttributes {
    #[serde(default)]
    #[validate(custom(function = "validate_any_role"))]
    pub role: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateMembershipData {
    #[serde(default)]
    #[validate(nested)]
    pub attributes: UpdateMembershipAttributes,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateMembershipRequest {
    #[serde(default)]
    #[validate(nested)]
    pub data: UpdateMembershipData,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipAttributes {
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
