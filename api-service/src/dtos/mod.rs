//! Wire shapes. Bodies follow a `{ "data": { "type", "id", "attributes", "relationships" } }`
//! envelope with camelCase attribute names.

pub mod billing;
pub mod invitations;
pub mod memberships;
pub mod organizations;
pub mod users;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use validator::{Validate, ValidationError};

pub const USER_TYPE: &str = "user";
pub const ORGANIZATION_TYPE: &str = "organization";
pub const MEMBERSHIP_TYPE: &str = "organization-membership";
pub const INVITATION_TYPE: &str = "organization-invitation";

/// A single typed resource object.
#[derive(Debug, Serialize, Deserialize)]
pub struct Resource<A> {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    pub attributes: A,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationships: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl<A> Resource<A> {
    pub fn new(kind: &str, id: impl ToString, attributes: A) -> Self {
        Self {
            kind: kind.to_string(),
            id: id.to_string(),
            attributes,
            relationships: None,
            meta: None,
        }
    }

    pub fn with_relationships(mut self, relationships: Value) -> Self {
        self.relationships = Some(relationships);
        self
    }

    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// Top-level response document.
#[derive(Debug, Serialize, Deserialize)]
pub struct Document<T> {
    pub data: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub included: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl<T> Document<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            included: None,
            meta: None,
        }
    }

    pub fn with_meta(mut self, meta: impl Serialize) -> Self {
        self.meta = serde_json::to_value(meta).ok();
        self
    }
}

/// `{ "data": { "type": kind, "id": id } }`
pub fn relationship(kind: &str, id: impl ToString) -> Value {
    json!({ "data": { "type": kind, "id": id.to_string() } })
}

/// Reference to another resource inside a request body.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct ResourceIdentifier {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "is required"))]
    pub id: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct RelationshipRef {
    #[serde(default)]
    #[validate(nested)]
    pub data: ResourceIdentifier,
}

pub(crate) fn validate_assignable_role(role: &str) -> Result<(), ValidationError> {
    match role {
        "admin" | "member" => Ok(()),
        _ => Err(ValidationError::new("role").with_message("must be one of: admin, member".into())),
    }
}

pub(crate) fn validate_any_role(role: &str) -> Result<(), ValidationError> {
    match role {
        "owner" | "admin" | "member" => Ok(()),
        _ => Err(ValidationError::new("role").with_message("must be one of: owner, admin, member".into())),
    }
}
