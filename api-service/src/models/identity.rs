use uuid::Uuid;

use super::{Role, UserRole};

/// The authenticated principal of one request. Built from verified token
/// claims and dropped with the request.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub user_id: Uuid,
    pub platform_role: UserRole,
    pub issued_at: i64,
    pub expires_at: i64,
    pub issuer: String,
    pub audience: String,
    /// Informational only. Access checks always re-read the membership.
    pub organization_id: Option<Uuid>,
    pub organization_role: Option<Role>,
    pub scopes: Vec<String>,
}
