//! Invitation model - an offer of membership addressed to an email.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::{generate_token, Role};

pub const INVITATION_TTL_DAYS: i64 = 7;

/// Invitation status. `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Declined,
    Expired,
    Revoked,
}

impl InvitationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationStatus::Pending => "pending",
            InvitationStatus::Accepted => "accepted",
            InvitationStatus::Declined => "declined",
            InvitationStatus::Expired => "expired",
            InvitationStatus::Revoked => "revoked",
        }
    }

    pub fn is_terminal(self) -> bool {
        self != InvitationStatus::Pending
    }
}

impl std::str::FromStr for InvitationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(InvitationStatus::Pending),
            "accepted" => Ok(InvitationStatus::Accepted),
            "declined" => Ok(InvitationStatus::Declined),
            "expired" => Ok(InvitationStatus::Expired),
            "revoked" => Ok(InvitationStatus::Revoked),
            _ => Err(format!("Invalid invitation status: {}", s)),
        }
    }
}

/// Invitation entity.
#[derive(Debug, Clone, FromRow)]
pub struct Invitation {
    pub invitation_id: Uuid,
    pub organization_id: Uuid,
    pub email: String,
    pub role_code: String,
    pub status_code: String,
    pub token: String,
    pub inviting_user_id: Uuid,
    pub expiry_utc: DateTime<Utc>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Invitation {
    pub fn new(organization_id: Uuid, email: &str, role: Role, inviting_user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            invitation_id: Uuid::new_v4(),
            organization_id,
            email: email.to_lowercase(),
            role_code: role.as_str().to_string(),
            status_code: InvitationStatus::Pending.as_str().to_string(),
            token: generate_token(),
            inviting_user_id,
            expiry_utc: now + Duration::days(INVITATION_TTL_DAYS),
            created_utc: now,
            updated_utc: now,
        }
    }

    /// Unparseable codes are treated as terminal so nothing can act on them.
    pub fn status(&self) -> InvitationStatus {
        self.status_code.parse().unwrap_or(InvitationStatus::Revoked)
    }

    pub fn role(&self) -> Role {
        self.role_code.parse().unwrap_or(Role::Member)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry_utc
    }

    /// Whether `email` is the address this invitation was sent to.
    pub fn is_addressed_to(&self, email: &str) -> bool {
        self.email.eq_ignore_ascii_case(email)
    }
}
