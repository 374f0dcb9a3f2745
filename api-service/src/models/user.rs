//! User model - platform accounts.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use uuid::Uuid;

use super::generate_token;

pub const EMAIL_VERIFICATION_TTL_HOURS: i64 = 24;

/// Platform-wide role, independent of any organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    Default,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Default => "default",
            UserRole::Admin => "admin",
        }
    }

    pub fn scopes(self) -> &'static [&'static str] {
        match self {
            UserRole::Default => &[],
            UserRole::Admin => &["admin", "admin:users:list", "admin:users:read"],
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(UserRole::Default),
            "admin" => Ok(UserRole::Admin),
            _ => Err(format!("Invalid user role: {}", s)),
        }
    }
}

/// User entity.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    /// Set only once control of `email` has been proven.
    pub email_verified: bool,
    /// SHA-256 of the outstanding verification token; the raw token is only ever emailed.
    pub email_verification_hash: Option<String>,
    pub email_verification_expiry_utc: Option<DateTime<Utc>>,
    /// Absent for accounts created through an OAuth provider.
    pub password_hash: Option<String>,
    pub google_id: Option<String>,
    pub role_code: String,
    pub logo_key: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl User {
    pub fn new(name: String, email: String, password_hash: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id: Uuid::new_v4(),
            name,
            email: email.to_lowercase(),
            email_verified: false,
            email_verification_hash: None,
            email_verification_expiry_utc: None,
            password_hash,
            google_id: None,
            role_code: UserRole::Default.as_str().to_string(),
            logo_key: None,
            created_utc: now,
            updated_utc: now,
        }
    }

    pub fn role(&self) -> UserRole {
        self.role_code.parse().unwrap_or_default()
    }

    pub fn is_platform_admin(&self) -> bool {
        self.role() == UserRole::Admin
    }

    /// Issues a fresh verification token for the current address, replacing
    /// any earlier one. Returns the raw token for delivery.
    pub fn begin_email_verification(&mut self, now: DateTime<Utc>) -> String {
        let token = generate_token();
        self.email_verified = false;
        self.email_verification_hash = Some(hash_token(&token));
        self.email_verification_expiry_utc = Some(now + Duration::hours(EMAIL_VERIFICATION_TTL_HOURS));
        token
    }

    /// Switches to a new address, which starts out unverified. Returns the
    /// verification token when the address actually changed.
    pub fn change_email(&mut self, email: &str, now: DateTime<Utc>) -> Option<String> {
        let email = email.trim().to_lowercase();
        if email == self.email {
            return None;
        }
        self.email = email;
        Some(self.begin_email_verification(now))
    }

    /// Proves control of the address. False for a wrong or expired token.
    pub fn confirm_email(&mut self, token: &str, now: DateTime<Utc>) -> bool {
        let (Some(hash), Some(expiry)) = (
            self.email_verification_hash.as_deref(),
            self.email_verification_expiry_utc,
        ) else {
            return false;
        };
        if now >= expiry || hash != hash_token(token.trim()) {
            return false;
        }
        self.mark_email_verified();
        true
    }

    /// The address was vouched for by an identity provider.
    pub fn mark_email_verified(&mut self) {
        self.email_verified = true;
        self.email_verification_hash = None;
        self.email_verification_expiry_utc = None;
    }
}

fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_users_are_default_role_with_normalized_email() {
        let user = User::new("Ada".to_string(), "Ada@Example.COM".to_string(), None);
        assert_eq!(user.email, "ada@example.com");
        assert_eq!(user.role(), UserRole::Default);
        assert!(!user.is_platform_admin());
        assert!(user.role().scopes().is_empty());
    }

    #[test]
    fn verification_token_confirms_once() {
        let mut user = User::new("Ada".to_string(), "ada@example.com".to_string(), None);
        assert!(!user.email_verified);

        let now = Utc::now();
        let token = user.begin_email_verification(now);
        assert_ne!(user.email_verification_hash.as_deref(), Some(token.as_str()));
        assert!(!user.confirm_email("wrong", now));
        assert!(user.confirm_email(&token, now));
        assert!(user.email_verified);
        assert!(user.email_verification_hash.is_none());

        // spent
        assert!(!user.confirm_email(&token, now));
    }

    #[test]
    fn expired_verification_token_is_refused() {
        let mut user = User::new("Ada".to_string(), "ada@example.com".to_string(), None);
        let now = Utc::now();
        let token = user.begin_email_verification(now);
        let later = now + Duration::hours(EMAIL_VERIFICATION_TTL_HOURS);
        assert!(!user.confirm_email(&token, later));
        assert!(!user.email_verified);
    }

    #[test]
    fn changing_email_drops_verification() {
        let mut user = User::new("Ada".to_string(), "ada@example.com".to_string(), None);
        user.mark_email_verified();

        assert!(user.change_email(" ADA@example.com ", Utc::now()).is_none());
        assert!(user.email_verified);

        let token = user.change_email("bob@example.com", Utc::now());
        assert!(token.is_some());
        assert_eq!(user.email, "bob@example.com");
        assert!(!user.email_verified);
    }

    #[test]
    fn unknown_role_code_is_not_admin() {
        let mut user = User::new("Ada".to_string(), "ada@example.com".to_string(), None);
        user.role_code = "root".to_string();
        assert!(!user.is_platform_admin());
    }
}
