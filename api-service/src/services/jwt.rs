use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::models::{Identity, Role, User, UserRole};

/// Issues and verifies HS256 session tokens against a single shared secret.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
    expiry_seconds: i64,
}

/// Claims carried by a session token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    /// Platform role code
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_role: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Token returned to clients after login or token exchange
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Result<Self, anyhow::Error> {
        let secret = config.secret.expose_secret();
        if secret.is_empty() {
            return Err(anyhow::anyhow!("JWT secret must not be empty"));
        }

        tracing::info!(issuer = %config.issuer, "JWT service initialized with HS256 secret");

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            expiry_seconds: config.expiry_seconds,
        })
    }

    /// Issue a token for `user`, optionally scoped to an organization role.
    pub fn issue(&self, user: &User, organization: Option<(Uuid, Role)>) -> Result<TokenResponse, anyhow::Error> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.expiry_seconds);

        let platform_role = user.role();
        let mut scopes: Vec<String> = platform_role.scopes().iter().map(|s| s.to_string()).collect();
        if let Some((_, role)) = organization {
            scopes.extend(role.scopes().iter().map(|s| s.to_string()));
        }

        let claims = Claims {
            sub: user.user_id.to_string(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: exp.timestamp(),
            role: platform_role.as_str().to_string(),
            organization_id: organization.map(|(id, _)| id),
            organization_role: organization.map(|(_, role)| role.as_str().to_string()),
            scopes,
        };

        let token = self.encode_claims(&claims)?;

        Ok(TokenResponse {
            token,
            token_type: "Bearer".to_string(),
            expires_in: self.expiry_seconds,
        })
    }

    pub(crate) fn encode_claims(&self, claims: &Claims) -> Result<String, anyhow::Error> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode token: {}", e))
    }

    /// Verify signature, issuer, audience and expiry, then build the identity.
    pub fn validate(&self, token: &str) -> Result<Identity, anyhow::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.validate_nbf = true;
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| anyhow::anyhow!("Invalid token: {}", e))?;
        let claims = data.claims;

        // jsonwebtoken accepts exp == now
        if claims.exp <= Utc::now().timestamp() {
            return Err(anyhow::anyhow!("Invalid token: expired"));
        }

        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|e| anyhow::anyhow!("Invalid token subject: {}", e))?;
        let platform_role = claims.role.parse::<UserRole>().unwrap_or_default();
        let organization_role = match claims.organization_role.as_deref() {
            Some(code) => Some(
                code.parse::<Role>()
                    .map_err(|e| anyhow::anyhow!("Invalid organization role claim: {}", e))?,
            ),
            None => None,
        };

        Ok(Identity {
            user_id,
            platform_role,
            issued_at: claims.iat,
            expires_at: claims.exp,
            issuer: claims.iss,
            audience: claims.aud,
            organization_id: claims.organization_id,
            organization_role,
            scopes: claims.scopes,
        })
    }
}
