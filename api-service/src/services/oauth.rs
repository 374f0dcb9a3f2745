use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::ServiceError;
use crate::config::GoogleOAuthConfig;

/// Profile returned by Google's OpenID userinfo endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoogleUserInfo {
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

#[async_trait]
pub trait GoogleOAuthProvider: Send + Sync {
    /// Exchange an authorization code and fetch the caller's profile.
    async fn authenticate(&self, code: &str, redirect_uri: &str) -> Result<GoogleUserInfo, ServiceError>;
}

#[derive(Debug, Deserialize)]
struct TokenExchange {
    access_token: String,
}

#[derive(Clone)]
pub struct GoogleOAuthClient {
    client: Client,
    config: GoogleOAuthConfig,
}

impl GoogleOAuthClient {
    pub fn new(config: GoogleOAuthConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl GoogleOAuthProvider for GoogleOAuthClient {
    async fn authenticate(&self, code: &str, redirect_uri: &str) -> Result<GoogleUserInfo, ServiceError> {
        if self.config.client_id.is_empty() {
            return Err(ServiceError::Provider("Google OAuth not configured".to_string()));
        }

        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret().as_str()),
        ];

        let response = self
            .client
            .post(&self.config.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| ServiceError::Provider(format!("Google token exchange failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %body, "Google rejected authorization code");
            return Err(ServiceError::Provider(format!("Google token exchange returned {}", status)));
        }

        let exchange: TokenExchange = response
            .json()
            .await
            .map_err(|e| ServiceError::Provider(format!("Google token response invalid: {}", e)))?;

        let response = self
            .client
            .get(&self.config.userinfo_url)
            .bearer_auth(&exchange.access_token)
            .send()
            .await
            .map_err(|e| ServiceError::Provider(format!("Google userinfo failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(status = %status, "Google userinfo request failed");
            return Err(ServiceError::Provider(format!("Google userinfo returned {}", status)));
        }

        response
            .json::<GoogleUserInfo>()
            .await
            .map_err(|e| ServiceError::Provider(format!("Google userinfo invalid: {}", e)))
    }
}

/// Resolves codes from a fixed table. Unknown codes are rejected.
#[derive(Default)]
pub struct MockGoogleOAuth {
    profiles: HashMap<String, GoogleUserInfo>,
}

impl MockGoogleOAuth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(mut self, code: &str, profile: GoogleUserInfo) -> Self {
        self.profiles.insert(code.to_string(), profile);
        self
    }
}

#[async_trait]
impl GoogleOAuthProvider for MockGoogleOAuth {
    async fn authenticate(&self, code: &str, _redirect_uri: &str) -> Result<GoogleUserInfo, ServiceError> {
        self.profiles
            .get(code)
            .cloned()
            .ok_or_else(|| ServiceError::Provider("invalid_grant".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_resolves_only_known_codes() {
        let oauth = MockGoogleOAuth::new().with_profile(
            "good",
            GoogleUserInfo {
                sub: "g-1".to_string(),
                email: "g@example.com".to_string(),
                email_verified: true,
                name: Some("G".to_string()),
                picture: None,
            },
        );

        assert_eq!(oauth.authenticate("good", "http://cb").await.unwrap().sub, "g-1");
        assert!(oauth.authenticate("bad", "http://cb").await.is_err());
    }

    #[test]
    fn userinfo_defaults_missing_fields() {
        let info: GoogleUserInfo =
            serde_json::from_str(r#"{"sub":"1","email":"a@b.c"}"#).unwrap();
        assert!(!info.email_verified);
        assert!(info.name.is_none());
    }
}
