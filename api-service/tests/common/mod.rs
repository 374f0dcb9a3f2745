//! Shared harness for the api-service integration tests. Builds the real
//! router over in-memory collaborators.

#![allow(dead_code)]

use api_service::{
    build_router,
    config::{
        ApiConfig, DatabaseConfig, Environment, GoogleOAuthConfig, JwtConfig, RedisConfig,
        SecurityConfig, StorageConfig, StripeConfig,
    },
    services::{
        FailingJobQueue, GoogleUserInfo, InMemoryJobQueue, InMemoryStore, JobQueue, JwtService,
        jobs::EMAIL_VERIFICATION_JOB, LocalStorage, MockBillingProvider, MockGoogleOAuth,
    },
    AppState,
};
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use secrecy::Secret;
use serde_json::{json, Value};
use service_core::observability::detached_metrics_handle;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

pub const JWT_SECRET: &str = "integration-test-secret";
pub const JWT_ISSUER: &str = "api-service-test";
pub const JWT_AUDIENCE: &str = "api-service-test-clients";
pub const WEBHOOK_SECRET: &str = "whsec_integration";
pub const PASSWORD: &str = "correct horse battery";
pub const GOOGLE_CODE: &str = "google-code-verified";
pub const GOOGLE_UNVERIFIED_CODE: &str = "google-code-unverified";

pub fn test_config(storage_path: &str) -> ApiConfig {
    ApiConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "api-service".to_string(),
        service_version: "test".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        redis: RedisConfig {
            url: "redis://unused".to_string(),
            queue_key: "jobs:test".to_string(),
        },
        jwt: JwtConfig {
            secret: Secret::new(JWT_SECRET.to_string()),
            issuer: JWT_ISSUER.to_string(),
            audience: JWT_AUDIENCE.to_string(),
            expiry_seconds: 3600,
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
        stripe: StripeConfig {
            secret_key: Secret::new("sk_test".to_string()),
            webhook_secret: Some(Secret::new(WEBHOOK_SECRET.to_string())),
            api_base: "http://stripe.invalid".to_string(),
            price_id: "price_test".to_string(),
            frontend_url: "http://localhost:3000".to_string(),
        },
        google: GoogleOAuthConfig {
            client_id: "client".to_string(),
            client_secret: Secret::new("secret".to_string()),
            token_url: "http://google.invalid/token".to_string(),
            userinfo_url: "http://google.invalid/userinfo".to_string(),
        },
        storage: StorageConfig {
            path: storage_path.to_string(),
            public_url: "http://localhost:8080/objects".to_string(),
        },
    }
}

fn google_mock() -> MockGoogleOAuth {
    MockGoogleOAuth::new()
        .with_profile(
            GOOGLE_CODE,
            GoogleUserInfo {
                sub: "google-sub-1".to_string(),
                email: "gina@example.com".to_string(),
                email_verified: true,
                name: Some("Gina".to_string()),
                picture: None,
            },
        )
        .with_profile(
            GOOGLE_UNVERIFIED_CODE,
            GoogleUserInfo {
                sub: "google-sub-2".to_string(),
                email: "unverified@example.com".to_string(),
                email_verified: false,
                name: None,
                picture: None,
            },
        )
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<InMemoryStore>,
    pub jobs: Arc<InMemoryJobQueue>,
    pub billing: Arc<MockBillingProvider>,
    _storage_dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let jobs = Arc::new(InMemoryJobQueue::new());
        Self::build(jobs.clone(), jobs, MockBillingProvider::new(), |_| {}).await
    }

    /// Every enqueue fails, so signups also stay unverified.
    pub async fn with_failing_queue() -> Self {
        Self::build(
            Arc::new(FailingJobQueue),
            Arc::new(InMemoryJobQueue::new()),
            MockBillingProvider::new(),
            |_| {},
        )
        .await
    }

    pub async fn with_config(adjust: impl FnOnce(&mut ApiConfig)) -> Self {
        let jobs = Arc::new(InMemoryJobQueue::new());
        Self::build(jobs.clone(), jobs, MockBillingProvider::new(), adjust).await
    }

    pub async fn with_billing(billing: MockBillingProvider) -> Self {
        let jobs = Arc::new(InMemoryJobQueue::new());
        Self::build(jobs.clone(), jobs, billing, |_| {}).await
    }

    async fn build(
        queue: Arc<dyn JobQueue>,
        jobs: Arc<InMemoryJobQueue>,
        billing: MockBillingProvider,
        adjust: impl FnOnce(&mut ApiConfig),
    ) -> Self {
        let storage_dir = TempDir::new().unwrap();
        let mut config = test_config(storage_dir.path().to_str().unwrap());
        adjust(&mut config);

        let store = Arc::new(InMemoryStore::new());
        let billing = Arc::new(billing);
        let storage = LocalStorage::new(&config.storage).await.unwrap();
        let jwt = JwtService::new(&config.jwt).unwrap();

        let state = AppState {
            config: Arc::new(config),
            store: store.clone(),
            storage: Arc::new(storage),
            jobs: queue,
            jwt,
            billing: billing.clone(),
            google: Arc::new(google_mock()),
            metrics: detached_metrics_handle(),
        };
        let router = build_router(state.clone()).unwrap();

        Self {
            router,
            state,
            store,
            jobs,
            billing,
            _storage_dir: storage_dir,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, body)
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    /// Registers a user, confirms the address with the emailed token when one
    /// was queued, and returns `(user_id, token)`.
    pub async fn signup(&self, name: &str, email: &str) -> (String, String) {
        let (user_id, token) = self.signup_unverified(name, email).await;
        if let Some(verification) = self.verification_token(email) {
            let (status, body) = self
                .post(
                    "/users/me/email-verification",
                    Some(&token),
                    verification_body(&verification),
                )
                .await;
            assert_eq!(status, StatusCode::OK, "email verification failed: {body}");
        }
        (user_id, token)
    }

    /// Registers a user without confirming the address.
    pub async fn signup_unverified(&self, name: &str, email: &str) -> (String, String) {
        let (status, body) = self
            .post(
                "/users",
                None,
                json!({"data": {"type": "user", "attributes": {
                    "name": name, "email": email, "password": PASSWORD
                }}}),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "signup failed: {body}");
        (
            body["data"]["id"].as_str().unwrap().to_string(),
            body["meta"]["token"].as_str().unwrap().to_string(),
        )
    }

    /// Raw token from the most recent verification email sent to `email`.
    pub fn verification_token(&self, email: &str) -> Option<String> {
        self.jobs
            .jobs_named(EMAIL_VERIFICATION_JOB)
            .into_iter()
            .rev()
            .find(|job| job.payload["email"] == email.to_lowercase())
            .and_then(|job| job.payload["token"].as_str().map(str::to_string))
    }

    /// Creates an organization owned by the token's user and returns its id.
    pub async fn create_organization(&self, token: &str, name: &str) -> String {
        let (status, body) = self
            .post(
                "/organizations",
                Some(token),
                json!({"data": {"type": "organization", "attributes": {"name": name}}}),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create organization failed: {body}");
        body["data"]["id"].as_str().unwrap().to_string()
    }

    pub async fn invite(
        &self,
        token: &str,
        organization_id: &str,
        email: &str,
        role: &str,
    ) -> (StatusCode, Value) {
        self.post(
            "/organization-invitations",
            Some(token),
            invitation_body(organization_id, email, role),
        )
        .await
    }

    /// Adds `user_id` to the organization directly through the API as `actor`.
    pub async fn add_member(
        &self,
        actor_token: &str,
        organization_id: &str,
        user_id: &str,
        role: &str,
    ) -> (StatusCode, Value) {
        self.post(
            "/organization-memberships",
            Some(actor_token),
            json!({"data": {
                "type": "organization-membership",
                "attributes": {"role": role},
                "relationships": {
                    "user": {"data": {"type": "user", "id": user_id}},
                    "organization": {"data": {"type": "organization", "id": organization_id}}
                }
            }}),
        )
        .await
    }
}

pub fn invitation_body(organization_id: &str, email: &str, role: &str) -> Value {
    json!({"data": {
        "type": "organization-invitation",
        "attributes": {"email": email, "role": role},
        "relationships": {
            "organization": {"data": {"type": "organization", "id": organization_id}}
        }
    }})
}

pub fn verification_body(token: &str) -> Value {
    json!({"data": {"type": "email-verification", "attributes": {"token": token}}})
}

pub fn invitation_action(invitation_id: &str) -> Value {
    json!({"data": {"type": "organization-invitation", "id": invitation_id}})
}

/// Field names reported in a validation error body.
pub fn violation_fields(body: &Value) -> Vec<String> {
    body["violations"]
        .as_array()
        .map(|v| {
            v.iter()
                .filter_map(|v| v["field"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
