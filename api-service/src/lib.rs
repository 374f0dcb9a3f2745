pub mod access;
pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use service_core::axum::{
    http::{header, HeaderName, HeaderValue, Method, Request},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::metrics_exporter_prometheus::PrometheusHandle;
use service_core::middleware::{
    content_type_middleware, error_translation_middleware, metrics_middleware,
    request_id_middleware, security_headers_middleware, REQUEST_ID_HEADER,
};
use std::sync::Arc;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::config::ApiConfig;
use crate::services::{BillingProvider, GoogleOAuthProvider, JobQueue, JwtService, ObjectStorage, Store};

/// Collaborators shared by every request. Cloning is cheap; each handle does
/// its own synchronization.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub store: Arc<dyn Store>,
    pub storage: Arc<dyn ObjectStorage>,
    pub jobs: Arc<dyn JobQueue>,
    pub jwt: JwtService,
    pub billing: Arc<dyn BillingProvider>,
    pub google: Arc<dyn GoogleOAuthProvider>,
    pub metrics: PrometheusHandle,
}

pub fn build_router(state: AppState) -> Result<Router, AppError> {
    let public_routes = Router::new()
        .route("/", get(handlers::health::health_check))
        .route("/metrics", get(handlers::health::metrics))
        .route("/users", post(handlers::users::create_user))
        .route("/users/login", post(handlers::users::login))
        .route("/oauth/google/callback", post(handlers::oauth::google_callback))
        .route(
            "/webhooks/stripe/snapshot",
            post(handlers::webhooks::stripe_snapshot_webhook),
        )
        .route(
            "/webhooks/stripe/thin",
            post(handlers::webhooks::stripe_thin_webhook),
        );

    let protected_routes = Router::new()
        // Users
        .route("/users", get(handlers::users::list_users))
        .route(
            "/users/me",
            get(handlers::users::get_me).patch(handlers::users::update_me),
        )
        .route("/users/me/token", post(handlers::users::create_token))
        .route(
            "/users/me/email-verification",
            post(handlers::users::verify_email),
        )
        .route(
            "/users/me/email-verification/resend",
            post(handlers::users::resend_email_verification),
        )
        .route(
            "/users/:id",
            get(handlers::users::get_user).patch(handlers::users::update_user),
        )
        // Organizations
        .route(
            "/organizations",
            get(handlers::organizations::list_organizations)
                .post(handlers::organizations::create_organization),
        )
        .route(
            "/organizations/:id",
            get(handlers::organizations::get_organization)
                .patch(handlers::organizations::update_organization)
                .delete(handlers::organizations::delete_organization),
        )
        // Billing
        .route(
            "/organizations/:id/stripe-onboarding-link",
            post(handlers::billing::stripe_onboarding_link),
        )
        .route(
            "/organizations/:id/stripe-dashboard-link",
            post(handlers::billing::stripe_dashboard_link),
        )
        .route(
            "/organizations/:id/subscription",
            get(handlers::billing::get_subscription),
        )
        .route(
            "/organizations/:id/checkout-session",
            post(handlers::billing::create_checkout_session),
        )
        .route(
            "/organizations/:id/billing-portal-session",
            post(handlers::billing::create_billing_portal_session),
        )
        // Memberships
        .route(
            "/organization-memberships",
            get(handlers::memberships::list_memberships)
                .post(handlers::memberships::create_membership),
        )
        .route(
            "/organization-memberships/:id",
            get(handlers::memberships::get_membership)
                .patch(handlers::memberships::update_membership)
                .delete(handlers::memberships::delete_membership),
        )
        // Invitations
        .route(
            "/organization-invitations",
            get(handlers::invitations::list_invitations)
                .post(handlers::invitations::create_invitation),
        )
        .route(
            "/organization-invitations/:id",
            get(handlers::invitations::get_invitation)
                .delete(handlers::invitations::revoke_invitation),
        )
        .route(
            "/organization-invitations/:id/accept",
            post(handlers::invitations::accept_invitation),
        )
        .route(
            "/organization-invitations/:id/decline",
            post(handlers::invitations::decline_invitation),
        )
        // Only matched routes are guarded so unknown paths still 404
        .route_layer(from_fn_with_state(state.clone(), middleware::auth_middleware));

    let cors = cors_layer(&state.config.security.allowed_origins);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .fallback(not_found)
        .with_state(state)
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
            let request_id = request
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|value| value.to_str().ok())
                .unwrap_or("-");

            tracing::info_span!(
                "http_request",
                request_id = %request_id,
                method = %request.method(),
                uri = %request.uri(),
                version = ?request.version(),
                user_id = tracing::field::Empty,
            )
        }))
        .layer(cors)
        .layer(from_fn(content_type_middleware))
        .layer(from_fn(error_translation_middleware))
        .layer(from_fn(metrics_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(from_fn(request_id_middleware));

    Ok(app)
}

async fn not_found() -> AppError {
    AppError::NotFound("Resource not found".to_string())
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PATCH,
        Method::DELETE,
        Method::OPTIONS,
    ];
    let headers = [
        header::AUTHORIZATION,
        header::CONTENT_TYPE,
        HeaderName::from_static(REQUEST_ID_HEADER),
    ];

    // Wildcard is dev-only; config validation refuses it in prod
    if allowed_origins.iter().any(|o| o == "*") {
        return CorsLayer::new()
            .allow_origin(AllowOrigin::any())
            .allow_methods(methods)
            .allow_headers(headers);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods(methods)
        .allow_headers(headers)
        .expose_headers([HeaderName::from_static(REQUEST_ID_HEADER)])
}
