mod common;

use api_service::middleware::SESSION_COOKIE;
use api_service::services::{jobs::ORGANIZATION_INVITATION_EMAIL_JOB, Store};
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use chrono::Utc;
use common::{verification_body, TestApp, GOOGLE_CODE, GOOGLE_UNVERIFIED_CODE, JWT_AUDIENCE, JWT_ISSUER, JWT_SECRET, PASSWORD};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use uuid::Uuid;

fn forge(user_id: &str, secret: &str, audience: &str, exp_offset: i64) -> String {
    let now = Utc::now().timestamp();
    let claims = json!({
        "sub": user_id,
        "iss": JWT_ISSUER,
        "aud": audience,
        "iat": now - 10,
        "nbf": now - 10,
        "exp": now + exp_offset,
        "role": "default",
        "scopes": [],
    });
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

async fn login(app: &TestApp, email: &str, password: &str) -> (StatusCode, Value) {
    app.post(
        "/users/login",
        None,
        json!({"data": {"type": "user", "attributes": {"email": email, "password": password}}}),
    )
    .await
}

#[tokio::test]
async fn missing_token_is_rejected_before_the_handler_runs() {
    let app = TestApp::new().await;
    let (_, owner_token) = app.signup("Olive", "olive@example.com").await;
    let org_id = app.create_organization(&owner_token, "Acme").await;

    let (status, body) = app
        .request(
            Method::POST,
            "/organization-invitations",
            None,
            Some(common::invitation_body(&org_id, "bob@example.com", "member")),
        )
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "Unauthenticated");
    assert!(app.jobs.jobs_named(ORGANIZATION_INVITATION_EMAIL_JOB).is_empty());
    let org_uuid = Uuid::parse_str(&org_id).unwrap();
    assert!(app.store.list_invitations(org_uuid).await.unwrap().is_empty());
}

#[tokio::test]
async fn bad_tokens_are_indistinguishable_from_missing_ones() {
    let app = TestApp::new().await;
    let (user_id, _) = app.signup("Ada", "ada@example.com").await;

    let (_, missing) = app.request(Method::GET, "/users/me", None, None).await;

    let expired = forge(&user_id, JWT_SECRET, JWT_AUDIENCE, -60);
    let wrong_audience = forge(&user_id, JWT_SECRET, "someone-else", 3600);
    let foreign = forge(&user_id, "not-our-secret", JWT_AUDIENCE, 3600);

    for token in [expired, wrong_audience, foreign, "garbage".to_string()] {
        let (status, body) = app.get("/users/me", &token).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, missing);
    }
}

#[tokio::test]
async fn login_then_me_then_tampered_token() {
    let app = TestApp::new().await;
    let (user_id, _) = app.signup("Ada", "Ada@Example.com").await;

    let (status, body) = login(&app, "ada@example.com", PASSWORD).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["tokenType"], "Bearer");
    let token = body["meta"]["token"].as_str().unwrap().to_string();

    let (status, me) = app.get("/users/me", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["data"]["id"], user_id.as_str());
    assert_eq!(me["data"]["type"], "user");
    assert_eq!(me["data"]["attributes"]["email"], "ada@example.com");
    assert!(me["data"]["attributes"].get("passwordHash").is_none());

    let mut tampered = token.into_bytes();
    // Flip signature bits, not the final character's unused padding bits
    let last = tampered.len() - 1;
    tampered[last] = if tampered[last] == b'A' { b'Q' } else { b'A' };
    let tampered = String::from_utf8(tampered).unwrap();

    let (status, body) = app.get("/users/me", &tampered).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Unauthorized");
}

#[tokio::test]
async fn wrong_password_and_unknown_email_look_the_same() {
    let app = TestApp::new().await;
    app.signup("Ada", "ada@example.com").await;

    let (status, wrong_password) = login(&app, "ada@example.com", "not the password").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, unknown) = login(&app, "nobody@example.com", PASSWORD).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password, unknown);
}

#[tokio::test]
async fn duplicate_signup_conflicts() {
    let app = TestApp::new().await;
    app.signup("Ada", "ada@example.com").await;

    let (status, body) = app
        .post(
            "/users",
            None,
            json!({"data": {"type": "user", "attributes": {
                "name": "Other Ada", "email": "ADA@example.com", "password": PASSWORD
            }}}),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "Conflict");
}

#[tokio::test]
async fn session_cookie_is_accepted() {
    let app = TestApp::new().await;
    let (user_id, token) = app.signup("Ada", "ada@example.com").await;

    let request = Request::builder()
        .method(Method::GET)
        .uri("/users/me")
        .header(header::COOKIE, format!("{}={}", SESSION_COOKIE, token))
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.send(request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], user_id.as_str());
}

#[tokio::test]
async fn token_for_deleted_user_is_unauthenticated() {
    let app = TestApp::new().await;
    let token = forge(&Uuid::new_v4().to_string(), JWT_SECRET, JWT_AUDIENCE, 3600);

    let (status, _) = app.get("/users/me", &token).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn users_can_only_touch_their_own_profile() {
    let app = TestApp::new().await;
    let (ada_id, ada) = app.signup("Ada", "ada@example.com").await;
    let (bob_id, _) = app.signup("Bob", "bob@example.com").await;

    let (status, _) = app.get(&format!("/users/{}", ada_id), &ada).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.get(&format!("/users/{}", bob_id), &ada).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .request(
            Method::PATCH,
            &format!("/users/{}", bob_id),
            Some(&ada),
            Some(json!({"data": {"type": "user", "attributes": {"name": "Mallory"}}})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .request(
            Method::PATCH,
            "/users/me",
            Some(&ada),
            Some(json!({"data": {"type": "user", "attributes": {"name": "Ada L."}}})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["attributes"]["name"], "Ada L.");
}

#[tokio::test]
async fn user_listing_requires_platform_admin_and_paginates() {
    let app = TestApp::new().await;
    let (admin_id, admin) = app.signup("Root", "root@example.com").await;
    for i in 0..4 {
        app.signup(&format!("User {i}"), &format!("user{i}@example.com")).await;
    }

    let (status, _) = app.get("/users", &admin).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let mut record = app
        .store
        .find_user_by_id(Uuid::parse_str(&admin_id).unwrap())
        .await
        .unwrap()
        .unwrap();
    record.role_code = "admin".to_string();
    app.store.update_user(&record).await.unwrap();

    let (status, first) = app.get("/users?page%5Bsize%5D=3", &admin).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["data"].as_array().unwrap().len(), 3);
    assert_eq!(first["meta"]["hasMore"], true);

    let cursor = first["meta"]["nextCursor"].as_str().unwrap();
    let (status, second) = app
        .get(&format!("/users?page%5Bsize%5D=3&page%5Bcursor%5D={}", cursor), &admin)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["data"].as_array().unwrap().len(), 2);
    assert_eq!(second["meta"]["hasMore"], false);

    let (status, found) = app.get("/users?search=user3", &admin).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found["data"].as_array().unwrap().len(), 1);

    let (status, body) = app.get("/users?page%5Bcursor%5D=not-a-cursor", &admin).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "ValidationFailed");
}

#[tokio::test]
async fn organization_token_requires_current_membership() {
    let app = TestApp::new().await;
    let (_, owner) = app.signup("Olive", "olive@example.com").await;
    let (_, stranger) = app.signup("Sam", "sam@example.com").await;
    let org_id = app.create_organization(&owner, "Acme").await;

    let body = json!({"data": {"type": "token", "attributes": {"organizationId": org_id}}});

    let (status, issued) = app.post("/users/me/token", Some(&owner), body.clone()).await;
    assert_eq!(status, StatusCode::CREATED);
    let token = issued["meta"]["token"].as_str().unwrap();
    let identity = app.state.jwt.validate(token).unwrap();
    assert_eq!(identity.organization_id.map(|id| id.to_string()), Some(org_id.clone()));
    assert!(identity.scopes.iter().any(|s| s == "organization:read"));

    let (status, _) = app.post("/users/me/token", Some(&stranger), body).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn google_sign_in_creates_then_reuses_the_account() {
    let app = TestApp::new().await;
    let body = |code: &str| {
        json!({"data": {"type": "google-callback", "attributes": {
            "code": code, "state": "xyz", "redirectUri": "http://localhost:3000/callback"
        }}})
    };

    let (status, first) = app.post("/oauth/google/callback", None, body(GOOGLE_CODE)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["data"]["attributes"]["email"], "gina@example.com");
    assert!(first["meta"]["token"].is_string());

    let (status, second) = app.post("/oauth/google/callback", None, body(GOOGLE_CODE)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["data"]["id"], second["data"]["id"]);

    let (status, _) = app
        .post("/oauth/google/callback", None, body(GOOGLE_UNVERIFIED_CODE))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.post("/oauth/google/callback", None, body("unknown")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn signup_starts_unverified_until_the_emailed_token_is_used() {
    let app = TestApp::new().await;
    let (user_id, token) = app.signup_unverified("Ada", "Ada@Example.com").await;

    let (status, me) = app.get("/users/me", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["data"]["attributes"]["emailVerified"], false);

    let jobs = app.jobs.jobs_named(api_service::services::jobs::EMAIL_VERIFICATION_JOB);
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].payload["userId"], user_id.as_str());
    let emailed = app.verification_token("ada@example.com").unwrap();

    let stored = app
        .store
        .find_user_by_id(Uuid::parse_str(&user_id).unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_ne!(stored.email_verification_hash.as_deref(), Some(emailed.as_str()));

    let (status, body) = app
        .post("/users/me/email-verification", Some(&token), verification_body("wrong"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(common::violation_fields(&body), vec!["data.attributes.token"]);

    let (status, body) = app
        .post("/users/me/email-verification", Some(&token), verification_body(&emailed))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["attributes"]["emailVerified"], true);

    let (status, _) = app
        .post("/users/me/email-verification", Some(&token), verification_body(&emailed))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn resend_replaces_the_outstanding_token() {
    let app = TestApp::new().await;
    let (_, token) = app.signup_unverified("Ada", "ada@example.com").await;
    let first = app.verification_token("ada@example.com").unwrap();

    let (status, _) = app
        .request(Method::POST, "/users/me/email-verification/resend", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let second = app.verification_token("ada@example.com").unwrap();
    assert_ne!(first, second);

    let (status, _) = app
        .post("/users/me/email-verification", Some(&token), verification_body(&first))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post("/users/me/email-verification", Some(&token), verification_body(&second))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .request(Method::POST, "/users/me/email-verification/resend", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn changing_email_requires_verifying_the_new_address() {
    let app = TestApp::new().await;
    let (_, token) = app.signup("Ada", "ada@example.com").await;

    let (status, body) = app
        .request(
            Method::PATCH,
            "/users/me",
            Some(&token),
            Some(json!({"data": {"type": "user", "attributes": {"email": "Ada.New@example.com"}}})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["attributes"]["email"], "ada.new@example.com");
    assert_eq!(body["data"]["attributes"]["emailVerified"], false);

    let emailed = app.verification_token("ada.new@example.com").unwrap();
    let (status, body) = app
        .post("/users/me/email-verification", Some(&token), verification_body(&emailed))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["attributes"]["emailVerified"], true);
}

#[tokio::test]
async fn google_sign_in_marks_the_address_verified() {
    let app = TestApp::new().await;
    let (status, body) = app
        .post(
            "/oauth/google/callback",
            None,
            json!({"data": {"type": "google-callback", "attributes": {
                "code": GOOGLE_CODE, "state": "xyz", "redirectUri": "http://localhost:3000/callback"
            }}}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["attributes"]["emailVerified"], true);
}

#[tokio::test]
async fn google_does_not_link_to_an_unverified_account() {
    let app = TestApp::new().await;
    let (registrant_id, _) = app.signup_unverified("Mallory", "gina@example.com").await;
    let body = json!({"data": {"type": "google-callback", "attributes": {
        "code": GOOGLE_CODE, "state": "xyz", "redirectUri": "http://localhost:3000/callback"
    }}});

    let (status, _) = app.post("/oauth/google/callback", None, body.clone()).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let registrant = app
        .store
        .find_user_by_id(Uuid::parse_str(&registrant_id).unwrap())
        .await
        .unwrap()
        .unwrap();
    assert!(registrant.google_id.is_none());

    // Once the address owner verifies, linking goes through
    let emailed = app.verification_token("gina@example.com").unwrap();
    let (_, login_body) = login(&app, "gina@example.com", PASSWORD).await;
    let token = login_body["meta"]["token"].as_str().unwrap();
    let (status, _) = app
        .post("/users/me/email-verification", Some(token), verification_body(&emailed))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, linked) = app.post("/oauth/google/callback", None, body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(linked["data"]["id"], registrant_id.as_str());
}
