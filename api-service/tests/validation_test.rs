mod common;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use common::{violation_fields, TestApp, PASSWORD};
use serde_json::json;

#[tokio::test]
async fn missing_required_fields_are_reported_by_path() {
    let app = TestApp::new().await;

    let (status, body) = app
        .post(
            "/users",
            None,
            json!({"data": {"type": "user", "attributes": {"email": "ada@example.com"}}}),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "ValidationFailed");
    assert_eq!(
        violation_fields(&body),
        vec!["data.attributes.name", "data.attributes.password"]
    );
}

#[tokio::test]
async fn constraint_violations_carry_reasons() {
    let app = TestApp::new().await;

    let (status, body) = app
        .post(
            "/users",
            None,
            json!({"data": {"type": "user", "attributes": {
                "name": "Ada", "email": "not-an-email", "password": "short"
            }}}),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let violations = body["violations"].as_array().unwrap();
    assert_eq!(violations.len(), 2);
    assert_eq!(violations[0]["field"], "data.attributes.email");
    assert_eq!(violations[0]["reason"], "must be a valid email address");
    assert_eq!(violations[1]["field"], "data.attributes.password");
}

#[tokio::test]
async fn valid_payload_passes_validation() {
    let app = TestApp::new().await;

    let (status, body) = app
        .post(
            "/users",
            None,
            json!({"data": {"type": "user", "attributes": {
                "name": "Ada", "email": "ada@example.com", "password": PASSWORD
            }}}),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert!(body.get("violations").is_none());
}

#[tokio::test]
async fn malformed_json_is_a_validation_failure() {
    let app = TestApp::new().await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/users")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"data\": "))
        .unwrap();
    let (status, body) = app.send(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(violation_fields(&body), vec!["body"]);
}

#[tokio::test]
async fn wrong_content_type_is_unsupported() {
    let app = TestApp::new().await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/users/login")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from("email=ada@example.com"))
        .unwrap();
    let (status, body) = app.send(request).await;

    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(body["code"], "UnsupportedMediaType");
}

#[tokio::test]
async fn unknown_routes_and_methods_get_the_uniform_not_found() {
    let app = TestApp::new().await;
    let (_, token) = app.signup("Ada", "ada@example.com").await;

    let (status, body) = app.get("/no-such-thing", &token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NotFound");
    assert!(body["message"].is_string());

    // unknown routes are not hidden behind authentication
    let (status, _) = app.request(Method::GET, "/no-such-thing", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app.request(Method::DELETE, "/users/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NotFound");
}

#[tokio::test]
async fn malformed_identifiers_are_bad_requests() {
    let app = TestApp::new().await;
    let (_, token) = app.signup("Ada", "ada@example.com").await;

    let (status, body) = app.get("/organizations/not-a-uuid", &token).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(violation_fields(&body), vec!["id"]);

    let (status, body) = app.get("/organization-memberships", &token).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(violation_fields(&body), vec!["organizationId"]);

    let (status, _) = app
        .get("/organization-memberships?organizationId=nope", &token)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn every_response_carries_request_id_and_security_headers() {
    let app = TestApp::new().await;

    for uri in ["/", "/no-such-thing"] {
        let request = Request::builder()
            .uri(uri)
            .header("x-request-id", "req-123")
            .body(Body::empty())
            .unwrap();
        let response = tower::ServiceExt::oneshot(app.router.clone(), request)
            .await
            .unwrap();

        let headers = response.headers();
        assert_eq!(headers["x-request-id"], "req-123", "{uri}");
        assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff", "{uri}");
        assert_eq!(headers[header::X_FRAME_OPTIONS], "DENY", "{uri}");
    }
}

#[tokio::test]
async fn health_and_metrics_are_public() {
    let app = TestApp::new().await;

    let (status, body) = app.request(Method::GET, "/", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "api-service");

    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let response = tower::ServiceExt::oneshot(app.router.clone(), request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
}
