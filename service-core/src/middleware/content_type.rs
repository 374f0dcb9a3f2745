use crate::error::AppError;
use axum::{
    body::HttpBody,
    extract::Request,
    http::{HeaderValue, Method, header},
    middleware::Next,
    response::{IntoResponse, Response},
};

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Rejects write requests whose body is not declared as JSON, and labels
/// outgoing bodies as JSON when a handler left the header off.
pub async fn content_type_middleware(req: Request, next: Next) -> Response {
    if carries_body(req.method()) {
        if let Err(err) = check_request(&req) {
            return err.into_response();
        }
    }

    let mut response = next.run(req).await;

    let has_body = response.body().size_hint().exact() != Some(0);
    if has_body && !response.headers().contains_key(header::CONTENT_TYPE) {
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(JSON_CONTENT_TYPE),
        );
    }

    response
}

fn carries_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

fn check_request(req: &Request) -> Result<(), AppError> {
    match req.headers().get(header::CONTENT_TYPE) {
        None => {
            if req.body().size_hint().exact() == Some(0) {
                Ok(())
            } else {
                Err(AppError::UnsupportedMediaType(
                    "missing_content_type".to_string(),
                ))
            }
        }
        Some(value) => {
            let value = value.to_str().unwrap_or_default();
            if is_json(value) {
                Ok(())
            } else {
                Err(AppError::UnsupportedMediaType(
                    "invalid_content_type".to_string(),
                ))
            }
        }
    }
}

/// `application/json` with at most a `charset=utf-8` parameter.
pub fn is_json(value: &str) -> bool {
    let mut parts = value.split(';').map(str::trim);
    let essence = parts.next().unwrap_or_default();
    if !essence.eq_ignore_ascii_case(JSON_CONTENT_TYPE) {
        return false;
    }

    parts.all(|param| {
        let Some((name, val)) = param.split_once('=') else {
            return false;
        };
        name.trim().eq_ignore_ascii_case("charset")
            && val.trim().trim_matches('"').eq_ignore_ascii_case("utf-8")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, http::StatusCode, routing::post};
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route("/", post(|body: String| async move { body }))
            .layer(axum::middleware::from_fn(content_type_middleware))
    }

    #[test]
    fn accepts_only_json_with_optional_utf8_charset() {
        assert!(is_json("application/json"));
        assert!(is_json("application/json; charset=utf-8"));
        assert!(is_json("Application/JSON;charset=UTF-8"));
        assert!(!is_json("application/json; charset=latin1"));
        assert!(!is_json("text/plain"));
        assert!(!is_json("application/x-www-form-urlencoded"));
        assert!(!is_json(""));
    }

    #[tokio::test]
    async fn rejects_body_without_content_type() {
        let res = app()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn rejects_non_json_content_type() {
        let res = app()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/")
                    .header(header::CONTENT_TYPE, "text/plain")
                    .body(Body::from("hello"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn empty_write_without_content_type_passes() {
        let res = app()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unlabelled_response_is_marked_json() {
        let app = Router::new()
            .route("/", post(|| async { Response::new(Body::from("{}")) }))
            .layer(axum::middleware::from_fn(content_type_middleware));

        let res = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[header::CONTENT_TYPE], JSON_CONTENT_TYPE);
    }
}
