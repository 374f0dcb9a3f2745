use crate::error::{AppError, FieldViolation, TranslatedError};
use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};

const MAX_DETAIL_BYTES: usize = 16 * 1024;

/// Wraps every stage that can fail. Any failure response that did not come from an `AppError`
/// (router fallbacks, extractor rejections, panics caught further in) is
/// rewritten into the uniform error body.
pub async fn error_translation_middleware(req: Request, next: Next) -> Response {
    let response = next.run(req).await;
    let status = response.status();

    if !(status.is_client_error() || status.is_server_error())
        || response.extensions().get::<TranslatedError>().is_some()
    {
        return response;
    }

    translate(response).await.into_response()
}

async fn translate(response: Response) -> AppError {
    let status = response.status();
    match status {
        StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED => {
            AppError::NotFound("Resource not found".to_string())
        }
        StatusCode::UNAUTHORIZED => AppError::unauthenticated(status),
        StatusCode::FORBIDDEN => AppError::Forbidden("Forbidden".to_string()),
        StatusCode::CONFLICT => AppError::Conflict("Conflict".to_string()),
        StatusCode::UNSUPPORTED_MEDIA_TYPE => {
            AppError::UnsupportedMediaType("invalid_content_type".to_string())
        }
        s if s.is_client_error() => {
            let detail = body_text(response).await;
            let reason = if detail.is_empty() {
                s.canonical_reason().unwrap_or("invalid request").to_string()
            } else {
                detail
            };
            AppError::ValidationFailed(vec![FieldViolation::new("request", reason)])
        }
        _ => {
            let detail = body_text(response).await;
            AppError::Internal(anyhow::anyhow!(
                "untranslated {} response: {}",
                status,
                detail
            ))
        }
    }
}

async fn body_text(response: Response) -> String {
    match axum::body::to_bytes(response.into_body(), MAX_DETAIL_BYTES).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).trim().to_string(),
        Err(_) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorBody, ErrorCode, INTERNAL_MESSAGE};
    use axum::{
        Router,
        body::Body,
        routing::{get, post},
    };
    use tower::ServiceExt;
    use tower_http::catch_panic::CatchPanicLayer;

    async fn panics() -> &'static str {
        panic!("boom")
    }

    fn app() -> Router {
        Router::new()
            .route("/json", post(|_: axum::Json<serde_json::Value>| async { "ok" }))
            .route("/panic", get(panics))
            .route(
                "/conflict",
                get(|| async { AppError::Conflict("taken".to_string()) }),
            )
            .layer(CatchPanicLayer::new())
            .layer(axum::middleware::from_fn(error_translation_middleware))
    }

    async fn body_of(res: Response) -> ErrorBody {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn unknown_route_becomes_not_found() {
        let res = app()
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_of(res).await.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn extractor_rejection_becomes_validation_failure() {
        let res = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/json")
                    .header("content-type", "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body = body_of(res).await;
        assert_eq!(body.code, ErrorCode::ValidationFailed);
        assert_eq!(body.violations.unwrap()[0].field, "request");
    }

    #[tokio::test]
    async fn panic_becomes_opaque_internal_error() {
        let res = app()
            .oneshot(Request::builder().uri("/panic").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_of(res).await;
        assert_eq!(body.code, ErrorCode::Internal);
        assert_eq!(body.message, INTERNAL_MESSAGE);
    }

    #[tokio::test]
    async fn translated_errors_pass_through() {
        let res = app()
            .oneshot(Request::builder().uri("/conflict").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::CONFLICT);
        assert_eq!(body_of(res).await.message, "taken");
    }
}
