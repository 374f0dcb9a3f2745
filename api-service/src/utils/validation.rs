use axum::{
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts, Request},
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;
use service_core::error::{AppError, FieldViolation};
use uuid::Uuid;
use validator::Validate;

/// JSON body that has been decoded and constraint-checked.
pub struct ValidatedJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate + 'static,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(json_rejection)?;

        value.validate()?;

        Ok(ValidatedJson(value))
    }
}

/// Query string decoded and validated under the same contract as bodies.
pub struct ValidatedQuery<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequestParts<S> for ValidatedQuery<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let query = parts.uri.query().unwrap_or_default();
        let value: T = serde_urlencoded::from_str(query)
            .map_err(|e| decode_failure("query", &e.to_string()))?;

        value.validate()?;

        Ok(ValidatedQuery(value))
    }
}

fn json_rejection(rejection: JsonRejection) -> AppError {
    match rejection {
        JsonRejection::JsonDataError(e) => decode_failure("body", &e.body_text()),
        JsonRejection::JsonSyntaxError(_) => AppError::invalid_field("body", "Body is not valid JSON"),
        JsonRejection::MissingJsonContentType(_) => {
            AppError::UnsupportedMediaType("Expected request with `Content-Type: application/json`".to_string())
        }
        other => AppError::invalid_field("body", other.body_text()),
    }
}

/// Serde reports a missing field as "missing field `name`". Surface the
/// field name itself so clients get a usable violation.
fn decode_failure(source: &str, message: &str) -> AppError {
    if let Some(field) = missing_field(message) {
        return AppError::ValidationFailed(vec![FieldViolation::new(field, "is required")]);
    }
    AppError::invalid_field(source, message)
}

fn missing_field(message: &str) -> Option<&str> {
    let rest = message.split("missing field `").nth(1)?;
    rest.split('`').next().filter(|f| !f.is_empty())
}

/// Parse a path identifier, reporting a malformed one as a validation failure.
pub fn parse_id(raw: &str, field: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::invalid_field(field, "must be a valid UUID"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode};
    use serde::Deserialize;

    #[derive(Debug, Deserialize, Validate)]
    struct Signup {
        #[validate(length(min = 1, max = 10))]
        name: String,
        #[validate(email)]
        email: String,
    }

    #[derive(Debug, Deserialize, Validate)]
    struct Listing {
        #[serde(rename = "page[size]")]
        #[validate(range(min = 1, max = 100))]
        page_size: Option<i64>,
    }

    fn json_request(body: &str) -> Request {
        Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn valid_body_passes_through() {
        let ValidatedJson(signup) = ValidatedJson::<Signup>::from_request(
            json_request(r#"{"name":"Ada","email":"ada@example.com"}"#),
            &(),
        )
        .await
        .unwrap();
        assert_eq!(signup.name, "Ada");
    }

    #[tokio::test]
    async fn missing_field_is_named_in_violations() {
        let err = ValidatedJson::<Signup>::from_request(json_request(r#"{"name":"Ada"}"#), &())
            .await
            .err()
            .unwrap();
        match err {
            AppError::ValidationFailed(violations) => assert_eq!(violations[0].field, "email"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn constraint_failures_are_400() {
        let err = ValidatedJson::<Signup>::from_request(
            json_request(r#"{"name":"","email":"nope"}"#),
            &(),
        )
        .await
        .err()
        .unwrap();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        match err {
            AppError::ValidationFailed(violations) => {
                let fields: Vec<_> = violations.iter().map(|v| v.field.as_str()).collect();
                assert_eq!(fields, vec!["email", "name"]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn query_shares_the_contract() {
        let (mut parts, _) = Request::builder()
            .uri("/users?page%5Bsize%5D=500")
            .body(Body::empty())
            .unwrap()
            .into_parts();
        let err = ValidatedQuery::<Listing>::from_request_parts(&mut parts, &())
            .await
            .err()
            .unwrap();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let (mut parts, _) = Request::builder()
            .uri("/users?page%5Bsize%5D=5")
            .body(Body::empty())
            .unwrap()
            .into_parts();
        let ValidatedQuery(listing) = ValidatedQuery::<Listing>::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(listing.page_size, Some(5));
    }

    #[test]
    fn malformed_ids_are_validation_failures() {
        assert!(parse_id(&Uuid::new_v4().to_string(), "id").is_ok());
        assert_eq!(parse_id("42", "id").unwrap_err().status(), StatusCode::BAD_REQUEST);
    }
}
