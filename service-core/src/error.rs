use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::{ValidationErrors, ValidationErrorsKind};

/// Message returned for every authentication failure, whatever the cause.
pub const UNAUTHENTICATED_MESSAGE: &str = "Unauthorized";

/// Message returned for every unclassified failure.
pub const INTERNAL_MESSAGE: &str = "Internal server error";

/// Machine-readable error classification carried in every error body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    ValidationFailed,
    Unauthenticated,
    Forbidden,
    NotFound,
    Conflict,
    UnsupportedMediaType,
    Internal,
}

impl ErrorCode {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorCode::ValidationFailed => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// A single rejected input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    pub field: String,
    pub reason: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Wire shape of every error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub violations: Option<Vec<FieldViolation>>,
}

/// Response extension marking a body that already has the uniform error shape.
#[derive(Debug, Clone, Copy)]
pub struct TranslatedError(pub ErrorCode);

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation failed: {0:?}")]
    ValidationFailed(Vec<FieldViolation>),

    /// The inner error is the reason the credential was rejected. It is
    /// logged and never returned to the caller.
    #[error("Unauthenticated: {0}")]
    Unauthenticated(anyhow::Error),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl AppError {
    /// Shorthand for a validation failure on a single field.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::ValidationFailed(vec![FieldViolation::new(field, reason)])
    }

    pub fn unauthenticated(reason: impl std::fmt::Display) -> Self {
        AppError::Unauthenticated(anyhow::anyhow!("{}", reason))
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::ValidationFailed(_) => ErrorCode::ValidationFailed,
            AppError::Unauthenticated(_) => ErrorCode::Unauthenticated,
            AppError::Forbidden(_) => ErrorCode::Forbidden,
            AppError::NotFound(_) => ErrorCode::NotFound,
            AppError::Conflict(_) => ErrorCode::Conflict,
            AppError::UnsupportedMediaType(_) => ErrorCode::UnsupportedMediaType,
            AppError::Internal(_) | AppError::ConfigError(_) => ErrorCode::Internal,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.code().status()
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        let mut violations = Vec::new();
        collect_violations(None, &errors, &mut violations);
        violations.sort_by(|a, b| a.field.cmp(&b.field));
        AppError::ValidationFailed(violations)
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(anyhow::Error::new(err))
    }
}

fn collect_violations(prefix: Option<&str>, errors: &ValidationErrors, out: &mut Vec<FieldViolation>) {
    for (field, kind) in errors.errors() {
        let name = camel_case(field);
        let path = match prefix {
            Some(prefix) => format!("{prefix}.{name}"),
            None => name,
        };
        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                for error in field_errors {
                    let reason = error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| error.code.to_string());
                    out.push(FieldViolation::new(path.clone(), reason));
                }
            }
            ValidationErrorsKind::Struct(inner) => collect_violations(Some(&path), inner, out),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    collect_violations(Some(&format!("{path}[{index}]")), inner, out);
                }
            }
        }
    }
}

/// Field names are reported the way they appear on the wire.
fn camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for ch in field.chars() {
        if ch == '_' {
            upper = true;
        } else if upper {
            out.extend(ch.to_uppercase());
            upper = false;
        } else {
            out.push(ch);
        }
    }
    out
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();

        let (message, violations) = match self {
            AppError::ValidationFailed(violations) => {
                ("Request validation failed".to_string(), Some(violations))
            }
            AppError::Unauthenticated(reason) => {
                tracing::warn!(reason = %reason, "Rejected unauthenticated request");
                (UNAUTHENTICATED_MESSAGE.to_string(), None)
            }
            AppError::Forbidden(msg) => (msg, None),
            AppError::NotFound(msg) => (msg, None),
            AppError::Conflict(msg) => (msg, None),
            AppError::UnsupportedMediaType(msg) => (msg, None),
            AppError::Internal(err) | AppError::ConfigError(err) => {
                tracing::error!(error = ?err, "Unhandled internal error");
                (INTERNAL_MESSAGE.to_string(), None)
            }
        };

        let mut res = (
            code.status(),
            Json(ErrorBody {
                code,
                message,
                violations,
            }),
        )
            .into_response();

        res.extensions_mut().insert(TranslatedError(code));
        res
    }
}
