use axum::{body::Bytes, extract::State, http::HeaderMap, response::IntoResponse, Json};
use chrono::Utc;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use service_core::error::AppError;
use service_core::observability::record_job_enqueued;
use service_core::utils::signature::{verify_signature_header, DEFAULT_TOLERANCE_SECONDS};

use crate::services::jobs::{Job, STRIPE_SNAPSHOT_WEBHOOK_JOB, STRIPE_THIN_WEBHOOK_JOB};
use crate::AppState;

pub const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Deserialize)]
struct EventEnvelope {
    id: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookJob {
    event_id: String,
    event_type: String,
    payload: Value,
}

/// Full-object event deliveries.
pub async fn stripe_snapshot_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    receive(&state, &headers, &body, STRIPE_SNAPSHOT_WEBHOOK_JOB).await
}

/// Thin event deliveries, which only reference the changed object.
pub async fn stripe_thin_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    receive(&state, &headers, &body, STRIPE_THIN_WEBHOOK_JOB).await
}

async fn receive(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
    job_name: &'static str,
) -> Result<Json<Value>, AppError> {
    let secret = state.config.stripe.webhook_secret.as_ref().ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!("Stripe webhook secret is not configured"))
    })?;

    let header = headers
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::invalid_field("Stripe-Signature", "is required"))?;

    verify_signature_header(
        secret.expose_secret(),
        header,
        body,
        Utc::now().timestamp(),
        DEFAULT_TOLERANCE_SECONDS,
    )
    .map_err(|e| {
        tracing::warn!(error = %e, job = job_name, "Rejected webhook signature");
        AppError::invalid_field("Stripe-Signature", "signature verification failed")
    })?;

    let payload: Value = serde_json::from_slice(body)
        .map_err(|_| AppError::invalid_field("body", "Body is not valid JSON"))?;
    let event: EventEnvelope = serde_json::from_value(payload.clone())
        .map_err(|_| AppError::invalid_field("body", "event must carry an id and a type"))?;

    let job = Job::new(
        job_name,
        &WebhookJob {
            event_id: event.id.clone(),
            event_type: event.kind.clone(),
            payload,
        },
    )?;
    let enqueued = state.jobs.enqueue(job).await;
    record_job_enqueued(job_name, enqueued.is_ok());
    enqueued?;

    tracing::info!(event_id = %event.id, event_type = %event.kind, job = job_name, "Webhook queued");
    Ok(Json(json!({})))
}
