use crate::error::AppError;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the process-wide Prometheus recorder. Calling it again returns the
/// handle from the first installation.
pub fn init_metrics() -> Result<PrometheusHandle, AppError> {
    if let Some(handle) = METRICS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| AppError::ConfigError(anyhow::anyhow!("failed to install Prometheus recorder: {}", e)))?;

    Ok(METRICS_HANDLE.get_or_init(|| handle).clone())
}

/// A handle backed by a recorder that is not installed globally. Renders an
/// empty exposition; used where no process-wide recorder is wanted.
pub fn detached_metrics_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

/// Counts enqueue attempts per job name and outcome.
pub fn record_job_enqueued(job: &'static str, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    metrics::counter!("jobs_enqueued_total", "job" => job, "outcome" => outcome).increment(1);
}

/// Counts authorization denials by the guard that denied them.
pub fn record_access_denied(guard: &'static str) {
    metrics::counter!("access_denied_total", "guard" => guard).increment(1);
}
