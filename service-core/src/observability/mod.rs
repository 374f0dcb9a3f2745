pub mod logging;
pub mod metrics;

pub use self::logging::{init_tracing, shutdown_tracing};
pub use self::metrics::{detached_metrics_handle, init_metrics, record_access_denied, record_job_enqueued};
