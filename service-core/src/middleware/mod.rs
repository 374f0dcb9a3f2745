pub mod content_type;
pub mod error_translation;
pub mod metrics;
pub mod security_headers;
pub mod tracing;

pub use self::content_type::content_type_middleware;
pub use self::error_translation::error_translation_middleware;
pub use self::metrics::metrics_middleware;
pub use self::security_headers::security_headers_middleware;
pub use self::tracing::{REQUEST_ID_HEADER, RequestId, request_id_middleware};
