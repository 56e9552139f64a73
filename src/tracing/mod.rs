//! Logging setup and error-tracing helpers

mod error_ext;
mod logging;

pub use error_ext::ErrorTraceExt;
pub use logging::{build_env_filter, init_logging, shutdown_otel};
