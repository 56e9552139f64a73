//! Error tracing extensions
//!
//! Log a [`WorkerError`] together with its stable code and source chain.

use crate::types::WorkerError;
use std::error::Error as _;

/// Extension trait for adding tracing context to errors
pub trait ErrorTraceExt {
    /// Log error with its code, classification and source chain
    fn trace_error(&self) -> &Self;
}

impl ErrorTraceExt for WorkerError {
    fn trace_error(&self) -> &Self {
        let error_code = self.error_code();

        let mut error_chain = Vec::new();
        let mut current_source = self.source();
        while let Some(source) = current_source {
            error_chain.push(source.to_string());
            current_source = source.source();
        }

        if self.is_client_error() {
            tracing::warn!(
                error = %self,
                error_code = error_code.as_str(),
                error_chain = ?error_chain,
                "Request rejected"
            );
        } else {
            tracing::error!(
                error = %self,
                error_code = error_code.as_str(),
                exit_status = error_code.code(),
                is_retryable = self.is_retryable(),
                error_chain = ?error_chain,
                "Operation failed"
            );
        }

        self
    }
}
